//! Audio file metadata
//!
//! ID3-style property harvesting via symphonia, plus the duration /
//! byte-length reconciliation the full-file loaders depend on: the byte
//! length of a compressed file is much shorter than its decoded length, so
//! the decoded byte budget is always derived from the duration, never from
//! the source byte count.

use crate::audio::types::{millis_to_bytes, PcmFormat};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::debug;

/// Properties of an audio file: textual tags plus whatever the codec
/// reports about duration and layout.
#[derive(Debug, Clone, Default)]
pub struct TrackProperties {
    /// Textual tags keyed by normalized name ("title", "artist", ...)
    pub tags: BTreeMap<String, String>,

    /// Track duration in microseconds, when the codec reports one
    pub duration_micros: Option<u64>,

    /// Length of the (possibly compressed) file in bytes
    pub byte_length: u64,

    /// Sample rate of the encoded stream
    pub sample_rate: Option<u32>,

    /// Channel count of the encoded stream
    pub channels: Option<u16>,

    /// Estimated bit rate of the encoded stream, bits per second
    pub bit_rate: Option<u32>,
}

impl TrackProperties {
    /// Duration in milliseconds, if known.
    pub fn duration_millis(&self) -> Option<u64> {
        self.duration_micros.map(|us| us / 1000)
    }

    /// Look up a tag by normalized name.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether nothing at all was harvested.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.duration_micros.is_none()
    }
}

/// Metadata attached to an acquired stream, sample, or recording.
#[derive(Debug, Clone)]
pub struct AudioMetaData {
    file_name: String,
    length_millis: i64,
    properties: TrackProperties,
}

impl AudioMetaData {
    /// Create metadata with a known length. Pass -1 when unknown.
    pub fn new(file_name: impl Into<String>, length_millis: i64) -> Self {
        Self {
            file_name: file_name.into(),
            length_millis,
            properties: TrackProperties::default(),
        }
    }

    /// Attach the full property map (MP3 case).
    pub fn with_properties(mut self, properties: TrackProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Name of the source file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Length in milliseconds, -1 when unknown.
    pub fn length_millis(&self) -> i64 {
        self.length_millis
    }

    /// Harvested properties (empty for non-tagged sources).
    pub fn properties(&self) -> &TrackProperties {
        &self.properties
    }
}

/// Decoded byte budget for loading a file fully into memory.
///
/// Derived from the duration and the *decoded* format; returns None when no
/// positive duration is known, in which case callers decode to end of stream.
pub fn decoded_byte_budget(props: &TrackProperties, decoded: &PcmFormat) -> Option<usize> {
    props
        .duration_millis()
        .filter(|&ms| ms > 0)
        .map(|ms| millis_to_bytes(ms, decoded))
}

/// Probe a file and harvest its properties.
///
/// Tags are read from both the container probe (ID3v2 lives there) and the
/// format reader's own metadata. An audio file with no tags yields an empty
/// map, not an error.
///
/// # Errors
/// - File cannot be opened
/// - Container or codec not recognized
pub fn track_properties<P: AsRef<Path>>(path: P) -> Result<TrackProperties> {
    let path = path.as_ref();
    debug!("Getting properties for {}", path.display());

    let file = File::open(path)?;
    let byte_length = file.metadata().map(|m| m.len()).unwrap_or(0);

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            Error::Metadata(format!(
                "Couldn't get the file format for {}: {}",
                path.display(),
                e
            ))
        })?;

    let mut props = TrackProperties {
        byte_length,
        ..TrackProperties::default()
    };

    // Container-level metadata gathered during the probe (ID3v2, APE)
    if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        harvest_tags(rev, &mut props.tags);
    }

    // Format-level metadata (Vorbis comments, RIFF INFO)
    if let Some(rev) = probed.format.metadata().current() {
        harvest_tags(rev, &mut props.tags);
    }

    if let Some(track) = probed.format.default_track() {
        let params = &track.codec_params;
        props.sample_rate = params.sample_rate;
        props.channels = params.channels.map(|c| c.count() as u16);

        if let (Some(tb), Some(n_frames)) = (params.time_base, params.n_frames) {
            let time = tb.calc_time(n_frames);
            props.duration_micros =
                Some(time.seconds * 1_000_000 + (time.frac * 1_000_000.0) as u64);
        }
    }

    if let Some(us) = props.duration_micros.filter(|&us| us > 0) {
        props.bit_rate = Some((byte_length * 8 * 1_000_000 / us) as u32);
    }

    if props.tags.is_empty() {
        debug!("No tags available for {}", path.display());
    } else {
        debug!("File properties: {:?}", props.tags);
    }

    Ok(props)
}

fn harvest_tags(rev: &MetadataRevision, tags: &mut BTreeMap<String, String>) {
    for tag in rev.tags() {
        let key = tag
            .std_key
            .and_then(std_key_name)
            .map(str::to_string)
            .unwrap_or_else(|| tag.key.to_ascii_lowercase());
        tags.insert(key, tag.value.to_string());
    }
}

/// Normalized names for the tag keys the adapter cares about.
fn std_key_name(key: StandardTagKey) -> Option<&'static str> {
    match key {
        StandardTagKey::TrackTitle => Some("title"),
        StandardTagKey::Artist => Some("artist"),
        StandardTagKey::AlbumArtist => Some("album_artist"),
        StandardTagKey::Album => Some("album"),
        StandardTagKey::Date => Some("date"),
        StandardTagKey::Genre => Some("genre"),
        StandardTagKey::TrackNumber => Some("track"),
        StandardTagKey::Comment => Some("comment"),
        StandardTagKey::Composer => Some("composer"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_millis_from_micros() {
        let props = TrackProperties {
            duration_micros: Some(3_456_789),
            ..TrackProperties::default()
        };
        assert_eq!(props.duration_millis(), Some(3456));
    }

    #[test]
    fn test_decoded_byte_budget_uses_duration_not_byte_length() {
        // A 1s MP3 might be ~16kB on disk but decodes to 176400 bytes
        let props = TrackProperties {
            duration_micros: Some(1_000_000),
            byte_length: 16_000,
            ..TrackProperties::default()
        };
        let decoded = PcmFormat::pcm_signed(44100, 2, 16);
        assert_eq!(decoded_byte_budget(&props, &decoded), Some(176_400));
    }

    #[test]
    fn test_decoded_byte_budget_unknown_duration() {
        let props = TrackProperties::default();
        let decoded = PcmFormat::pcm_signed(44100, 2, 16);
        assert_eq!(decoded_byte_budget(&props, &decoded), None);
    }

    #[test]
    fn test_decoded_byte_budget_zero_duration() {
        let props = TrackProperties {
            duration_micros: Some(500),
            ..TrackProperties::default()
        };
        // 500us rounds down to 0ms, which is not a usable budget
        let decoded = PcmFormat::pcm_signed(44100, 2, 16);
        assert_eq!(decoded_byte_budget(&props, &decoded), None);
    }

    #[test]
    fn test_metadata_unknown_length() {
        let meta = AudioMetaData::new("song.mp3", -1);
        assert_eq!(meta.file_name(), "song.mp3");
        assert_eq!(meta.length_millis(), -1);
        assert!(meta.properties().is_empty());
    }

    #[test]
    fn test_track_properties_nonexistent_file() {
        assert!(track_properties("/nonexistent/file.mp3").is_err());
    }
}
