//! Decoded audio stream using symphonia
//!
//! Opens a compressed or PCM audio file and exposes it as a pull-based
//! stream of decoded PCM bytes. MP3 (and every other supported codec) is
//! normalized to 16-bit signed little-endian interleaved samples at the
//! source sample rate and channel count.
//!
//! A single `read` returns at most one decoded packet's worth of data, so
//! callers loading a whole file must loop; [`DecodedStream::read_fully`]
//! implements that chunked loop and tolerates short reads.

use crate::audio::types::PcmFormat;
use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_MP3, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, warn};

/// Read granularity for [`DecodedStream::read_to_end`].
const READ_CHUNK_BYTES: usize = 65536;

/// A decoded (PCM) view of an audio file.
///
/// Wraps a symphonia format reader and decoder. Decoded samples are buffered
/// between reads so no data is lost when a caller's buffer is smaller than a
/// decoded packet.
pub struct DecodedStream {
    path: PathBuf,

    /// Symphonia format reader
    reader: Box<dyn FormatReader>,

    /// Symphonia decoder
    decoder: Box<dyn Decoder>,

    /// Track index being decoded
    track_id: u32,

    /// Format of the encoded source
    source_format: PcmFormat,

    /// Format of the decoded output (always 16-bit signed PCM)
    target_format: PcmFormat,

    /// Interleaved sample buffer reused across packets
    sample_buf: Option<SampleBuffer<i16>>,

    /// Decoded bytes not yet handed to the caller
    pending: Vec<u8>,
    pending_pos: usize,

    finished: bool,
}

impl DecodedStream {
    /// Open a file as a decoded stream.
    ///
    /// Probes the container, selects the first audio track, and builds a
    /// decoder for it. The decoded output format is derived from the source:
    /// signed 16-bit PCM at the source rate and channel count.
    ///
    /// # Errors
    /// - File cannot be opened
    /// - Container or codec not recognized
    /// - Source reports no sample rate or channel count
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path)
            .map_err(|e| Error::Decode(format!("Failed to open {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::UnsupportedFormat(format!(
                    "{} is not a supported audio file: {}",
                    path.display(),
                    e
                ))
            })?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::Decode(format!("No audio track found in {}", path.display()))
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let source_format = if codec_params.codec == CODEC_TYPE_MP3 {
            PcmFormat::mpeg(sample_rate, channels)
        } else {
            let bits = codec_params.bits_per_sample.unwrap_or(16) as u16;
            PcmFormat::pcm_signed(sample_rate, channels, bits)
        };
        let target_format = PcmFormat::decoded(&source_format);

        debug!(
            "Opened {}: source format {}, decoding to {}",
            path.display(),
            source_format,
            target_format
        );

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            path,
            reader,
            decoder,
            track_id,
            source_format,
            target_format,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }

    /// Format of the encoded source.
    pub fn source_format(&self) -> PcmFormat {
        self.source_format
    }

    /// Format of the decoded output.
    pub fn target_format(&self) -> PcmFormat {
        self.target_format
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the stream has been fully drained.
    pub fn is_finished(&self) -> bool {
        self.finished && self.pending_pos >= self.pending.len()
    }

    /// Read decoded PCM bytes into `buf`.
    ///
    /// Returns the number of bytes written; `Ok(0)` means end of stream.
    /// A short read only means no more decoded data was buffered; callers
    /// wanting an exact amount must loop (see [`read_fully`](Self::read_fully)).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let available = self.pending.len() - self.pending_pos;
            if available > 0 {
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                return Ok(n);
            }

            if self.finished {
                return Ok(0);
            }

            self.decode_next_packet()?;
        }
    }

    /// Read up to `to_read` decoded bytes into memory.
    ///
    /// Reads in chunks because a single read won't return more than one
    /// decoded packet at a time. Stops early at end of stream and returns
    /// whatever was read; decode failures are logged, not propagated.
    pub fn read_fully(&mut self, to_read: usize) -> Vec<u8> {
        let mut raw = vec![0u8; to_read];
        let mut total = 0;

        while total < to_read {
            match self.read(&mut raw[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    error!("Error loading stream into memory: {}", e);
                    break;
                }
            }
        }

        debug!("Needed to read {} bytes, actually read {}", to_read, total);
        raw.truncate(total);
        raw
    }

    /// Read the remainder of the stream into memory.
    ///
    /// Used when no duration is known up front (e.g. an untagged MP3), so no
    /// decoded byte budget can be derived.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        let mut raw = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];

        loop {
            match self.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    error!("Error loading stream into memory: {}", e);
                    break;
                }
            }
        }

        debug!("Read {} bytes to end of stream", raw.len());
        raw
    }

    /// Decode packets until one yields samples for our track, or the stream
    /// ends. Fills `pending` with interleaved 16-bit little-endian bytes.
    fn decode_next_packet(&mut self) -> Result<()> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of {}", self.path.display());
                    self.finished = true;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Error reading packet from {}: {}", self.path.display(), e);
                    self.finished = true;
                    return Ok(());
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Malformed packet, keep going
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Decode failed: {}", e);
                    self.finished = true;
                    return Ok(());
                }
            };

            let spec = *decoded.spec();
            let frames_cap = decoded.capacity() as u64;
            let total_samples = frames_cap as usize * spec.channels.count();

            let needs_new = self
                .sample_buf
                .as_ref()
                .map_or(true, |b| b.capacity() < total_samples);
            if needs_new {
                self.sample_buf = Some(SampleBuffer::<i16>::new(frames_cap, spec));
            }

            if let Some(sample_buf) = self.sample_buf.as_mut() {
                sample_buf.copy_interleaved_ref(decoded);

                self.pending.clear();
                self.pending_pos = 0;
                self.pending.reserve(sample_buf.len() * 2);
                for &sample in sample_buf.samples() {
                    self.pending.extend_from_slice(&sample.to_le_bytes());
                }
            }

            return Ok(());
        }
    }
}

impl std::fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedStream")
            .field("path", &self.path)
            .field("source_format", &self.source_format)
            .field("target_format", &self.target_format)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_file() {
        let result = DecodedStream::open("/nonexistent/file.mp3");
        assert!(result.is_err());
    }

    #[test]
    fn test_open_non_audio_file() {
        // The probe must reject a file that is not audio at all
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_audio.mp3");
        std::fs::write(&path, b"definitely not an mpeg bitstream").unwrap();

        let result = DecodedStream::open(&path);
        assert!(result.is_err());
    }

    // Decoding of real streams is covered by the integration tests, which
    // synthesize WAV fixtures with hound.
}
