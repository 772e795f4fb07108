//! The sound service provider
//!
//! [`SoundProvider`] maps generic stream/sample/recorder requests onto the
//! host audio subsystem and the decoder. It holds nothing but the selected
//! input and output devices and a debug flag.
//!
//! Failure policy: internal operations return `Result`; this surface catches
//! them, logs through tracing, and returns `None`. Best effort, no retry.

use crate::audio::decoded::DecodedStream;
use crate::audio::line::{self, CaptureLine, PlaybackLine};
use crate::audio::meta::{self, decoded_byte_budget, AudioMetaData, TrackProperties};
use crate::audio::record::{
    recorder_file_type, BufferedRecorder, SampleRecorder, StreamingRecorder,
};
use crate::audio::sample::{AudioSample, FloatBuffer, RecordingStream};
use crate::audio::types::{bytes_to_millis, PcmFormat};
use crate::config::Config;
use crate::error::Result;
use cpal::Device;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Service provider mapping audio requests onto the host audio stack.
///
/// Device selection is process-wide configuration: once an input or output
/// device is selected it is used for every subsequent line acquisition.
/// With no selection, lines open on the host default device.
pub struct SoundProvider {
    input_device: Option<Device>,
    output_device: Option<Device>,
    debug: bool,
}

impl Default for SoundProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundProvider {
    /// Create a provider using host default devices.
    pub fn new() -> Self {
        Self {
            input_device: None,
            output_device: None,
            debug: false,
        }
    }

    /// Create a provider with devices preselected from configuration.
    ///
    /// Names that don't resolve are logged and skipped, leaving the host
    /// default in place.
    pub fn from_config(config: &Config) -> Self {
        let mut provider = Self::new();
        if let Some(name) = config.output_device.as_deref() {
            provider.select_output_device(name);
        }
        if let Some(name) = config.input_device.as_deref() {
            provider.select_input_device(name);
        }
        provider
    }

    /// Enable verbose adapter logging.
    pub fn debug_on(&mut self) {
        self.debug = true;
    }

    /// Disable verbose adapter logging.
    pub fn debug_off(&mut self) {
        self.debug = false;
    }

    /// Select the device used for subsequent capture lines.
    pub fn set_input_device(&mut self, device: Device) {
        self.input_device = Some(device);
    }

    /// The selected input device, if any.
    pub fn input_device(&self) -> Option<&Device> {
        self.input_device.as_ref()
    }

    /// Select the device used for subsequent playback lines.
    pub fn set_output_device(&mut self, device: Device) {
        self.output_device = Some(device);
    }

    /// The selected output device, if any.
    pub fn output_device(&self) -> Option<&Device> {
        self.output_device.as_ref()
    }

    /// Select the output device by name. Returns false (and keeps the
    /// current selection) when no such device exists.
    pub fn select_output_device(&mut self, name: &str) -> bool {
        match line::find_output_device(name) {
            Ok(device) => {
                info!("Selected output device '{}'", name);
                self.output_device = Some(device);
                true
            }
            Err(e) => {
                warn!("{}, keeping current selection", e);
                false
            }
        }
    }

    /// Select the input device by name. Returns false (and keeps the
    /// current selection) when no such device exists.
    pub fn select_input_device(&mut self, name: &str) -> bool {
        match line::find_input_device(name) {
            Ok(device) => {
                info!("Selected input device '{}'", name);
                self.input_device = Some(device);
                true
            }
            Err(e) => {
                warn!("{}, keeping current selection", e);
                false
            }
        }
    }

    /// List available output device names.
    pub fn list_output_devices(&self) -> Result<Vec<String>> {
        line::list_output_device_names()
    }

    /// List available input device names.
    pub fn list_input_devices(&self) -> Result<Vec<String>> {
        line::list_input_device_names()
    }

    /// Acquire a playback line for the given format.
    ///
    /// Uses the selected output device, else the host default. Failure is
    /// logged and yields `None`.
    pub fn playback_line(&self, format: &PcmFormat, buffer_frames: usize) -> Option<PlaybackLine> {
        match PlaybackLine::open(self.output_device.as_ref(), format, buffer_frames) {
            Ok(line) => {
                if self.debug {
                    debug!(
                        "PlaybackLine is on '{}', format {}",
                        line.device_name(),
                        line.format()
                    );
                }
                Some(line)
            }
            Err(e) => {
                error!("Unable to return a playback line: {}", e);
                None
            }
        }
    }

    /// Acquire a capture line for the given format.
    ///
    /// Uses the selected input device, else the host default. Failure is
    /// logged and yields `None`.
    pub fn capture_line(&self, format: &PcmFormat, buffer_frames: usize) -> Option<CaptureLine> {
        match CaptureLine::open(self.input_device.as_ref(), format, buffer_frames) {
            Ok(line) => {
                if self.debug {
                    debug!(
                        "CaptureLine is on '{}', format {}",
                        line.device_name(),
                        line.format()
                    );
                }
                Some(line)
            }
            Err(e) => {
                error!("Error acquiring capture line: {}", e);
                None
            }
        }
    }

    /// Acquire a capture stream with the given layout.
    ///
    /// Bit depth must be 8 or 16. The underlying line is opened with four
    /// buffers of headroom.
    pub fn audio_stream(
        &self,
        channels: u16,
        buffer_frames: usize,
        sample_rate: u32,
        bit_depth: u16,
    ) -> Option<CaptureLine> {
        if bit_depth != 8 && bit_depth != 16 {
            error!("Unsupported bit depth {}, use either 8 or 16", bit_depth);
            return None;
        }
        let format = PcmFormat::pcm_signed(sample_rate, channels, bit_depth);
        self.capture_line(&format, buffer_frames * 4)
    }

    /// Open a file as a decoded stream wired to a playback line.
    ///
    /// MP3 sources are transcoded to PCM; the stream's length comes from the
    /// file's reported duration (-1 when unknown). `None` if the file can't
    /// be decoded or no line is available.
    pub fn recording_stream(
        &self,
        filename: &str,
        buffer_frames: usize,
    ) -> Option<RecordingStream> {
        if Self::is_remote(filename) {
            error!("Network sources are not supported: {}", filename);
            return None;
        }

        let stream = match DecodedStream::open(filename) {
            Ok(stream) => stream,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        if self.debug {
            debug!(
                "File format is {}, decoding to {}",
                stream.source_format(),
                stream.target_format()
            );
        }

        let props = self.properties_or_empty(filename);
        let length = props
            .duration_millis()
            .filter(|&ms| ms > 0)
            .map(|ms| ms as i64)
            .unwrap_or(-1);
        let meta = AudioMetaData::new(filename, length).with_properties(props);

        let line = self.playback_line(&stream.target_format(), buffer_frames)?;
        Some(RecordingStream::new(meta, stream, line, buffer_frames))
    }

    /// Load a file fully into memory as an [`AudioSample`].
    ///
    /// The decoded byte budget comes from the file's duration, not its
    /// (possibly compressed) byte length; with no known duration the stream
    /// is decoded to its end.
    pub fn audio_sample(&self, filename: &str, buffer_frames: usize) -> Option<AudioSample> {
        if Self::is_remote(filename) {
            error!("Network sources are not supported: {}", filename);
            return None;
        }

        let mut stream = match DecodedStream::open(filename) {
            Ok(stream) => stream,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        let target = stream.target_format();

        let props = self.properties_or_empty(filename);
        let bytes = match decoded_byte_budget(&props, &target) {
            Some(budget) => stream.read_fully(budget),
            None => stream.read_to_end(),
        };

        let length = props
            .duration_millis()
            .filter(|&ms| ms > 0)
            .unwrap_or_else(|| bytes_to_millis(bytes.len() as u64, &target))
            as i64;

        let buffer = match FloatBuffer::from_interleaved_pcm(&bytes, &target) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Error loading {} into memory: {}", filename, e);
                return None;
            }
        };

        let meta = AudioMetaData::new(filename, length).with_properties(props);
        let line = self.playback_line(&target, buffer_frames)?;
        Some(AudioSample::new(buffer, meta, line))
    }

    /// Build an [`AudioSample`] from caller-supplied mono frames.
    pub fn audio_sample_from_mono(
        &self,
        samples: &[f32],
        sample_rate: u32,
        buffer_frames: usize,
    ) -> Option<AudioSample> {
        let buffer = FloatBuffer::from_mono(samples.to_vec(), sample_rate);
        self.sample_from_buffer(buffer, buffer_frames)
    }

    /// Build an [`AudioSample`] from caller-supplied stereo frames.
    pub fn audio_sample_from_stereo(
        &self,
        left: &[f32],
        right: &[f32],
        sample_rate: u32,
        buffer_frames: usize,
    ) -> Option<AudioSample> {
        let buffer = match FloatBuffer::from_stereo(left.to_vec(), right.to_vec(), sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        self.sample_from_buffer(buffer, buffer_frames)
    }

    fn sample_from_buffer(
        &self,
        buffer: FloatBuffer,
        buffer_frames: usize,
    ) -> Option<AudioSample> {
        let format = buffer.pcm_format();
        let line = match self.playback_line(&format, buffer_frames) {
            Some(line) => line,
            None => {
                error!("Couldn't acquire an output");
                return None;
            }
        };
        let meta = AudioMetaData::new("sample", buffer.duration_millis() as i64);
        Some(AudioSample::new(buffer, meta, line))
    }

    /// Create a sample recorder for the given target file.
    ///
    /// The file type is chosen by extension; `buffered` selects in-memory
    /// accumulation over incremental writes.
    pub fn sample_recorder(
        &self,
        filename: &str,
        format: &PcmFormat,
        buffered: bool,
    ) -> Option<Box<dyn SampleRecorder>> {
        let path = Path::new(filename);
        if self.debug {
            debug!(
                "Recorder target is {} ({})",
                filename,
                if buffered { "buffered" } else { "streaming" }
            );
        }

        if let Err(e) = recorder_file_type(path) {
            error!("{}", e);
            return None;
        }

        let recorder: Result<Box<dyn SampleRecorder>> = if buffered {
            BufferedRecorder::new(path, format).map(|r| Box::new(r) as Box<dyn SampleRecorder>)
        } else {
            StreamingRecorder::new(path, format).map(|r| Box::new(r) as Box<dyn SampleRecorder>)
        };

        match recorder {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    /// Fetch the file's ID3-style properties.
    ///
    /// Failures are logged and yield the empty property set.
    pub fn track_properties(&self, filename: &str) -> TrackProperties {
        self.properties_or_empty(filename)
    }

    fn properties_or_empty(&self, filename: &str) -> TrackProperties {
        match meta::track_properties(filename) {
            Ok(props) => props,
            Err(e) => {
                error!("{}", e);
                TrackProperties::default()
            }
        }
    }

    fn is_remote(filename: &str) -> bool {
        filename.starts_with("http://") || filename.starts_with("https://")
    }
}

impl std::fmt::Debug for SoundProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundProvider")
            .field("input_selected", &self.input_device.is_some())
            .field("output_selected", &self.output_device.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_toggle() {
        let mut provider = SoundProvider::new();
        assert!(!provider.debug);
        provider.debug_on();
        assert!(provider.debug);
        provider.debug_off();
        assert!(!provider.debug);
    }

    #[test]
    fn test_new_provider_has_no_devices() {
        let provider = SoundProvider::new();
        assert!(provider.input_device().is_none());
        assert!(provider.output_device().is_none());
    }

    #[test]
    fn test_audio_stream_rejects_bad_bit_depth() {
        let provider = SoundProvider::new();
        assert!(provider.audio_stream(2, 1024, 44100, 24).is_none());
        assert!(provider.audio_stream(2, 1024, 44100, 0).is_none());
    }

    #[test]
    fn test_recording_stream_rejects_urls() {
        let provider = SoundProvider::new();
        assert!(provider
            .recording_stream("http://example.com/radio.mp3", 1024)
            .is_none());
        assert!(provider
            .audio_sample("https://example.com/song.mp3", 1024)
            .is_none());
    }

    #[test]
    fn test_recording_stream_missing_file() {
        let provider = SoundProvider::new();
        assert!(provider.recording_stream("/nonexistent/file.mp3", 1024).is_none());
    }

    #[test]
    fn test_sample_recorder_rejects_unknown_extension() {
        let provider = SoundProvider::new();
        let format = PcmFormat::pcm_signed(44100, 2, 16);
        assert!(provider.sample_recorder("take.xyz", &format, true).is_none());
        assert!(provider.sample_recorder("take.aiff", &format, false).is_none());
    }

    #[test]
    fn test_track_properties_degrades_to_empty() {
        let provider = SoundProvider::new();
        let props = provider.track_properties("/nonexistent/file.mp3");
        assert!(props.is_empty());
    }

    #[test]
    fn test_select_missing_device_keeps_selection() {
        let mut provider = SoundProvider::new();
        // A device with this name will not exist
        let found = provider.select_output_device("no-such-device-xyz");
        assert!(!found);
        assert!(provider.output_device().is_none());
    }
}
