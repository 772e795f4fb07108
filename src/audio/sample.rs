//! In-memory audio
//!
//! [`FloatBuffer`] holds fully-decoded audio as planar f32 channels.
//! [`AudioSample`] pairs a buffer with a playback line so it can be
//! triggered on demand; [`RecordingStream`] pumps a decoded stream to a
//! line one buffer at a time.

use crate::audio::decoded::DecodedStream;
use crate::audio::line::PlaybackLine;
use crate::audio::meta::AudioMetaData;
use crate::audio::types::{frames_to_millis, PcmFormat};
use crate::error::{Error, Result};
use tracing::debug;

/// Planar floating-point audio at a fixed sample rate.
///
/// Samples are in [-1.0, 1.0]; each channel is its own vector and all
/// channels have the same length.
#[derive(Debug, Clone)]
pub struct FloatBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl FloatBuffer {
    /// Build a mono buffer.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Build a stereo buffer from separate left/right channels.
    ///
    /// # Errors
    /// The channels must be the same length.
    pub fn from_stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(Error::UnsupportedFormat(format!(
                "stereo channels differ in length: {} vs {}",
                left.len(),
                right.len()
            )));
        }
        Ok(Self {
            channels: vec![left, right],
            sample_rate,
        })
    }

    /// Build a buffer from interleaved signed PCM bytes.
    ///
    /// Accepts 16-bit little-endian or 8-bit samples; a partial trailing
    /// frame is ignored.
    pub fn from_interleaved_pcm(bytes: &[u8], format: &PcmFormat) -> Result<Self> {
        let frame_size = format.frame_size();
        if frame_size == 0 {
            return Err(Error::UnsupportedFormat(format!("{}", format)));
        }
        let frames = bytes.len() / frame_size;
        let ch_count = format.channels as usize;
        let mut channels = vec![Vec::with_capacity(frames); ch_count];

        match format.bits_per_sample {
            16 => {
                for frame in bytes.chunks_exact(frame_size).take(frames) {
                    for (ch, pair) in frame.chunks_exact(2).enumerate() {
                        let v = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0;
                        channels[ch].push(v);
                    }
                }
            }
            8 => {
                for frame in bytes.chunks_exact(frame_size).take(frames) {
                    for (ch, &byte) in frame.iter().enumerate() {
                        channels[ch].push(byte as i8 as f32 / 128.0);
                    }
                }
            }
            bits => {
                return Err(Error::UnsupportedFormat(format!(
                    "{}-bit PCM buffers",
                    bits
                )));
            }
        }

        Ok(Self {
            channels,
            sample_rate: format.sample_rate,
        })
    }

    /// Number of frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in milliseconds.
    pub fn duration_millis(&self) -> u64 {
        frames_to_millis(self.frames() as u64, self.sample_rate)
    }

    /// The PCM format this buffer interleaves to.
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat::pcm_signed(self.sample_rate, self.channels.len() as u16, 16)
    }

    /// Interleave to signed 16-bit little-endian PCM bytes.
    pub fn to_interleaved_pcm16(&self) -> Vec<u8> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len() * 2);
        for i in 0..frames {
            for ch in &self.channels {
                let v = (ch[i] * 32768.0).clamp(-32768.0, 32767.0) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }
}

/// A fully-loaded sound paired with a playback line.
pub struct AudioSample {
    buffer: FloatBuffer,
    meta: AudioMetaData,
    line: PlaybackLine,
}

impl AudioSample {
    /// Pair a buffer and its metadata with an open playback line.
    pub fn new(buffer: FloatBuffer, meta: AudioMetaData, line: PlaybackLine) -> Self {
        Self { buffer, meta, line }
    }

    /// The decoded samples.
    pub fn buffer(&self) -> &FloatBuffer {
        &self.buffer
    }

    /// Metadata for the source the sample was loaded from.
    pub fn metadata(&self) -> &AudioMetaData {
        &self.meta
    }

    /// Queue the whole sample on the line.
    ///
    /// Blocks while the line's buffer is full; returns once all samples are
    /// queued, which is before they have finished playing. Use
    /// [`finish`](Self::finish) to wait for the tail.
    pub fn trigger(&mut self) -> Result<()> {
        let bytes = self.buffer.to_interleaved_pcm16();
        debug!(
            "Triggering sample '{}': {} bytes",
            self.meta.file_name(),
            bytes.len()
        );
        self.line.write(&bytes)?;
        Ok(())
    }

    /// Block until queued audio has played out.
    pub fn finish(&mut self) {
        self.line.drain();
    }
}

impl std::fmt::Debug for AudioSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSample")
            .field("file_name", &self.meta.file_name())
            .field("frames", &self.buffer.frames())
            .finish_non_exhaustive()
    }
}

/// A decoded file stream wired to a playback line.
///
/// Pulls one buffer of PCM from the decoder per [`stream_chunk`] call and
/// pushes it to the line, so playback advances at the caller's pace.
///
/// [`stream_chunk`]: Self::stream_chunk
pub struct RecordingStream {
    meta: AudioMetaData,
    stream: DecodedStream,
    line: PlaybackLine,
    chunk: Vec<u8>,
}

impl RecordingStream {
    /// Wire a decoded stream to a playback line with the given chunk size.
    pub fn new(
        meta: AudioMetaData,
        stream: DecodedStream,
        line: PlaybackLine,
        buffer_frames: usize,
    ) -> Self {
        let chunk_bytes = buffer_frames.max(1) * stream.target_format().frame_size();
        Self {
            meta,
            stream,
            line,
            chunk: vec![0u8; chunk_bytes],
        }
    }

    /// Move one buffer of decoded audio to the line.
    ///
    /// Returns the number of bytes moved; 0 means the stream is drained.
    pub fn stream_chunk(&mut self) -> Result<usize> {
        let n = self.stream.read(&mut self.chunk)?;
        if n > 0 {
            self.line.write(&self.chunk[..n])?;
        }
        Ok(n)
    }

    /// Stream to the end of the file and let the line play out.
    pub fn play_to_end(&mut self) -> Result<()> {
        while self.stream_chunk()? > 0 {}
        self.line.drain();
        Ok(())
    }

    /// Metadata for the stream's source file.
    pub fn metadata(&self) -> &AudioMetaData {
        &self.meta
    }

    /// The decoded PCM format moving through the stream.
    pub fn format(&self) -> PcmFormat {
        self.stream.target_format()
    }

    /// Whether the source has been fully drained.
    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }
}

impl std::fmt::Debug for RecordingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStream")
            .field("file_name", &self.meta.file_name())
            .field("format", &self.stream.target_format())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mono() {
        let buf = FloatBuffer::from_mono(vec![0.1, 0.2, 0.3], 44100);
        assert_eq!(buf.channel_count(), 1);
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.channel(0), Some(&[0.1f32, 0.2, 0.3][..]));
        assert!(buf.channel(1).is_none());
    }

    #[test]
    fn test_from_stereo_length_mismatch() {
        let result = FloatBuffer::from_stereo(vec![0.0; 4], vec![0.0; 3], 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_duration() {
        let buf = FloatBuffer::from_mono(vec![0.0; 22050], 44100);
        assert_eq!(buf.duration_millis(), 500);
    }

    #[test]
    fn test_pcm16_round_trip() {
        // 2 stereo frames
        let samples: [i16; 4] = [0, 16384, -16384, i16::MIN];
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let format = PcmFormat::pcm_signed(44100, 2, 16);
        let buf = FloatBuffer::from_interleaved_pcm(&bytes, &format).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.channel(0).unwrap()[1], -0.5);

        assert_eq!(buf.to_interleaved_pcm16(), bytes);
    }

    #[test]
    fn test_pcm16_ignores_partial_trailing_frame() {
        let format = PcmFormat::pcm_signed(44100, 2, 16);
        // 1 full frame (4 bytes) plus 3 stray bytes
        let bytes = [0u8, 0, 0, 64, 1, 2, 3];
        let buf = FloatBuffer::from_interleaved_pcm(&bytes, &format).unwrap();
        assert_eq!(buf.frames(), 1);
        assert_eq!(buf.channel(1).unwrap()[0], 0.5);
    }

    #[test]
    fn test_pcm8() {
        let format = PcmFormat::pcm_signed(8000, 1, 8);
        let bytes = [0x40u8, 0xC0]; // +64, -64 as i8
        let buf = FloatBuffer::from_interleaved_pcm(&bytes, &format).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(0).unwrap()[0], 0.5);
        assert_eq!(buf.channel(0).unwrap()[1], -0.5);
    }

    #[test]
    fn test_rejects_compressed_format() {
        let mpeg = PcmFormat::mpeg(44100, 2);
        assert!(FloatBuffer::from_interleaved_pcm(&[0u8; 8], &mpeg).is_err());
    }
}
