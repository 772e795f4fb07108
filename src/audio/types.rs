//! Core audio format types
//!
//! Defines the PCM format model used for line negotiation and decoding, plus
//! the frame/millisecond/byte conversions the rest of the adapter leans on.

use std::fmt;

/// Sample encoding of an audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Signed linear PCM, little-endian for widths above 8 bits
    PcmSigned,

    /// Unsigned linear PCM
    PcmUnsigned,

    /// MPEG audio (compressed source, must be decoded before a line accepts it)
    Mpeg,
}

/// Audio format descriptor.
///
/// Used both for the format a caller requests from a line and for the format
/// a decoded stream produces.
///
/// **Format:**
/// - PCM samples are interleaved: [L, R, L, R, ...]
/// - Multi-byte PCM samples are little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bits per sample (8 or 16 for PCM; 0 when unknown for compressed sources)
    pub bits_per_sample: u16,

    /// Sample encoding
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    /// Create a signed PCM format.
    pub fn pcm_signed(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            encoding: SampleEncoding::PcmSigned,
        }
    }

    /// Create a compressed MPEG source format descriptor.
    ///
    /// Only the sample rate and channel count are meaningful; the bit width
    /// of a compressed stream is unknown until it is decoded.
    pub fn mpeg(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 0,
            encoding: SampleEncoding::Mpeg,
        }
    }

    /// Derive the PCM format a compressed source decodes to.
    ///
    /// Signed 16-bit little-endian at the source's sample rate and channel
    /// count, so the frame size is `channels * 2` bytes. This is the target
    /// format handed to playback lines for transcoded streams.
    pub fn decoded(source: &PcmFormat) -> Self {
        Self::pcm_signed(source.sample_rate, source.channels, 16)
    }

    /// Whether this format describes a compressed source.
    pub fn is_compressed(&self) -> bool {
        self.encoding == SampleEncoding::Mpeg
    }

    /// Frame size in bytes (one sample per channel).
    ///
    /// Only meaningful for PCM formats; compressed sources report 0.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes of PCM per second of audio.
    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enc = match self.encoding {
            SampleEncoding::PcmSigned => "signed PCM",
            SampleEncoding::PcmUnsigned => "unsigned PCM",
            SampleEncoding::Mpeg => "MPEG",
        };
        write!(
            f,
            "{} Hz, {} ch, {}-bit {}",
            self.sample_rate, self.channels, self.bits_per_sample, enc
        )
    }
}

/// Convert a frame count to milliseconds at the given sample rate.
pub fn frames_to_millis(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames * 1000 / sample_rate as u64
}

/// Convert milliseconds to a PCM byte count in the given format.
///
/// Rounded down to whole frames.
pub fn millis_to_bytes(millis: u64, format: &PcmFormat) -> usize {
    let frames = millis * format.sample_rate as u64 / 1000;
    frames as usize * format.frame_size()
}

/// Convert a PCM byte count to milliseconds in the given format.
///
/// Partial trailing frames are ignored.
pub fn bytes_to_millis(bytes: u64, format: &PcmFormat) -> u64 {
    let frame_size = format.frame_size() as u64;
    if frame_size == 0 {
        return 0;
    }
    frames_to_millis(bytes / frame_size, format.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_format_derivation() {
        // MP3 source: 44.1kHz stereo -> PCM signed 16-bit, frame size 4
        let source = PcmFormat::mpeg(44100, 2);
        let decoded = PcmFormat::decoded(&source);

        assert_eq!(decoded.encoding, SampleEncoding::PcmSigned);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.bits_per_sample, 16);
        assert_eq!(decoded.frame_size(), 4);
    }

    #[test]
    fn test_decoded_format_mono() {
        let source = PcmFormat::mpeg(22050, 1);
        let decoded = PcmFormat::decoded(&source);

        assert_eq!(decoded.frame_size(), 2);
        assert_eq!(decoded.bytes_per_second(), 44100);
    }

    #[test]
    fn test_frames_to_millis() {
        assert_eq!(frames_to_millis(44100, 44100), 1000);
        assert_eq!(frames_to_millis(22050, 44100), 500);
        assert_eq!(frames_to_millis(0, 44100), 0);
        assert_eq!(frames_to_millis(44100, 0), 0);
    }

    #[test]
    fn test_millis_to_bytes() {
        let format = PcmFormat::pcm_signed(44100, 2, 16);
        // 1 second of 44.1kHz stereo 16-bit = 176400 bytes
        assert_eq!(millis_to_bytes(1000, &format), 176_400);
        assert_eq!(millis_to_bytes(0, &format), 0);
    }

    #[test]
    fn test_bytes_to_millis_round_trip() {
        let format = PcmFormat::pcm_signed(48000, 2, 16);
        let bytes = millis_to_bytes(2500, &format);
        assert_eq!(bytes_to_millis(bytes as u64, &format), 2500);
    }

    #[test]
    fn test_bytes_to_millis_ignores_partial_frame() {
        let format = PcmFormat::pcm_signed(1000, 1, 16);
        // 2001 bytes = 1000 whole frames + 1 byte = 1000ms
        assert_eq!(bytes_to_millis(2001, &format), 1000);
    }

    #[test]
    fn test_compressed_frame_size_is_zero() {
        let source = PcmFormat::mpeg(44100, 2);
        assert!(source.is_compressed());
        assert_eq!(source.frame_size(), 0);
    }
}
