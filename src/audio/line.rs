//! Host audio lines using cpal
//!
//! A line is a host audio channel: [`PlaybackLine`] feeds PCM to an output
//! device, [`CaptureLine`] pulls PCM from an input device. Each line bridges
//! the cpal callback thread to the blocking caller with a lock-free SPSC
//! ring buffer, so the public surface stays synchronous.
//!
//! Device sample formats (f32/i16/u16) are negotiated against the device's
//! supported configurations and bridged in the callback; the caller-facing
//! byte format is always the PCM format the line was opened with.

use crate::audio::types::{PcmFormat, SampleEncoding};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfigRange,
};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Poll interval while a blocking read/write waits on the ring buffer.
const RING_POLL: Duration = Duration::from_micros(500);

/// List available audio output device names.
pub fn list_output_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Line(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// List available audio input device names.
pub fn list_input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices: Vec<String> = host
        .input_devices()
        .map_err(|e| Error::Line(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} input devices", devices.len());
    Ok(devices)
}

/// Find an output device by name.
pub(crate) fn find_output_device(name: &str) -> Result<Device> {
    let host = cpal::default_host();
    host.output_devices()
        .map_err(|e| Error::Line(format!("Failed to enumerate devices: {}", e)))?
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| Error::Line(format!("Output device '{}' not found", name)))
}

/// Find an input device by name.
pub(crate) fn find_input_device(name: &str) -> Result<Device> {
    let host = cpal::default_host();
    host.input_devices()
        .map_err(|e| Error::Line(format!("Failed to enumerate devices: {}", e)))?
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| Error::Line(format!("Input device '{}' not found", name)))
}

/// Reject formats a line cannot carry: only signed 8/16-bit PCM crosses a
/// line boundary; compressed sources must be decoded first.
fn validate_line_format(format: &PcmFormat) -> Result<()> {
    if format.encoding != SampleEncoding::PcmSigned {
        return Err(Error::UnsupportedFormat(format!(
            "lines carry signed PCM only, not {}",
            format
        )));
    }
    if format.bits_per_sample != 8 && format.bits_per_sample != 16 {
        return Err(Error::UnsupportedFormat(format!(
            "unsupported bit depth in {}",
            format
        )));
    }
    if format.channels == 0 {
        return Err(Error::UnsupportedFormat("zero channels".to_string()));
    }
    Ok(())
}

/// Pick the best supported device configuration for the requested format.
///
/// Prefers an exact channel match and f32 device samples; any configuration
/// that cannot run the requested sample rate is rejected, since the adapter
/// never resamples.
fn pick_config(
    ranges: Vec<SupportedStreamConfigRange>,
    format: &PcmFormat,
) -> Result<(StreamConfig, SampleFormat)> {
    let rate = format.sample_rate;

    let format_pref = |f: SampleFormat| match f {
        SampleFormat::F32 => 3,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 1,
        _ => 0,
    };

    let best = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate().0 <= rate && r.max_sample_rate().0 >= rate)
        .filter(|r| format_pref(r.sample_format()) > 0)
        .max_by_key(|r| {
            let channel_match = if r.channels() == format.channels { 1 } else { 0 };
            (channel_match, format_pref(r.sample_format()))
        })
        .ok_or_else(|| {
            Error::UnsupportedFormat(format!("no device configuration supports {}", format))
        })?;

    let sample_format = best.sample_format();
    let config = best.with_sample_rate(SampleRate(rate)).config();
    Ok((config, sample_format))
}

/// Map one source-layout frame onto a device-layout frame.
///
/// Mono fans out to every device channel; a mono device averages the source
/// frame; otherwise channels are copied positionally and extras zero-filled.
fn map_frame(src: &[f32], dev: &mut [f32]) {
    if src.len() == dev.len() {
        dev.copy_from_slice(src);
    } else if src.len() == 1 {
        dev.fill(src[0]);
    } else if dev.len() == 1 {
        dev[0] = src.iter().sum::<f32>() / src.len() as f32;
    } else {
        for (i, slot) in dev.iter_mut().enumerate() {
            *slot = src.get(i).copied().unwrap_or(0.0);
        }
    }
}

/// A playback line: an open output stream accepting PCM writes.
pub struct PlaybackLine {
    format: PcmFormat,
    device_name: String,
    stream: Option<Stream>,
    prod: HeapProd<f32>,
    buffer_frames: usize,
    /// Set by the audio callback's error handler
    error_flag: Arc<AtomicBool>,
}

impl PlaybackLine {
    /// Open a playback line on the given device (host default when `None`).
    ///
    /// The device buffer is sized at `buffer_frames * 4` frames; the ring
    /// buffer bridging the caller holds the same amount again, so a writer
    /// stays roughly one device buffer ahead.
    ///
    /// # Errors
    /// - Format is not signed 8/16-bit PCM
    /// - No device, or no configuration supporting the format
    /// - Stream construction or start fails
    pub fn open(
        device: Option<&Device>,
        format: &PcmFormat,
        buffer_frames: usize,
    ) -> Result<Self> {
        validate_line_format(format)?;

        let device = match device {
            Some(d) => d.clone(),
            None => cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::Line("No default output device found".to_string()))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let ranges = device
            .supported_output_configs()
            .map_err(|e| Error::Line(format!("Failed to get device configs: {}", e)))?
            .collect();

        let (mut config, sample_format) = pick_config(ranges, format)?;
        let device_buffer_frames = (buffer_frames * 4).max(1) as u32;
        config.buffer_size = cpal::BufferSize::Fixed(device_buffer_frames);

        debug!(
            "PlaybackLine on '{}': device format {:?}, {} ch at {} Hz, buffer {} frames",
            device_name, sample_format, config.channels, config.sample_rate.0, device_buffer_frames
        );

        let ring_capacity = (buffer_frames * 4).max(16) * format.channels as usize;
        let rb = HeapRb::<f32>::new(ring_capacity);
        let (prod, cons) = rb.split();

        let error_flag = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, format.channels, cons, &error_flag)?
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, format.channels, cons, &error_flag)?
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, format.channels, cons, &error_flag)?
            }
            other => {
                return Err(Error::Line(format!(
                    "Unsupported device sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Line(format!("Failed to start stream: {}", e)))?;

        info!("Opened playback line on '{}' for {}", device_name, format);

        Ok(Self {
            format: *format,
            device_name,
            stream: Some(stream),
            prod,
            buffer_frames,
            error_flag,
        })
    }

    /// Build the output stream for one device sample type.
    ///
    /// The callback pops whole source frames only, so a writer that was
    /// interrupted mid-frame can never tear a frame; underruns play silence.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        src_channels: u16,
        mut cons: HeapCons<f32>,
        error_flag: &Arc<AtomicBool>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let src_ch = src_channels as usize;
        let dev_ch = config.channels as usize;
        let mut src_frame = vec![0.0f32; src_ch];
        let mut dev_frame = vec![0.0f32; dev_ch];
        let error_flag = Arc::clone(error_flag);

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(dev_ch) {
                        if cons.occupied_len() >= src_ch {
                            for slot in src_frame.iter_mut() {
                                *slot = cons.try_pop().unwrap_or(0.0);
                            }
                        } else {
                            src_frame.fill(0.0);
                        }
                        map_frame(&src_frame, &mut dev_frame[..frame.len()]);
                        for (slot, &v) in frame.iter_mut().zip(dev_frame.iter()) {
                            *slot = T::from_sample(v.clamp(-1.0, 1.0));
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Line(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    /// Write PCM bytes to the line, blocking until all are queued.
    ///
    /// Bytes are interpreted in the line's open format (signed 8-bit, or
    /// signed 16-bit little-endian). Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns an error if the underlying stream has failed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.format.bits_per_sample {
            16 => {
                for pair in bytes.chunks_exact(2) {
                    let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0;
                    self.push_blocking(sample)?;
                }
                Ok(bytes.len() - bytes.len() % 2)
            }
            8 => {
                for &byte in bytes {
                    self.push_blocking(byte as i8 as f32 / 128.0)?;
                }
                Ok(bytes.len())
            }
            bits => Err(Error::UnsupportedFormat(format!("{}-bit write", bits))),
        }
    }

    fn push_blocking(&mut self, sample: f32) -> Result<()> {
        let mut sample = sample;
        loop {
            match self.prod.try_push(sample) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    if self.error_flag.load(Ordering::SeqCst) {
                        return Err(Error::Line(format!(
                            "Stream on '{}' failed during write",
                            self.device_name
                        )));
                    }
                    sample = rejected;
                    thread::sleep(RING_POLL);
                }
            }
        }
    }

    /// Block until all queued audio has been handed to the device, then a
    /// device buffer's worth longer so the tail actually plays.
    pub fn drain(&mut self) {
        while self.prod.occupied_len() > 0 {
            if self.error_flag.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let tail_frames = (self.buffer_frames * 4) as u64;
        let tail_ms = tail_frames * 1000 / self.format.sample_rate.max(1) as u64;
        thread::sleep(Duration::from_millis(tail_ms));
    }

    /// Stop playback and release the stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::Line(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    /// Whether the line is open and its stream healthy.
    pub fn is_open(&self) -> bool {
        self.stream.is_some() && !self.error_flag.load(Ordering::SeqCst)
    }

    /// The caller-facing PCM format.
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Requested buffer size in frames.
    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Name of the device backing this line.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for PlaybackLine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for PlaybackLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackLine")
            .field("device_name", &self.device_name)
            .field("format", &self.format)
            .field("buffer_frames", &self.buffer_frames)
            .finish_non_exhaustive()
    }
}

/// A capture line: an open input stream producing PCM reads.
pub struct CaptureLine {
    format: PcmFormat,
    device_name: String,
    stream: Option<Stream>,
    cons: HeapCons<f32>,
    buffer_frames: usize,
    error_flag: Arc<AtomicBool>,
    /// Frames dropped because the caller read too slowly
    overruns: Arc<AtomicU64>,
}

impl CaptureLine {
    /// Open a capture line on the given device (host default when `None`).
    ///
    /// The device buffer is sized at `buffer_frames` frames.
    ///
    /// # Errors
    /// - Format is not signed 8/16-bit PCM
    /// - No device, or no configuration supporting the format
    /// - Stream construction or start fails
    pub fn open(
        device: Option<&Device>,
        format: &PcmFormat,
        buffer_frames: usize,
    ) -> Result<Self> {
        validate_line_format(format)?;

        let device = match device {
            Some(d) => d.clone(),
            None => cpal::default_host()
                .default_input_device()
                .ok_or_else(|| Error::Line("No default input device found".to_string()))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let ranges = device
            .supported_input_configs()
            .map_err(|e| Error::Line(format!("Failed to get device configs: {}", e)))?
            .collect();

        let (mut config, sample_format) = pick_config(ranges, format)?;
        config.buffer_size = cpal::BufferSize::Fixed(buffer_frames.max(1) as u32);

        debug!(
            "CaptureLine on '{}': device format {:?}, {} ch at {} Hz, buffer {} frames",
            device_name, sample_format, config.channels, config.sample_rate.0, buffer_frames
        );

        // Generous ring so a momentarily slow reader doesn't drop frames
        let ring_capacity = buffer_frames.max(16) * 8 * format.channels as usize;
        let rb = HeapRb::<f32>::new(ring_capacity);
        let (prod, cons) = rb.split();

        let error_flag = Arc::new(AtomicBool::new(false));
        let overruns = Arc::new(AtomicU64::new(0));

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config,
                format.channels,
                prod,
                &error_flag,
                &overruns,
            )?,
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config,
                format.channels,
                prod,
                &error_flag,
                &overruns,
            )?,
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config,
                format.channels,
                prod,
                &error_flag,
                &overruns,
            )?,
            other => {
                return Err(Error::Line(format!(
                    "Unsupported device sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Line(format!("Failed to start stream: {}", e)))?;

        info!("Opened capture line on '{}' for {}", device_name, format);

        Ok(Self {
            format: *format,
            device_name,
            stream: Some(stream),
            cons,
            buffer_frames,
            error_flag,
            overruns,
        })
    }

    /// Build the input stream for one device sample type.
    ///
    /// Whole frames only: when the ring lacks room for a complete frame the
    /// frame is dropped and counted, keeping reader and writer frame-aligned.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        src_channels: u16,
        mut prod: HeapProd<f32>,
        error_flag: &Arc<AtomicBool>,
        overruns: &Arc<AtomicU64>,
    ) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let src_ch = src_channels as usize;
        let dev_ch = config.channels as usize;
        let mut dev_frame = vec![0.0f32; dev_ch];
        let mut src_frame = vec![0.0f32; src_ch];
        let error_flag = Arc::clone(error_flag);
        let overruns = Arc::clone(overruns);

        let stream = device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(dev_ch) {
                        for (slot, &v) in dev_frame.iter_mut().zip(frame.iter()) {
                            *slot = f32::from_sample(v);
                        }
                        map_frame(&dev_frame[..frame.len()], &mut src_frame);
                        if prod.vacant_len() >= src_ch {
                            for &v in src_frame.iter() {
                                let _ = prod.try_push(v);
                            }
                        } else {
                            overruns.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Line(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    /// Read captured PCM bytes, blocking until `buf` is filled with whole
    /// frames. Returns the number of bytes read.
    ///
    /// # Errors
    /// Returns an error if the underlying stream has failed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let bytes_per_sample = self.format.bits_per_sample as usize / 8;
        let frame_size = self.format.frame_size();
        if frame_size == 0 {
            return Err(Error::UnsupportedFormat(format!("{}", self.format)));
        }
        let want_samples = (buf.len() / frame_size) * self.format.channels as usize;

        let mut written = 0usize;
        for _ in 0..want_samples {
            let sample = self.pop_blocking()?;
            match bytes_per_sample {
                2 => {
                    let v = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                    buf[written..written + 2].copy_from_slice(&v.to_le_bytes());
                    written += 2;
                }
                _ => {
                    let v = (sample.clamp(-1.0, 1.0) * 127.0) as i8;
                    buf[written] = v as u8;
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    fn pop_blocking(&mut self) -> Result<f32> {
        loop {
            if let Some(sample) = self.cons.try_pop() {
                return Ok(sample);
            }
            if self.error_flag.load(Ordering::SeqCst) {
                return Err(Error::Line(format!(
                    "Stream on '{}' failed during read",
                    self.device_name
                )));
            }
            thread::sleep(RING_POLL);
        }
    }

    /// Stop capture and release the stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::Line(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    /// Whether the line is open and its stream healthy.
    pub fn is_open(&self) -> bool {
        self.stream.is_some() && !self.error_flag.load(Ordering::SeqCst)
    }

    /// The caller-facing PCM format.
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Requested buffer size in frames.
    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Name of the device backing this line.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Frames dropped because the caller read too slowly.
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureLine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for CaptureLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLine")
            .field("device_name", &self.device_name)
            .field("format", &self.format)
            .field("buffer_frames", &self.buffer_frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // Requires audio hardware; just verify it doesn't panic
        let result = list_output_device_names();
        assert!(result.is_ok() || result.is_err());

        let result = list_input_device_names();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_validate_line_format_rejects_compressed() {
        let mpeg = PcmFormat::mpeg(44100, 2);
        assert!(validate_line_format(&mpeg).is_err());
    }

    #[test]
    fn test_validate_line_format_rejects_odd_bit_depth() {
        let odd = PcmFormat::pcm_signed(44100, 2, 24);
        assert!(validate_line_format(&odd).is_err());
        let ok = PcmFormat::pcm_signed(44100, 2, 16);
        assert!(validate_line_format(&ok).is_ok());
    }

    #[test]
    fn test_pick_config_prefers_f32_and_matching_channels() {
        use cpal::SupportedBufferSize;
        let ranges = vec![
            SupportedStreamConfigRange::new(
                2,
                SampleRate(8000),
                SampleRate(96000),
                SupportedBufferSize::Unknown,
                SampleFormat::I16,
            ),
            SupportedStreamConfigRange::new(
                2,
                SampleRate(8000),
                SampleRate(96000),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            ),
            SupportedStreamConfigRange::new(
                1,
                SampleRate(8000),
                SampleRate(96000),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            ),
        ];
        let format = PcmFormat::pcm_signed(44100, 2, 16);
        let (config, sample_format) = pick_config(ranges, &format).unwrap();
        assert_eq!(sample_format, SampleFormat::F32);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate.0, 44100);
    }

    #[test]
    fn test_pick_config_falls_back_to_other_channel_counts() {
        use cpal::SupportedBufferSize;
        // Only a stereo configuration exists; a mono request still opens
        let ranges = vec![SupportedStreamConfigRange::new(
            2,
            SampleRate(8000),
            SampleRate(96000),
            SupportedBufferSize::Unknown,
            SampleFormat::I16,
        )];
        let format = PcmFormat::pcm_signed(44100, 1, 16);
        let (config, sample_format) = pick_config(ranges, &format).unwrap();
        assert_eq!(sample_format, SampleFormat::I16);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_pick_config_rejects_unsupported_rate() {
        use cpal::SupportedBufferSize;
        let ranges = vec![SupportedStreamConfigRange::new(
            2,
            SampleRate(48000),
            SampleRate(48000),
            SupportedBufferSize::Unknown,
            SampleFormat::F32,
        )];
        let format = PcmFormat::pcm_signed(44100, 2, 16);
        assert!(pick_config(ranges, &format).is_err());
    }

    #[test]
    fn test_map_frame_mono_to_stereo() {
        let src = [0.5f32];
        let mut dev = [0.0f32; 2];
        map_frame(&src, &mut dev);
        assert_eq!(dev, [0.5, 0.5]);
    }

    #[test]
    fn test_map_frame_stereo_to_mono() {
        let src = [0.2f32, 0.4];
        let mut dev = [0.0f32; 1];
        map_frame(&src, &mut dev);
        assert!((dev[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_map_frame_matching_channels() {
        let src = [0.1f32, -0.1];
        let mut dev = [0.0f32; 2];
        map_frame(&src, &mut dev);
        assert_eq!(dev, [0.1, -0.1]);
    }

    #[test]
    fn test_map_frame_zero_fills_extra_device_channels() {
        let src = [0.1f32, 0.2];
        let mut dev = [9.0f32; 4];
        map_frame(&src, &mut dev);
        assert_eq!(dev, [0.1, 0.2, 0.0, 0.0]);
    }
}
