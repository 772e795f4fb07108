//! Sample recorders
//!
//! Records floating-point audio to disk as 16-bit WAV. Two flavors, matching
//! how callers want to trade memory for I/O: [`BufferedRecorder`] accumulates
//! everything in memory and writes once on save, [`StreamingRecorder`] opens
//! the file up front and appends as samples arrive.

use crate::audio::meta::AudioMetaData;
use crate::audio::types::{frames_to_millis, PcmFormat};
use crate::error::{Error, Result};
use hound::{SampleFormat as WavSampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Audio file types a recorder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecorderFileType {
    Wav,
}

/// Map a target path's extension to a recorder file type.
///
/// Extensions of classic sampled-audio formats we cannot write are rejected
/// with a pointer to WAV; anything else is not a recognized audio type.
pub(crate) fn recorder_file_type(path: &Path) -> Result<RecorderFileType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "wav" => Ok(RecorderFileType::Wav),
        "aif" | "aiff" | "aifc" | "au" | "snd" => Err(Error::Recorder(format!(
            "Writing .{} files is not supported, record to .wav instead",
            ext
        ))),
        _ => Err(Error::Recorder(format!(
            "The extension {} is not a recognized audio file type",
            ext
        ))),
    }
}

fn wav_spec(format: &PcmFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: WavSampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
}

fn validate_recorder_channels(format: &PcmFormat) -> Result<()> {
    if format.channels == 1 || format.channels == 2 {
        Ok(())
    } else {
        Err(Error::Recorder(format!(
            "recorders write mono or stereo, not {} channels",
            format.channels
        )))
    }
}

/// A recorder accepting floating-point frames, saved as 16-bit WAV.
pub trait SampleRecorder {
    /// Append mono frames.
    fn record_mono(&mut self, samples: &[f32]) -> Result<()>;

    /// Append stereo frames. Both slices must be the same length.
    fn record_stereo(&mut self, left: &[f32], right: &[f32]) -> Result<()>;

    /// Frames recorded so far.
    fn frames_recorded(&self) -> u64;

    /// Finish the file and return its metadata. A recorder can be saved
    /// exactly once.
    fn save(&mut self) -> Result<AudioMetaData>;
}

/// Accumulates samples in memory; the file is written on save.
pub struct BufferedRecorder {
    path: PathBuf,
    format: PcmFormat,
    channels: Vec<Vec<f32>>,
    saved: bool,
}

impl BufferedRecorder {
    /// Create a buffered recorder targeting `path`.
    ///
    /// # Errors
    /// The format must be mono or stereo.
    pub fn new<P: AsRef<Path>>(path: P, format: &PcmFormat) -> Result<Self> {
        validate_recorder_channels(format)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            format: *format,
            channels: vec![Vec::new(); format.channels as usize],
            saved: false,
        })
    }

    fn check_not_saved(&self) -> Result<()> {
        if self.saved {
            Err(Error::Recorder(format!(
                "{} has already been saved",
                self.path.display()
            )))
        } else {
            Ok(())
        }
    }
}

impl SampleRecorder for BufferedRecorder {
    fn record_mono(&mut self, samples: &[f32]) -> Result<()> {
        self.check_not_saved()?;
        if self.channels.len() != 1 {
            return Err(Error::Recorder(
                "mono frames recorded into a stereo recorder".to_string(),
            ));
        }
        self.channels[0].extend_from_slice(samples);
        Ok(())
    }

    fn record_stereo(&mut self, left: &[f32], right: &[f32]) -> Result<()> {
        self.check_not_saved()?;
        if self.channels.len() != 2 {
            return Err(Error::Recorder(
                "stereo frames recorded into a mono recorder".to_string(),
            ));
        }
        if left.len() != right.len() {
            return Err(Error::Recorder(format!(
                "stereo channels differ in length: {} vs {}",
                left.len(),
                right.len()
            )));
        }
        self.channels[0].extend_from_slice(left);
        self.channels[1].extend_from_slice(right);
        Ok(())
    }

    fn frames_recorded(&self) -> u64 {
        self.channels.first().map_or(0, |c| c.len() as u64)
    }

    fn save(&mut self) -> Result<AudioMetaData> {
        self.check_not_saved()?;

        let mut writer = WavWriter::create(&self.path, wav_spec(&self.format))
            .map_err(|e| Error::Recorder(format!("Failed to create {}: {}", self.path.display(), e)))?;

        let frames = self.frames_recorded() as usize;
        for i in 0..frames {
            for ch in &self.channels {
                writer
                    .write_sample(to_i16(ch[i]))
                    .map_err(|e| Error::Recorder(format!("Write failed: {}", e)))?;
            }
        }

        writer
            .finalize()
            .map_err(|e| Error::Recorder(format!("Failed to finalize {}: {}", self.path.display(), e)))?;
        self.saved = true;

        let length = frames_to_millis(frames as u64, self.format.sample_rate) as i64;
        info!(
            "Saved {} frames to {} ({} ms)",
            frames,
            self.path.display(),
            length
        );
        Ok(AudioMetaData::new(self.path.display().to_string(), length))
    }
}

/// Writes samples to disk as they arrive.
pub struct StreamingRecorder {
    path: PathBuf,
    format: PcmFormat,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl StreamingRecorder {
    /// Create a streaming recorder, opening the target file immediately.
    ///
    /// # Errors
    /// The format must be mono or stereo and the file creatable.
    pub fn new<P: AsRef<Path>>(path: P, format: &PcmFormat) -> Result<Self> {
        validate_recorder_channels(format)?;
        let path = path.as_ref().to_path_buf();
        let writer = WavWriter::create(&path, wav_spec(format))
            .map_err(|e| Error::Recorder(format!("Failed to create {}: {}", path.display(), e)))?;

        debug!("Streaming recorder opened at {}", path.display());
        Ok(Self {
            path,
            format: *format,
            writer: Some(writer),
            frames: 0,
        })
    }

    fn writer_mut(&mut self) -> Result<&mut WavWriter<BufWriter<File>>> {
        self.writer.as_mut().ok_or_else(|| {
            Error::Recorder(format!("{} has already been saved", self.path.display()))
        })
    }
}

impl SampleRecorder for StreamingRecorder {
    fn record_mono(&mut self, samples: &[f32]) -> Result<()> {
        if self.format.channels != 1 {
            return Err(Error::Recorder(
                "mono frames recorded into a stereo recorder".to_string(),
            ));
        }
        let writer = self.writer_mut()?;
        for &s in samples {
            writer
                .write_sample(to_i16(s))
                .map_err(|e| Error::Recorder(format!("Write failed: {}", e)))?;
        }
        self.frames += samples.len() as u64;
        Ok(())
    }

    fn record_stereo(&mut self, left: &[f32], right: &[f32]) -> Result<()> {
        if self.format.channels != 2 {
            return Err(Error::Recorder(
                "stereo frames recorded into a mono recorder".to_string(),
            ));
        }
        if left.len() != right.len() {
            return Err(Error::Recorder(format!(
                "stereo channels differ in length: {} vs {}",
                left.len(),
                right.len()
            )));
        }
        let writer = self.writer_mut()?;
        for (&l, &r) in left.iter().zip(right.iter()) {
            writer
                .write_sample(to_i16(l))
                .map_err(|e| Error::Recorder(format!("Write failed: {}", e)))?;
            writer
                .write_sample(to_i16(r))
                .map_err(|e| Error::Recorder(format!("Write failed: {}", e)))?;
        }
        self.frames += left.len() as u64;
        Ok(())
    }

    fn frames_recorded(&self) -> u64 {
        self.frames
    }

    fn save(&mut self) -> Result<AudioMetaData> {
        let writer = self.writer.take().ok_or_else(|| {
            Error::Recorder(format!("{} has already been saved", self.path.display()))
        })?;

        writer
            .finalize()
            .map_err(|e| Error::Recorder(format!("Failed to finalize {}: {}", self.path.display(), e)))?;

        let length = frames_to_millis(self.frames, self.format.sample_rate) as i64;
        info!(
            "Saved {} frames to {} ({} ms)",
            self.frames,
            self.path.display(),
            length
        );
        Ok(AudioMetaData::new(self.path.display().to_string(), length))
    }
}
