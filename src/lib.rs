//! # soundline
//!
//! Host audio line adapter with MP3-to-PCM transcoding.
//!
//! **Purpose:** Map generic "get me an audio stream / sample / recorder"
//! requests onto the host audio subsystem, decoding compressed sources to
//! PCM before they reach a device.
//!
//! **Architecture:** Thin adapter over cpal (device lines) and symphonia
//! (decoding); lines bridge the audio callback thread to blocking callers
//! through lock-free ring buffers.
//!
//! The entry point is [`SoundProvider`]:
//!
//! ```ignore
//! let provider = SoundProvider::new();
//! if let Some(mut stream) = provider.recording_stream("song.mp3", 1024) {
//!     stream.play_to_end()?;
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod provider;

pub use audio::{
    AudioMetaData, AudioSample, CaptureLine, DecodedStream, FloatBuffer, PcmFormat, PlaybackLine,
    RecordingStream, SampleEncoding, SampleRecorder, TrackProperties,
};
pub use config::Config;
pub use error::{Error, Result};
pub use provider::SoundProvider;
