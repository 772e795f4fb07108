//! Audio plumbing: formats, decoding, host lines, in-memory samples,
//! metadata, and recorders.

pub mod decoded;
pub mod line;
pub mod meta;
pub mod record;
pub mod sample;
pub mod types;

pub use decoded::DecodedStream;
pub use line::{CaptureLine, PlaybackLine};
pub use meta::{AudioMetaData, TrackProperties};
pub use record::{BufferedRecorder, SampleRecorder, StreamingRecorder};
pub use sample::{AudioSample, FloatBuffer, RecordingStream};
pub use types::{PcmFormat, SampleEncoding};
