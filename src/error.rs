//! Error types for soundline
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Internal operations return `Result`; the provider surface catches these,
//! logs them, and degrades to `None` (see [`crate::provider`]).

use thiserror::Error;

/// Main error type for the soundline adapter
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio line acquisition or stream errors
    #[error("Audio line error: {0}")]
    Line(String),

    /// Metadata probing errors
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Sample recorder errors
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Format not supported by a device or codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using soundline Error
pub type Result<T> = std::result::Result<T, Error>;
