//! Error types for driver operations.

use player_types::PlaybackStatus;
use thiserror::Error;

/// Failures surfaced by driver operations on the control path.
///
/// Failures inside the real-time callback never propagate; they stop the stream.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Header malformed, size misaligned, or backend initialization rejected.
    #[error("load failed: {0}")]
    Load(String),

    /// Read or seek on the backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decode backend reported an error.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Scratch memory could not be reserved from the backend.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The operation needs a loaded session.
    #[error("no session loaded")]
    NoSession,

    /// The operation is not allowed in the current playback state.
    #[error("not allowed while {0:?}")]
    InvalidState(PlaybackStatus),

    /// The driver does not provide this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// `set_option` received a value it cannot parse.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The output harness refused the stream.
    #[error("output error: {0}")]
    Output(String),
}

/// Failures reported by the hardware decode coprocessor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// Scratch memory reservation failed.
    #[error("coprocessor scratch memory unavailable")]
    OutOfScratch,

    /// The coprocessor rejected the descriptor during setup.
    #[error("coprocessor rejected descriptor (code {0})")]
    Rejected(i32),

    /// The coprocessor failed while decoding a unit.
    #[error("coprocessor fault (code {0})")]
    Fault(i32),
}

impl From<BackendError> for DriverError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfScratch => DriverError::ResourceExhausted(err.to_string()),
            BackendError::Rejected(_) => DriverError::Load(err.to_string()),
            BackendError::Fault(_) => DriverError::Decode(err.to_string()),
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
