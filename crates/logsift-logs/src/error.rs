use crate::reader::LogReaderState;

/// Errors returned synchronously by reader operations
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("no log patterns configured")]
    NoLogPatterns,

    #[error("cannot change {property} while reader is {state}")]
    NotPreparing {
        property: &'static str,
        state: LogReaderState,
    },

    #[error("operation not allowed while reader is {0}")]
    InvalidState(LogReaderState),

    #[error("invalid value for {property}: {reason}")]
    InvalidValue {
        property: &'static str,
        reason: String,
    },

    #[error("reader has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = ReaderError> = std::result::Result<T, E>;
