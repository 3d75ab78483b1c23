use thiserror::Error;

/// Main error type for KNX stack operations
#[derive(Error, Debug)]
pub enum KnxError {
    #[error("Link error: {0}")]
    Link(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Outbound slot busy: {0}")]
    SlotBusy(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for KNX stack operations
pub type KnxResult<T> = Result<T, KnxError>;
