use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ReqRespError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("incomplete stream")]
    IncompleteStream,

    #[error("stream timed out")]
    TimedOut(#[from] tokio::time::error::Elapsed),

    #[error("disconnected")]
    Disconnected,

    /// The canonical rejection for a status advertising another fork. This is
    /// protocol incompatibility, not misbehaviour, and never counts against
    /// the peer's reputation.
    #[error("wrong fork digest version")]
    WrongForkDigestVersion,

    /// Error string received from the remote on a non-zero response code.
    #[error("{0}")]
    RawError(String),

    #[error("message size exceeds maximum: {size} > {max}")]
    OversizedMessage { size: usize, max: usize },
}

impl From<ssz::DecodeError> for ReqRespError {
    fn from(err: ssz::DecodeError) -> Self {
        ReqRespError::InvalidData(format!("failed to decode ssz: {err:?}"))
    }
}
