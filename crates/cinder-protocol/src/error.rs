//! Protocol error types.

use thiserror::Error;

/// Errors from parsing the RESP wire format or lifting frames into
/// commands. Everything here is a per-request failure: the connection
/// reports it to the client and keeps reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer doesn't hold a complete frame yet; read more data
    /// and retry.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The first byte of a frame isn't a known RESP type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// An integer line failed to parse.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared a nonsensical length.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A bulk string exceeds the size cap.
    #[error("bulk string of {0} bytes exceeds the limit")]
    BulkTooLarge(usize),

    /// A request frame wasn't an array of strings.
    #[error("invalid command frame: {0}")]
    InvalidCommandFrame(String),

    /// A command got the wrong number of arguments.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// A command argument failed to parse (bad number, bad option).
    #[error("invalid argument for '{0}': {1}")]
    InvalidArgument(String, String),
}
