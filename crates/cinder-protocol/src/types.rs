//! RESP frame types.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// `Bulk` carries `Bytes` so payloads move through the pipeline
/// without copies. Nil values keep the classic RESP encodings:
/// `Null` is `$-1\r\n`, `NullArray` is `*-1\r\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Short status reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Binary-safe string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+a\r\n+b\r\n`.
    Array(Vec<Frame>),

    /// Nil bulk string, `$-1\r\n`.
    Null,

    /// Nil array, `*-1\r\n`.
    NullArray,
}

impl Frame {
    /// Bulk frame from a UTF-8 string.
    pub fn bulk(s: impl Into<String>) -> Frame {
        Frame::Bulk(Bytes::from(s.into().into_bytes()))
    }

    /// Returns `true` for either nil encoding.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::NullArray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_helper() {
        assert_eq!(Frame::bulk("hi"), Frame::Bulk(Bytes::from("hi")));
    }

    #[test]
    fn is_null() {
        assert!(Frame::Null.is_null());
        assert!(Frame::NullArray.is_null());
        assert!(!Frame::Integer(0).is_null());
    }
}
