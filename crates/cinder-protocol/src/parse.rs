//! Incremental RESP parser.
//!
//! Operates on a buffered byte slice; the connection loop owns the
//! buffer and reads from the socket. A partial frame parses to
//! `Ok(None)` so the caller can retry once more bytes arrive; only
//! malformed data is an error.

use std::io::Cursor;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// Maximum nesting depth for arrays. Guards the recursive parser
/// against crafted deeply-nested input.
const MAX_NESTING_DEPTH: usize = 64;

/// Maximum declared element count for an array.
const MAX_ARRAY_ELEMENTS: usize = 1_048_576;

/// Maximum bulk string length (512 MB, matching Redis).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Cap for up-front Vec reservation when parsing arrays; a tiny frame
/// declaring a huge count can't pre-allocate more than this.
const PREALLOC_CAP: usize = 1024;

/// Parses one complete frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` on success; the caller
/// drops `consumed` bytes from the buffer. `Ok(None)` means the frame
/// is still incomplete.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf);
    match try_parse(&mut cursor, 0) {
        Ok(frame) => Ok(Some((frame, cursor.position() as usize))),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn try_parse(cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, ProtocolError> {
    let prefix = read_byte(cursor)?;

    match prefix {
        b'+' => {
            let line = read_line(cursor)?;
            Ok(Frame::Simple(line_to_string(line)?))
        }
        b'-' => {
            let line = read_line(cursor)?;
            Ok(Frame::Error(line_to_string(line)?))
        }
        b':' => Ok(Frame::Integer(read_integer_line(cursor)?)),
        b'$' => {
            let len = read_integer_line(cursor)?;
            if len == -1 {
                return Ok(Frame::Null);
            }
            if len < 0 {
                return Err(ProtocolError::InvalidFrameLength(len));
            }
            if len > MAX_BULK_LEN {
                return Err(ProtocolError::BulkTooLarge(len as usize));
            }
            let len = len as usize;

            // payload plus trailing \r\n
            if remaining(cursor) < len + 2 {
                return Err(ProtocolError::Incomplete);
            }
            let pos = cursor.position() as usize;
            let buf = *cursor.get_ref();
            if buf[pos + len] != b'\r' || buf[pos + len + 1] != b'\n' {
                return Err(ProtocolError::InvalidFrameLength(len as i64));
            }
            cursor.set_position((pos + len + 2) as u64);
            Ok(Frame::Bulk(Bytes::copy_from_slice(&buf[pos..pos + len])))
        }
        b'*' => {
            let next_depth = depth + 1;
            if next_depth > MAX_NESTING_DEPTH {
                return Err(ProtocolError::InvalidCommandFrame(
                    "array nesting too deep".into(),
                ));
            }

            let count = read_integer_line(cursor)?;
            if count == -1 {
                return Ok(Frame::NullArray);
            }
            if count < 0 {
                return Err(ProtocolError::InvalidFrameLength(count));
            }
            if count as usize > MAX_ARRAY_ELEMENTS {
                return Err(ProtocolError::InvalidFrameLength(count));
            }

            let count = count as usize;
            let mut frames = Vec::with_capacity(count.min(PREALLOC_CAP));
            for _ in 0..count {
                frames.push(try_parse(cursor, next_depth)?);
            }
            Ok(Frame::Array(frames))
        }
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len() - cursor.position() as usize
}

fn read_byte(cursor: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if remaining(cursor) == 0 {
        return Err(ProtocolError::Incomplete);
    }
    let pos = cursor.position() as usize;
    let byte = cursor.get_ref()[pos];
    cursor.set_position((pos + 1) as u64);
    Ok(byte)
}

/// Reads up to the next `\r\n`, returning the line without the
/// terminator.
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let buf = *cursor.get_ref();
    let start = cursor.position() as usize;

    for i in start..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            cursor.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }
    Err(ProtocolError::Incomplete)
}

fn read_integer_line(cursor: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = read_line(cursor)?;
    let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidInteger)?;
    s.parse().map_err(|_| ProtocolError::InvalidInteger)
}

fn line_to_string(line: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidCommandFrame("invalid utf-8 in line".into()))
}
