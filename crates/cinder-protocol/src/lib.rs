//! cinder-protocol: RESP framing and command parsing.
//!
//! Speaks the classic RESP dialect: `+` simple strings, `-` errors,
//! `:` integers, `$` bulk strings (`$-1` = nil), `*` arrays (`*-1` =
//! nil). [`parse_frame`] consumes buffered bytes incrementally so the
//! connection loop can retry as data arrives; [`Frame::serialize`]
//! writes straight into the outgoing buffer. [`Command`] lifts a
//! request frame into a typed value so the server never touches raw
//! argument arrays.

mod command;
mod error;
mod parse;
mod serialize;
mod types;

pub use command::{Command, SetExpire};
pub use error::ProtocolError;
pub use parse::parse_frame;
pub use types::Frame;
