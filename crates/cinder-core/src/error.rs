//! Error types for the storage runtime.

use thiserror::Error;

/// A command was applied to a key holding a value of a different type.
///
/// Every typed operation reports this explicitly instead of silently
/// returning a zero value; the wire layer renders it as the standard
/// WRONGTYPE error string.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
pub struct WrongType;

/// Errors surfaced by the router and the migration machinery.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No shard can serve the key (empty topology).
    #[error("no shard available for key {key}")]
    NoShard { key: String },

    /// `add_node` was called with an id that is already registered.
    #[error("node {node} already exists")]
    DuplicateNode { node: String },

    /// A freshly added shard did not acknowledge the readiness probe
    /// within the deadline; the topology change was rolled back.
    #[error("node {node} failed to become ready")]
    NodeNotReady { node: String },

    /// An admin operation named a node that isn't registered.
    #[error("no such node: {node}")]
    UnknownNode { node: String },

    /// The target shard's mailbox is closed (actor stopped).
    #[error("shard unavailable")]
    ShardUnavailable,

    /// A shutdown or migration deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The surrounding operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors decoding a migration snapshot blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DumpError {
    /// The blob ended before the declared fields were read.
    #[error("unexpected end of dump")]
    UnexpectedEof,

    /// The leading tag byte doesn't name a known value type.
    #[error("unknown value tag: {0}")]
    UnknownTag(u8),

    /// A count or geometry field is inconsistent with the payload.
    #[error("invalid dump data: {0}")]
    InvalidData(String),
}
