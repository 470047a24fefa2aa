//! cinder-core: the sharded storage runtime.
//!
//! A flat keyspace of typed values (strings, hashes, sets, lists,
//! sorted sets, Count-Min sketches, Bloom filters) partitioned across
//! in-process shard actors by a consistent-hash ring. Each shard owns
//! its keyspace slice outright and serializes every mutation through a
//! bounded mailbox; the router forwards misrouted commands and moves
//! keys between shards in the background when nodes join or leave,
//! without taking the keyspace offline.

pub mod config;
pub mod dump;
pub mod error;
pub mod expiry;
pub mod hashing;
pub mod keyspace;
pub mod migrate;
pub mod ring;
pub mod router;
pub mod shard;
pub mod time;
pub mod types;

pub use config::{MigrationConfig, StoreConfig};
pub use dump::KeyDump;
pub use error::{DumpError, RouterError, WrongType};
pub use keyspace::{Keyspace, TtlResult};
pub use migrate::MigrationStats;
pub use ring::HashRing;
pub use router::ShardedStore;
pub use shard::{Reply, ShardHandle, ShardRequest};
pub use types::Value;
