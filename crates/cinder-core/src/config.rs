//! Runtime configuration knobs.
//!
//! Defaults match the store's design constants; the server binary maps
//! CLI flags onto these structs.

use std::time::Duration;

/// Configuration shared by the router and every shard it spawns.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Virtual nodes per real node on the hash ring.
    pub replicas: usize,
    /// Shard mailbox capacity; senders block when it's full.
    pub mailbox_capacity: usize,
    /// Keys sampled per active-expiration round.
    pub ttl_sample_size: usize,
    /// Interval between active-expiration ticks.
    pub ttl_interval: Duration,
    /// Count-Min Sketch rows created on first CMSINCR of a key.
    pub cms_depth: usize,
    /// Count-Min Sketch columns created on first CMSINCR of a key.
    pub cms_width: usize,
    /// Bloom filter bit count created on first BFADD of a key.
    pub bloom_bits: usize,
    /// Bloom filter hash count created on first BFADD of a key.
    pub bloom_hashes: usize,
    /// Knobs for background key migration.
    pub migration: MigrationConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            replicas: 2,
            mailbox_capacity: 100,
            ttl_sample_size: 20,
            ttl_interval: Duration::from_secs(100),
            cms_depth: 4,
            cms_width: 1000,
            bloom_bits: 8192,
            bloom_hashes: 4,
            migration: MigrationConfig::default(),
        }
    }
}

/// Knobs for the background migrator.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Keys processed per batch before re-checking cancellation.
    pub batch_size: usize,
    /// Per-request deadline for dump/restore/delete primitives.
    pub request_timeout: Duration,
    /// Pause between keys so migration doesn't monopolize a shard.
    pub inter_key_yield: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            request_timeout: Duration::from_secs(5),
            inter_key_yield: Duration::from_micros(100),
        }
    }
}
