//! The typed keyspace: one shard's slice of the key→value map.
//!
//! A `Keyspace` owns a flat `AHashMap<Box<str>, Entry>` holding typed
//! values plus their expiration deadlines. It is strictly single-owner:
//! only the shard task that created it ever touches it, so there is no
//! internal locking. Expired keys are removed lazily on access and
//! swept by the active expiration cycle in [`crate::expiry`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use ahash::AHashMap;
use bytes::Bytes;
use rand::seq::IteratorRandom;

use crate::config::StoreConfig;
use crate::dump::{self, KeyDump};
use crate::error::{DumpError, WrongType};
use crate::time::{self, NO_EXPIRY};
use crate::types::{normalize_range, type_name, Value};
use crate::types::bloom::BloomFilter;
use crate::types::cms::CountMinSketch;
use crate::types::sorted_set::SortedSet;

mod hash;
mod list;
mod set;
mod sketch;
mod string;
mod zset;

/// Result of a TTL query, following Redis semantics. The wire layer
/// renders `NoExpiry` as -1 and `NotFound` as -2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and expires in this many whole seconds.
    Seconds(u64),
    /// Key exists but carries no expiration.
    NoExpiry,
    /// Key does not exist (or is already expired).
    NotFound,
}

/// A single entry: a typed value plus its expiration deadline.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    /// Monotonic deadline in ms; 0 = no expiry.
    pub(crate) expires_at_ms: u64,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at_ms: time::deadline_after(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        time::is_expired(self.expires_at_ms)
    }
}

/// One shard's typed key-value store.
pub struct Keyspace {
    entries: AHashMap<Box<str>, Entry>,
    config: StoreConfig,
    /// Entries that currently carry a deadline.
    expiry_count: usize,
    /// Cumulative keys removed by expiration (lazy + active).
    expired_total: u64,
}

impl Keyspace {
    /// Creates an empty keyspace with default config.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty keyspace with the given config (sketch geometry
    /// defaults live there).
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            entries: AHashMap::new(),
            config,
            expiry_count: 0,
            expired_total: 0,
        }
    }

    /// Number of keys, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cumulative count of keys removed by expiration.
    pub fn expired_total(&self) -> u64 {
        self.expired_total
    }

    /// Number of live keys currently carrying a deadline.
    pub fn keys_with_ttl(&self) -> usize {
        self.expiry_count
    }

    /// Removes a key and its deadline. Returns whether it existed
    /// (an expired key counts as absent).
    pub fn del(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        match self.entries.remove(key) {
            Some(entry) => {
                self.decrement_expiry_if_set(&entry);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the key exists and hasn't expired.
    pub fn exists(&mut self, key: &str) -> bool {
        !self.remove_if_expired(key) && self.entries.contains_key(key)
    }

    /// TTL status for a key.
    pub fn ttl(&mut self, key: &str) -> TtlResult {
        if self.remove_if_expired(key) {
            return TtlResult::NotFound;
        }
        match self.entries.get(key) {
            Some(entry) => match time::remaining_secs(entry.expires_at_ms) {
                Some(secs) => TtlResult::Seconds(secs),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Returns up to `limit` live keys, in no particular order. Used by
    /// the migrator to enumerate a shard's residents.
    pub fn scan_keys(&self, limit: usize) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .take(limit)
            .map(|(key, _)| String::from(&**key))
            .collect()
    }

    /// Serializes a key's value and deadline for migration.
    ///
    /// Returns `None` for missing or expired keys. Does not mutate the
    /// value (the expired-key removal is the usual lazy cleanup).
    pub fn dump(&mut self, key: &str) -> Option<KeyDump> {
        if self.remove_if_expired(key) {
            return None;
        }
        let entry = self.entries.get(key)?;
        Some(KeyDump {
            key: key.to_owned(),
            value: dump::encode_value(&entry.value),
            expires_at_ms: entry.expires_at_ms,
        })
    }

    /// Installs a migrated entry, replacing any existing value and
    /// preserving the dump's absolute deadline.
    pub fn restore(&mut self, dump: KeyDump) -> Result<(), DumpError> {
        let value = dump::decode_value(&dump.value)?;
        let had_expiry = self
            .entries
            .get(dump.key.as_str())
            .map(|e| e.expires_at_ms != NO_EXPIRY)
            .unwrap_or(false);
        self.adjust_expiry_count(had_expiry, dump.expires_at_ms != NO_EXPIRY);
        self.entries.insert(
            dump.key.into_boxed_str(),
            Entry {
                value,
                expires_at_ms: dump.expires_at_ms,
            },
        );
        Ok(())
    }

    /// Samples up to `count` keys among those carrying deadlines and
    /// removes the expired ones. Returns how many were removed.
    pub fn expire_sample(&mut self, count: usize) -> usize {
        if self.expiry_count == 0 {
            return 0;
        }

        let mut rng = rand::rng();
        let sampled: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms != NO_EXPIRY)
            .map(|(key, _)| key)
            .choose_multiple(&mut rng, count)
            .into_iter()
            .map(|key| String::from(&**key))
            .collect();

        let mut removed = 0;
        for key in &sampled {
            if self.remove_if_expired(key) {
                removed += 1;
            }
        }
        removed
    }

    /// Removes the key if its deadline has passed. Returns `true` when
    /// a removal happened; callers treat that as "key absent".
    pub(crate) fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(Entry::is_expired)
            .unwrap_or(false);

        if expired {
            if let Some(entry) = self.entries.remove(key) {
                self.decrement_expiry_if_set(&entry);
                self.expired_total += 1;
            }
        }
        expired
    }

    fn decrement_expiry_if_set(&mut self, entry: &Entry) {
        if entry.expires_at_ms != NO_EXPIRY {
            self.expiry_count = self.expiry_count.saturating_sub(1);
        }
    }

    fn adjust_expiry_count(&mut self, had_expiry: bool, has_expiry: bool) {
        match (had_expiry, has_expiry) {
            (false, true) => self.expiry_count += 1,
            (true, false) => self.expiry_count = self.expiry_count.saturating_sub(1),
            _ => {}
        }
    }

    /// Checks that `key` is either absent or holds the expected
    /// collection type. `Ok(true)` means the key is new, `Ok(false)`
    /// that it exists with the right type.
    fn ensure_collection_type(
        &self,
        key: &str,
        type_check: fn(&Value) -> bool,
    ) -> Result<bool, WrongType> {
        match self.entries.get(key) {
            None => Ok(true),
            Some(entry) if type_check(&entry.value) => Ok(false),
            Some(_) => Err(WrongType),
        }
    }

    /// Inserts a fresh key holding an empty collection, no deadline.
    fn insert_empty(&mut self, key: &str, value: Value) {
        self.entries.insert(Box::from(key), Entry::new(value, None));
    }

    /// Removes the key when a collection mutation emptied it. A key
    /// never holds an empty collection between commands.
    fn drop_if_empty(&mut self, key: &str, is_empty: bool) {
        if is_empty {
            if let Some(entry) = self.entries.remove(key) {
                self.decrement_expiry_if_set(&entry);
            }
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}
