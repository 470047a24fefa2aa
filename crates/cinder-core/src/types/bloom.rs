//! Bloom filter membership sketch.
//!
//! A fixed-size bit vector with `k` seeded FNV-1a hash positions per
//! item. Inserted items always test positive (no false negatives);
//! unrelated items may test positive with a probability set by the
//! filter geometry.

use crate::hashing::fnv1a_64;

/// A Bloom filter over `bits` bit positions with `hashes` probes.
///
/// Hash `j` uses seed `j + 1`. Seeds are serialized with the filter so
/// a migrated filter probes the same positions on the new shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: usize,
    seeds: Vec<u64>,
    /// Bit-packed vector, `ceil(bits / 8)` bytes.
    data: Vec<u8>,
}

impl BloomFilter {
    /// Creates an empty filter of `bits` positions with `hashes` probes.
    ///
    /// Both parameters floor at 1.
    pub fn new(bits: usize, hashes: usize) -> Self {
        let bits = bits.max(1);
        let hashes = hashes.max(1);
        Self {
            bits,
            seeds: (0..hashes as u64).map(|j| j + 1).collect(),
            data: vec![0; bits.div_ceil(8)],
        }
    }

    /// Rebuilds a filter from its serialized parts.
    pub(crate) fn from_parts(bits: usize, seeds: Vec<u64>, data: Vec<u8>) -> Self {
        Self { bits, seeds, data }
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn hashes(&self) -> usize {
        self.seeds.len()
    }

    pub(crate) fn seeds(&self) -> &[u64] {
        &self.seeds
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    fn position(&self, item: &str, seed: u64) -> usize {
        ((fnv1a_64(item.as_bytes()) ^ seed) % self.bits as u64) as usize
    }

    /// Sets the item's bit positions. Insertion always succeeds; the
    /// filter cannot report whether the item was already present.
    pub fn insert(&mut self, item: &str) {
        for j in 0..self.seeds.len() {
            let pos = self.position(item, self.seeds[j]);
            self.data[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Returns `true` when every probe position is set.
    pub fn contains(&self, item: &str) -> bool {
        self.seeds
            .iter()
            .all(|&seed| {
                let pos = self.position(item, seed);
                self.data[pos / 8] & (1 << (pos % 8)) != 0
            })
    }
}
