//! The fixed FNV-1a hash family.
//!
//! The ring's virtual-node tokens, key-to-node lookups, and the sketch
//! types all hash with FNV-1a. The choice is part of the routing and
//! migration contract: tokens computed when a node joined must match
//! key lookups made later, and Bloom/CMS state moved between shards
//! must index the same positions after a restore. Nothing outside this
//! module hashes keys.

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 32-bit FNV-1a. Used for ring tokens, key lookups, and CMS rows.
#[inline]
pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// 64-bit FNV-1a. Used for Bloom filter bit positions.
#[inline]
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = FNV64_OFFSET;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV64_PRIME);
    }
    hash
}
