//! Binary snapshot format for single-key migration.
//!
//! A value serializes to a self-describing blob: one tag byte followed
//! by a tag-specific body. Multi-byte integers are little-endian;
//! variable-length fields are length-prefixed with a `u32`. This is a
//! transfer format between shards of one process, not a persistence
//! format, but it is part of the migration contract, so the layout is
//! fixed and hand-rolled rather than delegated to a codegen framework.
//!
//! `decode_value(encode_value(v)) == v` for every value, and decoding
//! never panics on corrupt input.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

use crate::error::DumpError;
use crate::types::bloom::BloomFilter;
use crate::types::cms::CountMinSketch;
use crate::types::sorted_set::SortedSet;
use crate::types::Value;

/// A serialized key ready to move between shards.
///
/// `expires_at_ms` is the absolute monotonic deadline (0 = no expiry);
/// restoring installs it verbatim, so TTLs survive migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDump {
    pub key: String,
    /// Self-describing value blob (see module docs).
    pub value: Vec<u8>,
    pub expires_at_ms: u64,
}

const TAG_STRING: u8 = 0;
const TAG_SET: u8 = 1;
const TAG_HASH: u8 = 2;
const TAG_CMS: u8 = 3;
const TAG_LIST: u8 = 4;
const TAG_ZSET: u8 = 5;
const TAG_BLOOM: u8 = 6;

/// Upper bound on decoded collection counts. A corrupt count field
/// fails cleanly instead of driving an unbounded allocation loop.
const MAX_COUNT: u32 = 100_000_000;

/// Serializes a value into its migration blob.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    match value {
        Value::Str(data) => {
            buf.push(TAG_STRING);
            write_bytes(&mut buf, data);
        }
        Value::Set(set) => {
            buf.push(TAG_SET);
            write_u32(&mut buf, set.len() as u32);
            for member in set {
                write_str(&mut buf, member);
            }
        }
        Value::Hash(hash) => {
            buf.push(TAG_HASH);
            write_u32(&mut buf, hash.len() as u32);
            for (field, value) in hash {
                write_str(&mut buf, field);
                write_str(&mut buf, value);
            }
        }
        Value::Cms(sketch) => {
            buf.push(TAG_CMS);
            write_u32(&mut buf, sketch.depth() as u32);
            write_u32(&mut buf, sketch.width() as u32);
            for &seed in sketch.seeds() {
                write_u32(&mut buf, seed);
            }
            for &counter in sketch.table() {
                write_u32(&mut buf, counter);
            }
        }
        Value::List(list) => {
            buf.push(TAG_LIST);
            write_u32(&mut buf, list.len() as u32);
            for element in list {
                write_str(&mut buf, element);
            }
        }
        Value::Zset(zset) => {
            buf.push(TAG_ZSET);
            write_u32(&mut buf, zset.len() as u32);
            for (member, score) in zset.iter() {
                write_str(&mut buf, member);
                buf.extend_from_slice(&score.to_le_bytes());
            }
        }
        Value::Bloom(filter) => {
            buf.push(TAG_BLOOM);
            write_u32(&mut buf, filter.bits() as u32);
            write_u32(&mut buf, filter.hashes() as u32);
            for &seed in filter.seeds() {
                buf.extend_from_slice(&seed.to_le_bytes());
            }
            buf.extend_from_slice(filter.data());
        }
    }
    buf
}

/// Reconstructs a value from its migration blob.
pub fn decode_value(blob: &[u8]) -> Result<Value, DumpError> {
    let mut input = blob;
    let tag = read_u8(&mut input)?;

    let value = match tag {
        TAG_STRING => Value::Str(Bytes::from(read_vec(&mut input)?)),
        TAG_SET => {
            let count = read_count(&mut input, "set members")?;
            let mut set = HashSet::with_capacity(capped(count));
            for _ in 0..count {
                set.insert(read_string(&mut input)?);
            }
            Value::Set(set)
        }
        TAG_HASH => {
            let count = read_count(&mut input, "hash fields")?;
            let mut hash = HashMap::with_capacity(capped(count));
            for _ in 0..count {
                let field = read_string(&mut input)?;
                let value = read_string(&mut input)?;
                hash.insert(field, value);
            }
            Value::Hash(hash)
        }
        TAG_CMS => {
            let depth = read_count(&mut input, "cms depth")? as usize;
            let width = read_count(&mut input, "cms width")? as usize;
            let cells = depth
                .checked_mul(width)
                .filter(|&n| n <= MAX_COUNT as usize)
                .ok_or_else(|| {
                    DumpError::InvalidData(format!("cms geometry {depth}x{width} out of range"))
                })?;
            let mut seeds = Vec::with_capacity(depth.min(1024));
            for _ in 0..depth {
                seeds.push(read_u32(&mut input)?);
            }
            let mut table = Vec::with_capacity(cells.min(65_536));
            for _ in 0..cells {
                table.push(read_u32(&mut input)?);
            }
            Value::Cms(CountMinSketch::from_parts(depth, width, seeds, table))
        }
        TAG_LIST => {
            let count = read_count(&mut input, "list elements")?;
            let mut list = VecDeque::with_capacity(capped(count));
            for _ in 0..count {
                list.push_back(read_string(&mut input)?);
            }
            Value::List(list)
        }
        TAG_ZSET => {
            let count = read_count(&mut input, "zset members")?;
            let mut zset = SortedSet::new();
            for _ in 0..count {
                let member = read_string(&mut input)?;
                let score = read_f64(&mut input)?;
                zset.insert(member, score);
            }
            Value::Zset(zset)
        }
        TAG_BLOOM => {
            let bits = read_count(&mut input, "bloom bits")? as usize;
            let hashes = read_count(&mut input, "bloom hashes")? as usize;
            let mut seeds = Vec::with_capacity(hashes.min(1024));
            for _ in 0..hashes {
                seeds.push(read_u64(&mut input)?);
            }
            let expected = bits.div_ceil(8);
            let data = read_exact(&mut input, expected)?.to_vec();
            Value::Bloom(BloomFilter::from_parts(bits, seeds, data))
        }
        other => return Err(DumpError::UnknownTag(other)),
    };

    if !input.is_empty() {
        return Err(DumpError::InvalidData(format!(
            "{} trailing bytes after value",
            input.len()
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// write helpers
// ---------------------------------------------------------------------------

fn write_u32(buf: &mut Vec<u8>, val: u32) {
    buf.extend_from_slice(&val.to_le_bytes());
}

fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_u32(buf, data.len() as u32);
    buf.extend_from_slice(data);
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

// ---------------------------------------------------------------------------
// read helpers: advance a slice, fail on truncation
// ---------------------------------------------------------------------------

fn read_exact<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], DumpError> {
    if input.len() < len {
        return Err(DumpError::UnexpectedEof);
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head)
}

fn read_u8(input: &mut &[u8]) -> Result<u8, DumpError> {
    Ok(read_exact(input, 1)?[0])
}

fn read_u32(input: &mut &[u8]) -> Result<u32, DumpError> {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(read_exact(input, 4)?);
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(input: &mut &[u8]) -> Result<u64, DumpError> {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(read_exact(input, 8)?);
    Ok(u64::from_le_bytes(bytes))
}

fn read_f64(input: &mut &[u8]) -> Result<f64, DumpError> {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(read_exact(input, 8)?);
    Ok(f64::from_le_bytes(bytes))
}

fn read_count(input: &mut &[u8], label: &str) -> Result<u32, DumpError> {
    let count = read_u32(input)?;
    if count > MAX_COUNT {
        return Err(DumpError::InvalidData(format!(
            "{label} count {count} exceeds max {MAX_COUNT}"
        )));
    }
    Ok(count)
}

fn read_vec(input: &mut &[u8]) -> Result<Vec<u8>, DumpError> {
    let len = read_u32(input)? as usize;
    Ok(read_exact(input, len)?.to_vec())
}

fn read_string(input: &mut &[u8]) -> Result<String, DumpError> {
    String::from_utf8(read_vec(input)?)
        .map_err(|_| DumpError::InvalidData("invalid utf-8 in string field".into()))
}

/// Caps pre-allocation so a corrupt count can't reserve gigabytes
/// before the per-element reads fail.
fn capped(count: u32) -> usize {
    (count as usize).min(65_536)
}
