//! Data type representations for stored values.
//!
//! Each variant maps to one of the store's typed commands. A key's tag
//! is fixed for the life of the key: a command that would change it
//! fails with `WrongType` and leaves the value untouched.

pub mod bloom;
pub mod cms;
pub mod sorted_set;

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

use bloom::BloomFilter;
use cms::CountMinSketch;
use sorted_set::SortedSet;

/// A stored value in the keyspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Binary-safe string data. `Bytes` gives cheap clones on the read
    /// path (refcount bump, no copy).
    Str(Bytes),

    /// Field → value mapping. Field order is irrelevant.
    Hash(HashMap<String, String>),

    /// Unique string members.
    Set(HashSet<String>),

    /// Ordered elements with O(1) push/pop at both ends.
    List(VecDeque<String>),

    /// Unique members ordered by (score asc, member lex asc).
    Zset(SortedSet),

    /// Count-Min Sketch frequency estimator.
    Cms(CountMinSketch),

    /// Bloom filter membership sketch.
    Bloom(BloomFilter),
}

/// Returns the type name for a value, matching Redis TYPE output where
/// a Redis equivalent exists.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Str(_) => "string",
        Value::Hash(_) => "hash",
        Value::Set(_) => "set",
        Value::List(_) => "list",
        Value::Zset(_) => "zset",
        Value::Cms(_) => "cms",
        Value::Bloom(_) => "bloom",
    }
}

/// Resolves Redis-style range indices (negative counts from the end)
/// into a clamped inclusive `(start, stop)` pair.
///
/// A `start > stop` result means the window is empty after clamping;
/// callers return an empty collection for it.
pub fn normalize_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    if len == 0 {
        return (0, -1);
    }

    let s = if start < 0 { (len + start).max(0) } else { start };

    // stop clamps to -1 on the low side so that an extremely negative
    // stop yields start > stop rather than wrapping to a valid index
    let e = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };

    (s, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_positive_indices() {
        assert_eq!(normalize_range(0, 2, 5), (0, 2));
        assert_eq!(normalize_range(1, 10, 5), (1, 4));
    }

    #[test]
    fn range_negative_indices() {
        assert_eq!(normalize_range(0, -1, 5), (0, 4));
        assert_eq!(normalize_range(-2, -1, 5), (3, 4));
        assert_eq!(normalize_range(-100, -1, 5), (0, 4));
    }

    #[test]
    fn range_empty_windows() {
        assert_eq!(normalize_range(0, -1, 0), (0, -1));
        let (s, e) = normalize_range(3, 1, 5);
        assert!(s > e);
        let (s, e) = normalize_range(0, -100, 5);
        assert!(s > e);
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(&Value::Str(Bytes::from("x"))), "string");
        assert_eq!(type_name(&Value::Set(HashSet::new())), "set");
        assert_eq!(type_name(&Value::Zset(SortedSet::new())), "zset");
        assert_eq!(type_name(&Value::Cms(CountMinSketch::new(4, 100))), "cms");
    }
}
