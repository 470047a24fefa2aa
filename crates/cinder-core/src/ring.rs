//! Consistent-hash ring with virtual nodes.
//!
//! Each registered node owns `replicas` tokens at
//! `fnv1a_32("{node}#{i}")`; a key belongs to the node owning the first
//! token at or after `fnv1a_32(key)`, wrapping past the end. The ring
//! has no interior lock; the router guards it together with the
//! node → shard map.

use ahash::{AHashMap, AHashSet};

use crate::hashing::fnv1a_32;

/// The token ring. After any mutation, the token count equals
/// `nodes × replicas` and every token resolves to a live node.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Virtual nodes per real node.
    replicas: usize,
    /// Sorted token positions.
    tokens: Vec<u32>,
    /// token → owning node.
    owners: AHashMap<u32, String>,
    /// Live node ids.
    nodes: AHashSet<String>,
}

impl HashRing {
    /// Creates an empty ring with `replicas` virtual nodes per node
    /// (floored at 1).
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            tokens: Vec::new(),
            owners: AHashMap::new(),
            nodes: AHashSet::new(),
        }
    }

    /// Registers a node and its tokens. No-op for a known node.
    pub fn add_node(&mut self, node: &str) {
        if !self.nodes.insert(node.to_owned()) {
            return;
        }
        for i in 0..self.replicas {
            let token = fnv1a_32(format!("{node}#{i}").as_bytes());
            self.tokens.push(token);
            self.owners.insert(token, node.to_owned());
        }
        self.tokens.sort_unstable();
    }

    /// Removes a node and its tokens. No-op for an unknown node.
    pub fn remove_node(&mut self, node: &str) {
        if !self.nodes.remove(node) {
            return;
        }
        self.tokens
            .retain(|token| self.owners.get(token).map(String::as_str) != Some(node));
        self.owners.retain(|_, owner| owner != node);
    }

    /// Resolves the node owning `key`, or `None` for an empty ring.
    pub fn get_node(&self, key: &str) -> Option<&str> {
        if self.tokens.is_empty() {
            return None;
        }
        let hashed = fnv1a_32(key.as_bytes());
        let idx = self.tokens.partition_point(|&token| token < hashed);
        let token = self.tokens[if idx == self.tokens.len() { 0 } else { idx }];
        self.owners.get(&token).map(String::as_str)
    }

    /// Live node ids, in no particular order.
    pub fn nodes(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }

    /// Whether `node` is registered.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` for a ring with no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_resolves_nothing() {
        let ring = HashRing::new(2);
        assert!(ring.get_node("key").is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn single_node_owns_everything() {
        let mut ring = HashRing::new(2);
        ring.add_node("n1");
        for i in 0..100 {
            assert_eq!(ring.get_node(&format!("key:{i}")), Some("n1"));
        }
    }

    #[test]
    fn token_count_invariant() {
        let mut ring = HashRing::new(4);
        ring.add_node("a");
        ring.add_node("b");
        ring.add_node("c");
        assert_eq!(ring.token_count(), 3 * 4);

        ring.remove_node("b");
        assert_eq!(ring.token_count(), 2 * 4);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn every_key_resolves_to_a_live_node() {
        let mut ring = HashRing::new(2);
        ring.add_node("a");
        ring.add_node("b");
        ring.add_node("c");
        ring.remove_node("b");

        for i in 0..1000 {
            let owner = ring.get_node(&format!("key:{i}")).unwrap();
            assert!(ring.contains(owner));
            assert_ne!(owner, "b");
        }
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut ring = HashRing::new(2);
        ring.add_node("a");
        ring.add_node("b");
        let first = ring.get_node("stable-key").map(str::to_owned);
        for _ in 0..10 {
            assert_eq!(ring.get_node("stable-key").map(str::to_owned), first);
        }
    }

    #[test]
    fn duplicate_add_and_absent_remove_are_noops() {
        let mut ring = HashRing::new(3);
        ring.add_node("a");
        ring.add_node("a");
        assert_eq!(ring.token_count(), 3);

        ring.remove_node("ghost");
        assert_eq!(ring.token_count(), 3);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn adding_a_node_moves_only_some_keys() {
        let mut ring = HashRing::new(8);
        ring.add_node("a");
        ring.add_node("b");

        let before: Vec<String> = (0..1000)
            .map(|i| ring.get_node(&format!("key:{i}")).unwrap().to_owned())
            .collect();

        ring.add_node("c");

        let moved = (0..1000)
            .filter(|&i| {
                let owner = ring.get_node(&format!("key:{i}")).unwrap();
                owner != before[i as usize] && owner == "c"
            })
            .count();
        let stolen_elsewhere = (0..1000)
            .filter(|&i| {
                let owner = ring.get_node(&format!("key:{i}")).unwrap();
                owner != before[i as usize] && owner != "c"
            })
            .count();

        // keys only ever move *to* the new node
        assert_eq!(stolen_elsewhere, 0);
        assert!(moved > 0, "new node should take over some keys");
        assert!(moved < 1000, "new node should not take everything");
    }

    #[test]
    fn keys_spread_across_nodes() {
        let mut ring = HashRing::new(16);
        for node in ["a", "b", "c", "d"] {
            ring.add_node(node);
        }

        let mut counts: AHashMap<String, usize> = AHashMap::new();
        for i in 0..4000 {
            let owner = ring.get_node(&format!("key:{i}")).unwrap().to_owned();
            *counts.entry(owner).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 4);
        for (node, count) in counts {
            assert!(count > 100, "node {node} only owns {count} keys");
        }
    }

    #[test]
    fn replicas_floor_at_one() {
        let mut ring = HashRing::new(0);
        ring.add_node("a");
        assert_eq!(ring.token_count(), 1);
    }
}
