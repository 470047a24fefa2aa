//! Sorted set: dual-indexed by score and member.
//!
//! Members are ordered by (score, member); ties in score break
//! lexicographically on the member name. A `BTreeMap` keyed on
//! `(OrderedFloat<f64>, String)` provides ordered iteration while a
//! `HashMap` gives O(1) member → score lookups.

use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;

/// A set of unique string members, each carrying an `f64` score.
///
/// Rank is a member's 0-based position in (score asc, member asc)
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    /// (score, member) index for ordered traversal.
    tree: BTreeMap<(OrderedFloat<f64>, String), ()>,
    /// member → score index for point lookups.
    scores: HashMap<String, OrderedFloat<f64>>,
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member or updates its score in place.
    ///
    /// Returns `true` when the member was newly inserted, `false` when
    /// an existing member's score was replaced.
    pub fn insert(&mut self, member: String, score: f64) -> bool {
        let score = OrderedFloat(score);
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                if old != score {
                    self.tree.remove(&(old, member.clone()));
                    self.tree.insert((score, member), ());
                }
                false
            }
            None => {
                self.tree.insert((score, member), ());
                true
            }
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.tree.remove(&(score, member.to_owned()));
                true
            }
            None => false,
        }
    }

    /// Returns the score for a member, if present.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// Returns the 0-based rank of a member.
    ///
    /// O(n) over the tree up to the member's position, fine for the
    /// set sizes this store targets.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = self.scores.get(member)?;
        let key = (*score, member.to_owned());
        Some(self.tree.range(..&key).count())
    }

    /// Returns members with scores in the rank window `[start, stop]`,
    /// both ends inclusive, negative indices counting from the end.
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<(String, f64)> {
        let (s, e) = super::normalize_range(start, stop, self.tree.len() as i64);
        if s > e {
            return Vec::new();
        }

        let (s, e) = (s as usize, e as usize);
        self.tree
            .keys()
            .skip(s)
            .take(e - s + 1)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterates (member, score) pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.tree.keys().map(|(score, member)| (member.as_str(), score.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_score() {
        let mut ss = SortedSet::new();
        assert!(ss.insert("a".into(), 1.0));
        assert!(!ss.insert("a".into(), 2.0));
        assert_eq!(ss.score("a"), Some(2.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn rank_orders_by_score_then_member() {
        let mut ss = SortedSet::new();
        ss.insert("b".into(), 1.0);
        ss.insert("a".into(), 1.0);
        ss.insert("c".into(), 2.0);

        assert_eq!(ss.rank("a"), Some(0));
        assert_eq!(ss.rank("b"), Some(1));
        assert_eq!(ss.rank("c"), Some(2));
        assert_eq!(ss.rank("missing"), None);
    }

    #[test]
    fn iter_is_sorted() {
        let mut ss = SortedSet::new();
        ss.insert("z".into(), -1.0);
        ss.insert("m".into(), 0.5);
        ss.insert("a".into(), 0.5);

        let members: Vec<&str> = ss.iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["z", "a", "m"]);
    }

    #[test]
    fn range_with_negative_indices() {
        let mut ss = SortedSet::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            ss.insert(m.into(), s);
        }

        let all = ss.range_by_rank(0, -1);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], ("a".into(), 1.0));

        let tail = ss.range_by_rank(-2, -1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].0, "b");
    }

    #[test]
    fn range_empty_window() {
        let mut ss = SortedSet::new();
        ss.insert("a".into(), 1.0);
        assert!(ss.range_by_rank(2, 5).is_empty());
        assert!(SortedSet::new().range_by_rank(0, -1).is_empty());
    }

    #[test]
    fn score_update_reorders() {
        let mut ss = SortedSet::new();
        ss.insert("a".into(), 1.0);
        ss.insert("b".into(), 2.0);
        ss.insert("a".into(), 3.0);

        assert_eq!(ss.rank("b"), Some(0));
        assert_eq!(ss.rank("a"), Some(1));
        assert_eq!(ss.len(), 2);
    }

    #[test]
    fn remove_member() {
        let mut ss = SortedSet::new();
        ss.insert("a".into(), 1.0);
        assert!(ss.remove("a"));
        assert!(!ss.remove("a"));
        assert!(ss.is_empty());
    }
}
