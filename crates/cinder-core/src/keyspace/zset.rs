use super::*;

impl Keyspace {
    /// Adds members with scores to a sorted set, creating it if the
    /// key is absent. An existing member gets its score updated and is
    /// not counted; the return value is the number of newly inserted
    /// members.
    pub fn zadd(&mut self, key: &str, members: &[(f64, String)]) -> Result<usize, WrongType> {
        if members.is_empty() {
            return Ok(0);
        }
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Zset(_)))?;
        if is_new {
            self.insert_empty(key, Value::Zset(SortedSet::new()));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Zset(ref mut zset) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };

        let mut added = 0;
        for (score, member) in members {
            if zset.insert(member.clone(), *score) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Score of a member; `None` when the key or member is absent.
    pub fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.score(member)),
                _ => Err(WrongType),
            },
        }
    }

    /// Sorted set cardinality; 0 for a missing key.
    pub fn zcard(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.len()),
                _ => Err(WrongType),
            },
        }
    }

    /// 0-based rank of a member by (score asc, member lex asc);
    /// `None` when the key or member is absent.
    pub fn zrank(&mut self, key: &str, member: &str) -> Result<Option<usize>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.rank(member)),
                _ => Err(WrongType),
            },
        }
    }

    /// (member, score) pairs in the inclusive rank window, negative
    /// indices counting from the end.
    pub fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.range_by_rank(start, stop)),
                _ => Err(WrongType),
            },
        }
    }
}
