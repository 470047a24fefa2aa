use super::*;

impl Keyspace {
    /// Adds members to a set, creating it if the key is absent.
    /// Returns the number of members that were actually new.
    pub fn sadd(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        if members.is_empty() {
            return Ok(0);
        }
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Set(_)))?;
        if is_new {
            self.insert_empty(key, Value::Set(HashSet::new()));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Set(ref mut set) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };

        let mut added = 0;
        for member in members {
            if set.insert(member.clone()) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes members from a set. Returns how many were removed;
    /// removing the last member deletes the key.
    pub fn srem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Set(ref mut set) = entry.value else {
            return Err(WrongType);
        };

        let mut removed = 0;
        for member in members {
            if set.remove(member) {
                removed += 1;
            }
        }
        let is_empty = set.is_empty();
        self.drop_if_empty(key, is_empty);
        Ok(removed)
    }

    /// All members of a set, unordered. A missing key is an empty set.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(WrongType),
            },
        }
    }

    /// Set cardinality; 0 for a missing key.
    pub fn scard(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(WrongType),
            },
        }
    }

    /// Membership test; `false` for a missing key.
    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(false);
        }
        match self.entries.get(key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(WrongType),
            },
        }
    }

    /// Union of the named sets. Missing keys contribute nothing; a
    /// wrong-typed operand fails the whole command.
    pub fn sunion(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let mut result = HashSet::new();
        for key in keys {
            if let Some(set) = self.set_operand(key)? {
                result.extend(set.iter().cloned());
            }
        }
        Ok(result.into_iter().collect())
    }

    /// Intersection of the named sets. Any missing operand makes the
    /// result empty.
    pub fn sinter(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some(first) = keys.first() else {
            return Ok(vec![]);
        };
        let mut result: HashSet<String> = match self.set_operand(first)? {
            Some(set) => set.iter().cloned().collect(),
            None => return Ok(vec![]),
        };

        for key in &keys[1..] {
            match self.set_operand(key)? {
                Some(set) => result.retain(|m| set.contains(m)),
                None => return Ok(vec![]),
            }
            if result.is_empty() {
                break;
            }
        }
        Ok(result.into_iter().collect())
    }

    /// Members of the first set that appear in none of the others.
    /// A missing first operand yields an empty result.
    pub fn sdiff(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some(first) = keys.first() else {
            return Ok(vec![]);
        };
        let mut result: HashSet<String> = match self.set_operand(first)? {
            Some(set) => set.iter().cloned().collect(),
            None => return Ok(vec![]),
        };

        for key in &keys[1..] {
            if let Some(set) = self.set_operand(key)? {
                result.retain(|m| !set.contains(m));
            }
        }
        Ok(result.into_iter().collect())
    }

    /// Removes and returns up to `count` random members. Popping the
    /// last member deletes the key.
    pub fn spop(&mut self, key: &str, count: usize) -> Result<Vec<String>, WrongType> {
        if count == 0 || self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(vec![]);
        };
        let Value::Set(ref mut set) = entry.value else {
            return Err(WrongType);
        };

        let mut rng = rand::rng();
        let picked: Vec<String> = set.iter().cloned().choose_multiple(&mut rng, count);
        for member in &picked {
            set.remove(member);
        }
        let is_empty = set.is_empty();
        self.drop_if_empty(key, is_empty);
        Ok(picked)
    }

    /// Returns random members without removing them. `count <= 0`
    /// means a single member, sampling is without replacement.
    pub fn srandmember(&mut self, key: &str, count: i64) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        let Some(entry) = self.entries.get(key) else {
            return Ok(vec![]);
        };
        let Value::Set(ref set) = entry.value else {
            return Err(WrongType);
        };

        let wanted = if count <= 0 { 1 } else { count as usize };
        let mut rng = rand::rng();
        Ok(set.iter().cloned().choose_multiple(&mut rng, wanted))
    }

    /// Resolves one operand of a set algebra command: `None` when the
    /// key is absent, the set when it holds one, `WrongType` otherwise.
    fn set_operand(&mut self, key: &str) -> Result<Option<&HashSet<String>>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(Some(set)),
                _ => Err(WrongType),
            },
        }
    }
}
