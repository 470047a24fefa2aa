use super::*;

impl Keyspace {
    /// Sets a field in a hash, creating the hash if the key is absent.
    /// Returns 1 when the field is new, 0 when it was overwritten.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<i64, WrongType> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Hash(_)))?;
        if is_new {
            self.insert_empty(key, Value::Hash(HashMap::new()));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Hash(ref mut hash) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };
        let created = hash.insert(field.to_owned(), value.to_owned()).is_none();
        Ok(i64::from(created))
    }

    /// Returns the value of a hash field, `None` when the key or field
    /// is absent.
    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(WrongType),
            },
        }
    }

    /// Deletes fields from a hash. Returns how many existed; deleting
    /// the last field removes the key entirely.
    pub fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Hash(ref mut hash) = entry.value else {
            return Err(WrongType);
        };

        let mut deleted = 0;
        for field in fields {
            if hash.remove(field).is_some() {
                deleted += 1;
            }
        }
        let is_empty = hash.is_empty();
        self.drop_if_empty(key, is_empty);
        Ok(deleted)
    }

    /// All field/value pairs of a hash, unordered. Empty for a missing
    /// key.
    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash
                    .iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect()),
                _ => Err(WrongType),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hset_new_field_returns_one() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hset("h", "f", "v").unwrap(), 1);
        assert_eq!(ks.hset("h", "f", "v2").unwrap(), 0);
        assert_eq!(ks.hget("h", "f").unwrap(), Some("v2".into()));
    }

    #[test]
    fn hget_missing() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hget("h", "f").unwrap(), None);
        ks.hset("h", "a", "1").unwrap();
        assert_eq!(ks.hget("h", "b").unwrap(), None);
    }

    #[test]
    fn hdel_counts_existing_fields() {
        let mut ks = Keyspace::new();
        ks.hset("h", "a", "1").unwrap();
        ks.hset("h", "b", "2").unwrap();
        assert_eq!(
            ks.hdel("h", &["a".into(), "missing".into()]).unwrap(),
            1
        );
        assert_eq!(ks.hdel("missing", &["a".into()]).unwrap(), 0);
    }

    #[test]
    fn hdel_last_field_removes_key() {
        let mut ks = Keyspace::new();
        ks.hset("h", "only", "v").unwrap();
        ks.hdel("h", &["only".into()]).unwrap();
        assert!(!ks.exists("h"));
        assert_eq!(ks.value_type("h"), "none");
    }

    #[test]
    fn hgetall_returns_pairs() {
        let mut ks = Keyspace::new();
        ks.hset("h", "a", "1").unwrap();
        ks.hset("h", "b", "2").unwrap();
        let mut pairs = ks.hgetall("h").unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
        assert!(ks.hgetall("missing").unwrap().is_empty());
    }

    #[test]
    fn wrong_type_everywhere() {
        let mut ks = Keyspace::new();
        ks.set("k".into(), Bytes::from("str"), None);
        assert_eq!(ks.hset("k", "f", "v"), Err(WrongType));
        assert_eq!(ks.hget("k", "f"), Err(WrongType));
        assert_eq!(ks.hdel("k", &["f".into()]), Err(WrongType));
        assert_eq!(ks.hgetall("k"), Err(WrongType));
    }
}
