use super::*;

impl Keyspace {
    /// Stores a string value, unconditionally replacing whatever the
    /// key held before, including values of other types.
    ///
    /// A `Some(ttl)` sets the deadline to now + ttl; `None` clears any
    /// existing deadline.
    pub fn set(&mut self, key: String, value: Bytes, ttl: Option<Duration>) {
        self.remove_if_expired(&key);
        let had_expiry = self
            .entries
            .get(key.as_str())
            .map(|e| e.expires_at_ms != NO_EXPIRY)
            .unwrap_or(false);
        self.adjust_expiry_count(had_expiry, ttl.is_some());
        self.entries
            .insert(key.into_boxed_str(), Entry::new(Value::Str(value), ttl));
    }

    /// Returns the string payload, or `None` when the key is missing
    /// or expired. `Bytes::clone` is a refcount bump, not a copy.
    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(data) => Ok(Some(data.clone())),
                _ => Err(WrongType),
            },
        }
    }

    /// Type name of the value at `key`, or "none" when absent.
    pub fn value_type(&mut self, key: &str) -> &'static str {
        if self.remove_if_expired(key) {
            return "none";
        }
        match self.entries.get(key) {
            Some(entry) => type_name(&entry.value),
            None => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_and_get() {
        let mut ks = Keyspace::new();
        ks.set("greeting".into(), Bytes::from("hello"), None);
        assert_eq!(ks.get("greeting").unwrap(), Some(Bytes::from("hello")));
    }

    #[test]
    fn get_missing() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.get("nope").unwrap(), None);
    }

    #[test]
    fn get_expired() {
        let mut ks = Keyspace::new();
        ks.set(
            "temp".into(),
            Bytes::from("v"),
            Some(Duration::from_millis(10)),
        );
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ks.get("temp").unwrap(), None);
    }

    #[test]
    fn get_wrong_type() {
        let mut ks = Keyspace::new();
        ks.sadd("s", &["a".into()]).unwrap();
        assert_eq!(ks.get("s"), Err(WrongType));
        // the value is untouched
        assert_eq!(ks.scard("s").unwrap(), 1);
    }

    #[test]
    fn set_replaces_other_types() {
        let mut ks = Keyspace::new();
        ks.sadd("k", &["a".into()]).unwrap();
        ks.set("k".into(), Bytes::from("now a string"), None);
        assert_eq!(ks.get("k").unwrap(), Some(Bytes::from("now a string")));
        assert_eq!(ks.value_type("k"), "string");
    }

    #[test]
    fn set_without_ttl_clears_deadline() {
        let mut ks = Keyspace::new();
        ks.set("k".into(), Bytes::from("a"), Some(Duration::from_secs(60)));
        ks.set("k".into(), Bytes::from("b"), None);
        assert_eq!(ks.ttl("k"), TtlResult::NoExpiry);
    }

    #[test]
    fn value_type_reports_tags() {
        let mut ks = Keyspace::new();
        ks.set("s".into(), Bytes::from("x"), None);
        ks.lpush("l", &["x".into()]).unwrap();
        assert_eq!(ks.value_type("s"), "string");
        assert_eq!(ks.value_type("l"), "list");
        assert_eq!(ks.value_type("missing"), "none");
    }
}
