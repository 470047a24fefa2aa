use super::*;

impl Keyspace {
    /// Adds `count` observations of `item` to a Count-Min Sketch,
    /// creating the sketch with the configured geometry on first use.
    pub fn cms_incr(&mut self, key: &str, item: &str, count: u32) -> Result<(), WrongType> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Cms(_)))?;
        if is_new {
            let sketch = CountMinSketch::new(self.config.cms_depth, self.config.cms_width);
            self.insert_empty(key, Value::Cms(sketch));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(());
        };
        let Value::Cms(ref mut sketch) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };
        sketch.incr(item, count);
        Ok(())
    }

    /// Estimated frequency of `item`; 0 for a missing key. The
    /// estimate never undercounts.
    pub fn cms_query(&mut self, key: &str, item: &str) -> Result<u32, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Cms(sketch) => Ok(sketch.query(item)),
                _ => Err(WrongType),
            },
        }
    }

    /// Inserts an item into a Bloom filter, creating the filter with
    /// the configured geometry on first use. Insertion always
    /// succeeds, so this always returns `true`.
    pub fn bf_add(&mut self, key: &str, item: &str) -> Result<bool, WrongType> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Bloom(_)))?;
        if is_new {
            let filter = BloomFilter::new(self.config.bloom_bits, self.config.bloom_hashes);
            self.insert_empty(key, Value::Bloom(filter));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(true);
        };
        let Value::Bloom(ref mut filter) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };
        filter.insert(item);
        Ok(true)
    }

    /// Probabilistic membership test; `false` for a missing key.
    /// Never false for an inserted item.
    pub fn bf_exists(&mut self, key: &str, item: &str) -> Result<bool, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(false);
        }
        match self.entries.get(key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Bloom(filter) => Ok(filter.contains(item)),
                _ => Err(WrongType),
            },
        }
    }
}
