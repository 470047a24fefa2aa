use super::*;

impl Keyspace {
    /// Pushes values to the head of a list, creating it if absent.
    /// Values are pushed one at a time, so the last argument ends up
    /// at the head. Returns the new length.
    pub fn lpush(&mut self, key: &str, values: &[String]) -> Result<usize, WrongType> {
        self.list_push(key, values, true)
    }

    /// Pushes values to the tail of a list, creating it if absent.
    /// Returns the new length.
    pub fn rpush(&mut self, key: &str, values: &[String]) -> Result<usize, WrongType> {
        self.list_push(key, values, false)
    }

    fn list_push(
        &mut self,
        key: &str,
        values: &[String],
        front: bool,
    ) -> Result<usize, WrongType> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::List(_)))?;
        if is_new {
            self.insert_empty(key, Value::List(VecDeque::new()));
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::List(ref mut list) = entry.value else {
            unreachable!("type verified by ensure_collection_type");
        };
        for value in values {
            if front {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        Ok(list.len())
    }

    /// Pops the head element. Popping the last element removes the key.
    pub fn lpop(&mut self, key: &str) -> Result<Option<String>, WrongType> {
        self.list_pop(key, true)
    }

    /// Pops the tail element. Popping the last element removes the key.
    pub fn rpop(&mut self, key: &str) -> Result<Option<String>, WrongType> {
        self.list_pop(key, false)
    }

    fn list_pop(&mut self, key: &str, front: bool) -> Result<Option<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        let Value::List(ref mut list) = entry.value else {
            return Err(WrongType);
        };
        let popped = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        let is_empty = list.is_empty();
        self.drop_if_empty(key, is_empty);
        Ok(popped)
    }

    /// List length; 0 for a missing key.
    pub fn llen(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(WrongType),
            },
        }
    }

    /// Elements in the inclusive index window `[start, stop]`, with
    /// negative indices counting from the tail. Malformed windows
    /// yield an empty result.
    pub fn lrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        let Some(entry) = self.entries.get(key) else {
            return Ok(vec![]);
        };
        let Value::List(ref list) = entry.value else {
            return Err(WrongType);
        };

        let (s, e) = normalize_range(start, stop, list.len() as i64);
        if s > e {
            return Ok(vec![]);
        }
        Ok(list
            .iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .cloned()
            .collect())
    }
}
