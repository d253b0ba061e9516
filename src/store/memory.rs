//! Volatile in-memory `Store` backend.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::Store;
use crate::error::Result;

/// In-memory map-backed `Store`. Ordered so `for_each` and `Bank`'s own
/// ordered iteration compose cleanly; nothing here survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn for_each(&self, callback: &mut dyn FnMut(&str)) {
        for key in self.entries.lock().keys() {
            callback(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_each_visits_in_key_order() {
        let store = MemoryStore::new();
        store.put("c", b"").unwrap();
        store.put("a", b"").unwrap();
        store.put("b", b"").unwrap();
        let mut seen = Vec::new();
        store.for_each(&mut |k| seen.push(k.to_owned()));
        assert_eq!(seen, vec!["a", "b", "c"]);
    }
}
