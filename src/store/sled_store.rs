//! Durable, ordered, embedded key-value `Store` backend.

use std::path::Path;

use super::Store;
use crate::error::Result;

/// `Store` backed by a `sled` database rooted at a given directory.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) a sled database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl Store for SledStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key.as_bytes(), value)?;
        // sled buffers writes; flushing keeps "the post-commit state of any
        // completed write" visible to readers even across a crash.
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn for_each(&self, callback: &mut dyn FnMut(&str)) {
        for entry in self.db.iter() {
            let Ok((key, _)) = entry else { continue };
            if let Ok(key) = std::str::from_utf8(&key) {
                callback(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.put("k", b"v").unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
