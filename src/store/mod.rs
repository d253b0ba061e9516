//! Process-local persistence abstraction shared by [`crate::bank::Bank`]
//! (chunk bytes) and Deva's [`crate::namespace::Namespace`] (inode/dentry
//! metadata).
//!
//! `Store` is a trait object (`Arc<dyn Store>`) rather than a generic
//! parameter threaded through `Bank`/`Namespace`, so a node can pick its
//! backend at startup from [`crate::config::StorageConfig`] without every
//! caller becoming generic over it.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// A process-local, byte-oriented persistence abstraction.
///
/// Implementations must serialize their own mutations; readers may observe
/// the post-commit state of any write that has already returned.
pub trait Store: Send + Sync {
    /// Write `value` under `key`, replacing any existing value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the value stored under `key`. Not an error if absent.
    fn remove(&self, key: &str) -> Result<()>;

    /// Invoke `callback` once per key currently in the store, in an
    /// unspecified but stable order for a given snapshot of the store.
    fn for_each(&self, callback: &mut dyn FnMut(&str));
}

/// Construct a `Store` for the given configuration.
pub fn open(config: &StorageConfig, db_path: &std::path::Path) -> Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sled => Ok(Arc::new(SledStore::open(db_path)?)),
    }
}

#[cfg(test)]
mod contract_tests {
    //! Shared behavioral contract every `Store` backend must satisfy.
    use super::*;

    fn exercise(store: &dyn Store) {
        assert_eq!(store.get("a").unwrap(), None);

        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        store.put("a", b"2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));

        store.put("b", b"3").unwrap();
        let mut seen = Vec::new();
        store.for_each(&mut |k| seen.push(k.to_owned()));
        seen.sort();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.remove("a").unwrap(); // idempotent
    }

    #[test]
    fn memory_store_satisfies_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn sled_store_satisfies_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&SledStore::open(dir.path()).unwrap());
    }
}
