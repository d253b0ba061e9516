//! In-process registry of chunks on a storage node.
//!
//! One mutex protects the registry. `create_chunk` validates before any
//! mutation, so a rejected call never touches state. `list_chunk` walks
//! from a lower bound under the lock, and `load` reconstructs every chunk
//! from `Store` as `Sealed`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::{Chunk, ChunkState};
use crate::error::{Error, Result};
use crate::object_id::ObjectId;
use crate::store::Store;

/// The in-memory ordered registry of chunks on a single Manusya node.
pub struct Bank {
    store: Arc<dyn Store>,
    chunks: Mutex<BTreeMap<ObjectId, Arc<Chunk>>>,
}

impl Bank {
    /// Construct a `Bank` over the given `Store`. Callers own the `Bank`
    /// explicitly (passed via `Arc` through service construction) rather
    /// than reaching it through a process-wide singleton.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, chunks: Mutex::new(BTreeMap::new()) }
    }

    /// Scan `Store`, reconstruct every chunk found there, and seal each
    /// one — chunks that survive a restart are, by definition, no longer
    /// being actively appended to by the crashed process.
    pub fn load(&self) -> Result<()> {
        let mut ids = Vec::new();
        self.store.for_each(&mut |key| {
            if let Some(id) = ObjectId::from_str_opt(key) {
                ids.push(id);
            }
        });

        let mut chunks = self.chunks.lock();
        for id in ids {
            let bytes = self.store.get(&id.to_string())?.unwrap_or_default();
            let chunk = Chunk::reconstruct(id, self.store.clone(), bytes.len() as u64, ChunkState::Sealed);
            chunks.insert(id, Arc::new(chunk));
        }
        Ok(())
    }

    /// Allocate and register a fresh `Open` chunk in `partition_id`.
    ///
    /// All validation happens before the chunk is constructed or the
    /// registry is touched, so a rejected call never mutates state.
    pub fn create_chunk(&self, partition_id: u32) -> Result<Arc<Chunk>> {
        let id = ObjectId::generate(partition_id);
        let chunk = Arc::new(Chunk::create(id, self.store.clone())?);
        self.chunks.lock().insert(id, chunk.clone());
        Ok(chunk)
    }

    /// Look up a chunk by id.
    pub fn get_chunk(&self, id: ObjectId) -> Result<Arc<Chunk>> {
        self.chunks.lock().get(&id).cloned().ok_or_else(|| Error::not_found(format!("chunk {id}")))
    }

    /// Remove a chunk from the registry and from `Store`.
    pub fn remove_chunk(&self, id: ObjectId) -> Result<()> {
        let removed = self.chunks.lock().remove(&id);
        if removed.is_none() {
            return Err(Error::not_found(format!("chunk {id}")));
        }
        // Best-effort: the chunk is already gone from the registry even if
        // the backing bytes fail to clear.
        let _ = self.store.remove(&id.to_string());
        Ok(())
    }

    /// Invoke `cb` once per chunk id, in `ObjectId` order, starting from
    /// `start` (inclusive), for up to `limit` entries. Runs under the bank
    /// lock: `cb` must be short and must not call back into `Bank`.
    pub fn list_chunk(&self, start: ObjectId, limit: usize, mut cb: impl FnMut(ObjectId)) {
        let chunks = self.chunks.lock();
        for (id, _) in chunks.range(start..).take(limit) {
            cb(*id);
        }
    }

    /// Like [`Bank::list_chunk`], but clones the matching ids before
    /// releasing the lock and returns them, for callers whose per-entry
    /// work is too heavy to run while holding the registry lock.
    pub fn list_chunk_snapshot(&self, start: ObjectId, limit: usize) -> Vec<ObjectId> {
        let chunks = self.chunks.lock();
        chunks.range(start..).take(limit).map(|(id, _)| *id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn bank() -> Bank {
        Bank::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn create_then_get_round_trips() {
        let bank = bank();
        let chunk = bank.create_chunk(0).unwrap();
        let fetched = bank.get_chunk(chunk.chunk_id()).unwrap();
        assert_eq!(fetched.chunk_id(), chunk.chunk_id());
    }

    #[test]
    fn get_missing_is_not_found() {
        let bank = bank();
        let err = bank.get_chunk(ObjectId::generate(0)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let bank = bank();
        assert!(matches!(bank.remove_chunk(ObjectId::generate(0)), Err(Error::NotFound(_))));
    }

    #[test]
    fn remove_then_get_is_not_found() {
        let bank = bank();
        let chunk = bank.create_chunk(0).unwrap();
        bank.remove_chunk(chunk.chunk_id()).unwrap();
        assert!(bank.get_chunk(chunk.chunk_id()).is_err());
    }

    #[test]
    fn list_chunk_is_ordered_bounded_and_starts_inclusive() {
        let bank = bank();
        let mut ids: Vec<ObjectId> = (0..5u32).map(|p| bank.create_chunk(p).unwrap().chunk_id()).collect();
        ids.sort();

        let mut seen = Vec::new();
        bank.list_chunk(ids[1], 10, |id| seen.push(id));
        assert_eq!(seen, ids[1..].to_vec());

        let mut limited = Vec::new();
        bank.list_chunk(ids[0], 2, |id| limited.push(id));
        assert_eq!(limited, ids[0..2].to_vec());
    }

    #[test]
    fn load_reconstructs_chunks_as_sealed() {
        let store = Arc::new(MemoryStore::new());
        let id;
        {
            let bank = Bank::new(store.clone());
            let chunk = bank.create_chunk(0).unwrap();
            chunk.append(b"hello", 0).unwrap();
            id = chunk.chunk_id();
        }

        let bank = Bank::new(store);
        bank.load().unwrap();
        let chunk = bank.get_chunk(id).unwrap();
        assert_eq!(chunk.state(), ChunkState::Sealed);
        assert_eq!(chunk.size(), 5);
        assert_eq!(chunk.read(0, 5).unwrap(), b"hello");
    }
}
