//! Append-only byte container with an `Open` → `Sealed` state machine.
//!
//! A [`Chunk`]'s bytes live under its own [`ObjectId`] key in a [`Store`];
//! `append` performs a guarded read-modify-write against that key.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::object_id::ObjectId;
use crate::store::Store;

/// Lifecycle state of a [`Chunk`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Currently accepting appends.
    Open = 0,
    /// Writes rejected; `size` is frozen.
    Sealed = 1,
}

impl From<u8> for ChunkState {
    fn from(value: u8) -> Self {
        match value {
            0 => ChunkState::Open,
            _ => ChunkState::Sealed,
        }
    }
}

/// An append-only byte region identified by an [`ObjectId`].
///
/// `size` is published with release-store semantics after a write
/// completes, so `read` may run concurrently with `append` and always
/// observes a consistent prefix.
pub struct Chunk {
    chunk_id: ObjectId,
    state: AtomicU8,
    size: AtomicU64,
    store: Arc<dyn Store>,
    // Serializes appends; `size`/`state` stay lock-free for readers.
    append_lock: parking_lot::Mutex<()>,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("chunk_id", &self.chunk_id)
            .field("state", &self.state)
            .field("size", &self.size)
            .finish()
    }
}

impl Chunk {
    /// Create a fresh, `Open`, zero-length chunk backed by `store`.
    pub fn create(chunk_id: ObjectId, store: Arc<dyn Store>) -> Result<Self> {
        store.put(&chunk_id.to_string(), &[])?;
        Ok(Self {
            chunk_id,
            state: AtomicU8::new(ChunkState::Open as u8),
            size: AtomicU64::new(0),
            store,
            append_lock: parking_lot::Mutex::new(()),
        })
    }

    /// Reconstruct a chunk already present in `store`, in the given state.
    /// Used by [`crate::bank::Bank::load`] to rebuild chunks across
    /// restarts.
    pub fn reconstruct(chunk_id: ObjectId, store: Arc<dyn Store>, size: u64, state: ChunkState) -> Self {
        Self {
            chunk_id,
            state: AtomicU8::new(state as u8),
            size: AtomicU64::new(size),
            store,
            append_lock: parking_lot::Mutex::new(()),
        }
    }

    /// This chunk's identifier.
    pub fn chunk_id(&self) -> ObjectId {
        self.chunk_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChunkState {
        ChunkState::from(self.state.load(Ordering::Acquire))
    }

    /// Current size in bytes.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Append `buf` at `offset`. Accepted only when `Open` and
    /// `offset == size` (strict append).
    pub fn append(&self, buf: &[u8], offset: u64) -> Result<()> {
        let _guard = self.append_lock.lock();

        if self.state() == ChunkState::Sealed {
            return Err(Error::failed_precondition(format!("chunk {} is sealed", self.chunk_id)));
        }
        let current_size = self.size.load(Ordering::Acquire);
        if offset != current_size {
            return Err(Error::invalid_argument(format!(
                "append offset {offset} does not match chunk size {current_size}"
            )));
        }

        let key = self.chunk_id.to_string();
        let mut bytes = self.store.get(&key)?.unwrap_or_default();
        bytes.extend_from_slice(buf);
        self.store.put(&key, &bytes)?;

        self.size.store(current_size + buf.len() as u64, Ordering::Release);
        Ok(())
    }

    /// Read the intersection of `[offset, offset+length)` with
    /// `[0, size)`. Errors only if `offset > size`.
    pub fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.size.load(Ordering::Acquire);
        if offset > size {
            return Err(Error::invalid_argument(format!("read offset {offset} exceeds chunk size {size}")));
        }
        let end = size.min(offset.saturating_add(length));
        let bytes = self.store.get(&self.chunk_id.to_string())?.unwrap_or_default();
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    /// Idempotently transition `Open → Sealed` and return the final size.
    pub fn query_and_seal(&self) -> u64 {
        let _guard = self.append_lock.lock();
        self.state.store(ChunkState::Sealed as u8, Ordering::Release);
        self.size.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn new_chunk() -> Chunk {
        Chunk::create(ObjectId::generate(0), Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn append_then_read_concatenates() {
        let chunk = new_chunk();
        chunk.append(b"hello", 0).unwrap();
        chunk.append(b" world", 5).unwrap();
        assert_eq!(chunk.size(), 11);
        assert_eq!(chunk.read(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn append_at_wrong_offset_is_invalid_argument() {
        let chunk = new_chunk();
        let err = chunk.append(b"x", 3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn seal_is_idempotent_and_freezes_size() {
        let chunk = new_chunk();
        chunk.append(b"hello world", 0).unwrap();
        assert_eq!(chunk.query_and_seal(), 11);
        assert_eq!(chunk.query_and_seal(), 11);
        let err = chunk.append(b"!", 11).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[test]
    fn read_past_size_is_invalid_argument() {
        let chunk = new_chunk();
        chunk.append(b"abc", 0).unwrap();
        assert!(chunk.read(10, 1).is_err());
        // reading past the end, but starting within bounds, truncates.
        assert_eq!(chunk.read(1, 100).unwrap(), b"bc");
    }
}
