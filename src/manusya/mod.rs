//! The chunk storage service: a `Bank` of chunks, plus the thin
//! replicated registry that lets a restarted replica recover which chunk
//! ids it is responsible for before `Bank::load` rescans `Store`.

pub mod ops;

use std::sync::Arc;

use crate::bank::Bank;
use crate::container_op::{Container, ContainerOp};
use crate::error::{Error, Result};
use crate::object_id::ObjectId;
use crate::op::{Op, OpFactory};
use crate::rsm::Rsm;

use ops::*;

/// Manusya's replicated state: membership confirmation for chunk ids.
/// Chunk *bytes* live entirely outside the RSM, in `Bank`/`Store` — the
/// hard engineering here is the `Chunk`/`Bank` pair, not this registry.
pub struct ManusyaContainer {
    bank: Arc<Bank>,
}

impl ManusyaContainer {
    pub fn new(bank: Arc<Bank>) -> Self {
        Self { bank }
    }

    fn dispatch(&self, op_type: u32, payload: &[u8]) -> Result<Vec<u8>> {
        match op_type {
            REGISTER_CHUNK => {
                let request: RegisterChunkRequest = bincode::deserialize(payload)?;
                // The chunk already exists in `Bank` by the time this op
                // commits (it was created locally before being
                // registered); this just confirms replicated membership.
                self.bank.get_chunk(request.chunk_id)?;
                Ok(bincode::serialize(&RegisterChunkResponse)?)
            }
            LIST_CHUNKS => {
                let request: ListChunksRequest = bincode::deserialize(payload)?;
                let chunk_ids = self.bank.list_chunk_snapshot(request.start, request.limit);
                Ok(bincode::serialize(&ListChunksResponse { chunk_ids })?)
            }
            other => Err(Error::internal(format!("unknown manusya op type {other}"))),
        }
    }
}

impl Container for ManusyaContainer {
    fn process(&self, op_type: u32, payload: &[u8], _log_index: u64) -> Result<Vec<u8>> {
        self.dispatch(op_type, payload)
    }

    fn save_snapshot(&self) -> Result<Vec<u8>> {
        let mut ids = Vec::new();
        self.bank.list_chunk(ObjectId::nil(0), usize::MAX, |id| ids.push(id));
        Ok(bincode::serialize(&ids)?)
    }

    fn load_snapshot(&self, _snapshot: &[u8]) -> Result<()> {
        // Chunk membership is rebuilt from `Store` by `Bank::load`, not
        // from the RSM snapshot; nothing to do here.
        Ok(())
    }
}

/// Reconstructs a Manusya [`Op`] from a decoded log entry.
pub struct ManusyaOpFactory {
    container: Arc<ManusyaContainer>,
}

impl ManusyaOpFactory {
    pub fn new(container: Arc<ManusyaContainer>) -> Self {
        Self { container }
    }
}

impl OpFactory for ManusyaOpFactory {
    fn create(&self, op_type: u32, _version: i32, payload: &[u8]) -> Result<Box<dyn Op>> {
        let container: Arc<dyn Container> = self.container.clone();
        match op_type {
            REGISTER_CHUNK => {
                let request: RegisterChunkRequest = bincode::deserialize(payload)?;
                Ok(Box::new(ContainerOp::<RegisterChunkRequest, RegisterChunkResponse>::new(
                    op_type, request, container, None, true,
                )))
            }
            LIST_CHUNKS => {
                let request: ListChunksRequest = bincode::deserialize(payload)?;
                Ok(Box::new(ContainerOp::<ListChunksRequest, ListChunksResponse>::new(
                    op_type, request, container, None, false,
                )))
            }
            other => Err(Error::internal(format!("unknown manusya op type {other}"))),
        }
    }
}

/// Direct, non-replicated operations against a single Manusya node's
/// `Bank`, plus chunk creation, which additionally confirms the new
/// chunk's membership through the RSM so a restarted replica can recover
/// which ids it owns before `Bank::load` rescans `Store`.
pub struct ManusyaNode {
    bank: Arc<Bank>,
    container: Arc<dyn Container>,
    rsm: Arc<Rsm>,
}

impl ManusyaNode {
    pub fn new(bank: Arc<Bank>, container: Arc<dyn Container>, rsm: Arc<Rsm>) -> Self {
        Self { bank, container, rsm }
    }

    /// Creates a chunk locally, then submits a `RegisterChunk` op through
    /// the RSM to record its id for replay after restart. The chunk bytes
    /// themselves are never replicated; only this membership fact is.
    pub async fn create_chunk(&self, partition_id: u32) -> Result<ObjectId> {
        let chunk_id = self.bank.create_chunk(partition_id)?.chunk_id();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let op: Box<dyn Op> = Box::new(ContainerOp::<RegisterChunkRequest, RegisterChunkResponse>::new(
            REGISTER_CHUNK,
            RegisterChunkRequest { chunk_id },
            self.container.clone(),
            Some(tx),
            true,
        ));
        op.apply(&self.rsm)?;
        rx.await.map_err(|_| Error::unavailable("rsm apply task dropped the response channel"))??;
        Ok(chunk_id)
    }

    pub fn append(&self, chunk_id: ObjectId, buf: &[u8], offset: u64) -> Result<()> {
        self.bank.get_chunk(chunk_id)?.append(buf, offset)
    }

    pub fn read(&self, chunk_id: ObjectId, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.bank.get_chunk(chunk_id)?.read(offset, length)
    }

    pub fn seal(&self, chunk_id: ObjectId) -> Result<u64> {
        Ok(self.bank.get_chunk(chunk_id)?.query_and_seal())
    }

    pub fn remove(&self, chunk_id: ObjectId) -> Result<()> {
        self.bank.remove_chunk(chunk_id)
    }

    pub fn list_chunks(&self, start: ObjectId, limit: usize) -> Vec<ObjectId> {
        self.bank.list_chunk_snapshot(start, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn node() -> (ManusyaNode, Arc<Bank>) {
        let bank = Arc::new(Bank::new(Arc::new(MemoryStore::new())));
        let container: Arc<dyn Container> = Arc::new(ManusyaContainer::new(bank.clone()));
        let factory: Arc<dyn OpFactory> = Arc::new(ManusyaOpFactory::new(Arc::new(ManusyaContainer::new(bank.clone()))));
        let rsm = Rsm::new(1, "manusya-test".into(), container.clone(), factory);
        rsm.on_leader_start(1);
        (ManusyaNode::new(bank.clone(), container, rsm), bank)
    }

    #[tokio::test]
    async fn create_append_read_round_trips() {
        let (node, _bank) = node();
        let id = node.create_chunk(0).await.unwrap();
        node.append(id, b"hello", 0).unwrap();
        assert_eq!(node.read(id, 0, 5).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn seal_then_append_is_failed_precondition() {
        let (node, _bank) = node();
        let id = node.create_chunk(0).await.unwrap();
        node.seal(id).unwrap();
        let err = node.append(id, b"x", 0).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn register_chunk_op_confirms_existing_membership() {
        let (node, bank) = node();
        let id = node.create_chunk(0).await.unwrap();
        let container = ManusyaContainer::new(bank);

        let payload = bincode::serialize(&RegisterChunkRequest { chunk_id: id }).unwrap();
        let response_bytes = container.process(REGISTER_CHUNK, &payload, 1).unwrap();
        let _: RegisterChunkResponse = bincode::deserialize(&response_bytes).unwrap();
    }

    #[test]
    fn register_chunk_op_rejects_unknown_id() {
        let bank = Arc::new(Bank::new(Arc::new(MemoryStore::new())));
        let container = ManusyaContainer::new(bank);
        let payload = bincode::serialize(&RegisterChunkRequest { chunk_id: ObjectId::generate(0) }).unwrap();
        assert!(container.process(REGISTER_CHUNK, &payload, 1).is_err());
    }

    #[tokio::test]
    async fn list_chunks_op_matches_bank_ordering() {
        let (node, bank) = node();
        let mut ids = Vec::new();
        for p in 0..3u32 {
            ids.push(node.create_chunk(p).await.unwrap());
        }
        ids.sort();
        let container = ManusyaContainer::new(bank);

        let payload = bincode::serialize(&ListChunksRequest { start: ids[0], limit: 10 }).unwrap();
        let response_bytes = container.process(LIST_CHUNKS, &payload, 1).unwrap();
        let response: ListChunksResponse = bincode::deserialize(&response_bytes).unwrap();
        assert_eq!(response.chunk_ids, ids);
    }
}
