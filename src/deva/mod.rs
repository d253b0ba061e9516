//! The metadata service: namespace, chunk placement, and storage-node
//! heartbeat tracking, driven entirely through [`Container::process`].

pub mod ops;

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::container_op::{Container, ContainerOp};
use crate::error::{Error, Result};
use crate::namespace::{DirEntry, FileType, Namespace};
use crate::object_id::ObjectId;
use crate::op::{Op, OpFactory};
use crate::store::Store;

use ops::*;

/// Deva's deterministic state: the namespace tree plus storage-node
/// heartbeat bookkeeping used for chunk placement.
pub struct DevaContainer {
    namespace: Namespace,
    heartbeats: DashMap<ObjectId, u64>,
    sealed_chunks: DashSet<ObjectId>,
    partition_id: u32,
}

impl DevaContainer {
    /// Construct a `DevaContainer` rooted in `partition_id`, backed by
    /// `store`. Callers must call `ensure_root` once before serving
    /// traffic (idempotent, safe on every startup).
    pub fn new(store: Arc<dyn Store>, partition_id: u32) -> Self {
        Self {
            namespace: Namespace::new(store, partition_id),
            heartbeats: DashMap::new(),
            sealed_chunks: DashSet::new(),
            partition_id,
        }
    }

    /// Ensure the root directory exists.
    pub fn ensure_root(&self) -> Result<()> {
        self.namespace.ensure_root()
    }

    fn file_info(&self, inode: ObjectId) -> Result<FileInfo> {
        match self.namespace.get_inode(inode)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(FileInfo::default()),
        }
    }

    fn put_file_info(&self, inode: ObjectId, info: &FileInfo) -> Result<()> {
        self.namespace.put_inode(inode, &bincode::serialize(info)?)
    }

    /// Least-recently-heartbeat node, by last-seen `log_index`. Picking by
    /// log index rather than wall-clock keeps placement deterministic
    /// across replicas applying the same log prefix.
    fn pick_placement_node(&self) -> Result<ObjectId> {
        self.heartbeats
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| *entry.key())
            .ok_or_else(|| Error::unavailable("no storage nodes known via heartbeat"))
    }

    fn create_file_like(&self, parent: ObjectId, name: &str, file_type: FileType) -> Result<ObjectId> {
        let inode = ObjectId::generate(self.partition_id);
        self.namespace.create(parent, name, file_type, inode)?;
        if file_type == FileType::File {
            self.put_file_info(inode, &FileInfo::default())?;
        }
        Ok(inode)
    }

    fn dispatch(&self, op_type: u32, payload: &[u8], log_index: u64) -> Result<Vec<u8>> {
        macro_rules! handle {
            ($req_ty:ty, $body:expr) => {{
                let request: $req_ty = bincode::deserialize(payload)?;
                let response = $body(request)?;
                Ok(bincode::serialize(&response)?)
            }};
        }

        match op_type {
            CREATE_FILE => handle!(CreateFileRequest, |r: CreateFileRequest| -> Result<_> {
                let inode = self.create_file_like(r.parent, &r.name, FileType::File)?;
                Ok(CreateFileResponse { inode })
            }),
            CREATE_DIR => handle!(CreateDirRequest, |r: CreateDirRequest| -> Result<_> {
                let inode = self.create_file_like(r.parent, &r.name, FileType::Directory)?;
                Ok(CreateDirResponse { inode })
            }),
            REMOVE_FILE => handle!(RemoveFileRequest, |r: RemoveFileRequest| -> Result<_> {
                self.namespace.remove(r.parent, &r.name)?;
                Ok(RemoveFileResponse)
            }),
            SEAL_FILE => handle!(SealFileRequest, |r: SealFileRequest| -> Result<_> {
                let mut info = self.file_info(r.inode)?;
                info.sealed = true;
                self.put_file_info(r.inode, &info)?;
                Ok(SealFileResponse)
            }),
            CREATE_CHUNK => handle!(CreateChunkRequest, |r: CreateChunkRequest| -> Result<_> {
                let mut info = self.file_info(r.inode)?;
                if info.sealed {
                    return Err(Error::failed_precondition(format!("file {} is sealed", r.inode)));
                }
                if info.chunks.last().is_some_and(|c| self.chunk_open(c)) {
                    return Err(Error::failed_precondition(format!("file {} already has an open tail chunk", r.inode)));
                }
                let node = self.pick_placement_node()?;
                let placement =
                    ChunkPlacement { chunk_id: ObjectId::generate(self.partition_id), node, offset: total_size(&info) };
                info.chunks.push(placement.clone());
                self.put_file_info(r.inode, &info)?;
                Ok(CreateChunkResponse { placement })
            }),
            CHECK_IN_CHUNK => handle!(CheckInChunkRequest, |r: CheckInChunkRequest| -> Result<_> {
                let mut info = self.file_info(r.inode)?;
                let placement = info
                    .chunks
                    .iter_mut()
                    .find(|c| c.chunk_id == r.chunk_id)
                    .ok_or_else(|| Error::not_found(format!("chunk {} in file {}", r.chunk_id, r.inode)))?;
                placement.offset = r.size;
                self.put_file_info(r.inode, &info)?;
                Ok(CheckInChunkResponse)
            }),
            SEAL_CHUNK => handle!(SealChunkRequest, |r: SealChunkRequest| -> Result<_> {
                let info = self.file_info(r.inode)?;
                if !info.chunks.iter().any(|c| c.chunk_id == r.chunk_id) {
                    return Err(Error::not_found(format!("chunk {} in file {}", r.chunk_id, r.inode)));
                }
                self.mark_sealed(r.chunk_id);
                Ok(SealChunkResponse)
            }),
            SEAL_AND_NEW_CHUNK => handle!(SealAndNewChunkRequest, |r: SealAndNewChunkRequest| -> Result<_> {
                let mut info = self.file_info(r.inode)?;
                let sealed_chunk_id = info
                    .chunks
                    .last()
                    .ok_or_else(|| Error::failed_precondition(format!("file {} has no tail chunk to seal", r.inode)))?
                    .chunk_id;
                self.mark_sealed(sealed_chunk_id);
                let node = self.pick_placement_node()?;
                let new_placement =
                    ChunkPlacement { chunk_id: ObjectId::generate(self.partition_id), node, offset: total_size(&info) };
                info.chunks.push(new_placement.clone());
                self.put_file_info(r.inode, &info)?;
                Ok(SealAndNewChunkResponse { sealed_chunk_id, new_placement })
            }),
            READ_DIR => handle!(ReadDirRequest, |r: ReadDirRequest| -> Result<_> {
                let entries: Vec<DirEntry> = self.namespace.list(r.parent)?;
                Ok(ReadDirResponse { entries })
            }),
            GET_FILE_INFO => handle!(GetFileInfoRequest, |r: GetFileInfoRequest| -> Result<_> {
                Ok(GetFileInfoResponse { info: self.file_info(r.inode)? })
            }),
            MANUSYA_HEARTBEAT => handle!(ManusyaHeartbeatRequest, |r: ManusyaHeartbeatRequest| -> Result<_> {
                self.heartbeats.insert(r.node, log_index);
                Ok(ManusyaHeartbeatResponse)
            }),
            LIST_MANUSYA => handle!(ListManusyaRequest, |_: ListManusyaRequest| -> Result<_> {
                let mut nodes: Vec<ObjectId> = self.heartbeats.iter().map(|e| *e.key()).collect();
                nodes.sort();
                Ok(ListManusyaResponse { nodes })
            }),
            other => Err(Error::internal(format!("unknown deva op type {other}"))),
        }
    }

    fn chunk_open(&self, placement: &ChunkPlacement) -> bool {
        !self.sealed_chunks.contains(&placement.chunk_id)
    }

    fn mark_sealed(&self, chunk_id: ObjectId) {
        self.sealed_chunks.insert(chunk_id);
    }
}

fn total_size(info: &FileInfo) -> u64 {
    info.chunks.last().map(|c| c.offset).unwrap_or(0)
}

impl Container for DevaContainer {
    fn process(&self, op_type: u32, payload: &[u8], log_index: u64) -> Result<Vec<u8>> {
        self.dispatch(op_type, payload, log_index)
    }

    fn save_snapshot(&self) -> Result<Vec<u8>> {
        let heartbeats: Vec<(ObjectId, u64)> = self.heartbeats.iter().map(|e| (*e.key(), *e.value())).collect();
        let sealed: Vec<ObjectId> = self.sealed_chunks.iter().map(|e| *e).collect();
        Ok(bincode::serialize(&(heartbeats, sealed))?)
    }

    fn load_snapshot(&self, snapshot: &[u8]) -> Result<()> {
        let (heartbeats, sealed): (Vec<(ObjectId, u64)>, Vec<ObjectId>) = bincode::deserialize(snapshot)?;
        self.heartbeats.clear();
        for (node, last_seen) in heartbeats {
            self.heartbeats.insert(node, last_seen);
        }
        self.sealed_chunks.clear();
        for chunk_id in sealed {
            self.sealed_chunks.insert(chunk_id);
        }
        Ok(())
    }
}

/// Reconstructs a Deva [`Op`] from a decoded log entry.
pub struct DevaOpFactory {
    container: Arc<DevaContainer>,
}

impl DevaOpFactory {
    pub fn new(container: Arc<DevaContainer>) -> Self {
        Self { container }
    }
}

/// Whether `op_type` mutates state and must be replicated, as opposed to
/// being served locally from whatever state this replica currently has.
pub fn is_mutating(op_type: u32) -> bool {
    !matches!(op_type, READ_DIR | GET_FILE_INFO | LIST_MANUSYA)
}

macro_rules! factory_arm {
    ($op_type:expr, $container:expr, $req_ty:ty, $resp_ty:ty, $payload:expr) => {{
        let request: $req_ty = bincode::deserialize($payload)?;
        Ok(Box::new(ContainerOp::<$req_ty, $resp_ty>::new($op_type, request, $container.clone(), None, is_mutating($op_type)))
            as Box<dyn Op>)
    }};
}

impl OpFactory for DevaOpFactory {
    fn create(&self, op_type: u32, _version: i32, payload: &[u8]) -> Result<Box<dyn Op>> {
        let container: Arc<dyn Container> = self.container.clone();
        match op_type {
            CREATE_FILE => factory_arm!(op_type, container, CreateFileRequest, CreateFileResponse, payload),
            CREATE_DIR => factory_arm!(op_type, container, CreateDirRequest, CreateDirResponse, payload),
            REMOVE_FILE => factory_arm!(op_type, container, RemoveFileRequest, RemoveFileResponse, payload),
            SEAL_FILE => factory_arm!(op_type, container, SealFileRequest, SealFileResponse, payload),
            CREATE_CHUNK => factory_arm!(op_type, container, CreateChunkRequest, CreateChunkResponse, payload),
            CHECK_IN_CHUNK => factory_arm!(op_type, container, CheckInChunkRequest, CheckInChunkResponse, payload),
            SEAL_CHUNK => factory_arm!(op_type, container, SealChunkRequest, SealChunkResponse, payload),
            SEAL_AND_NEW_CHUNK => {
                factory_arm!(op_type, container, SealAndNewChunkRequest, SealAndNewChunkResponse, payload)
            }
            READ_DIR => factory_arm!(op_type, container, ReadDirRequest, ReadDirResponse, payload),
            GET_FILE_INFO => factory_arm!(op_type, container, GetFileInfoRequest, GetFileInfoResponse, payload),
            MANUSYA_HEARTBEAT => {
                factory_arm!(op_type, container, ManusyaHeartbeatRequest, ManusyaHeartbeatResponse, payload)
            }
            LIST_MANUSYA => factory_arm!(op_type, container, ListManusyaRequest, ListManusyaResponse, payload),
            other => Err(Error::internal(format!("unknown deva op type {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn container() -> DevaContainer {
        let c = DevaContainer::new(Arc::new(MemoryStore::new()), 0);
        c.ensure_root().unwrap();
        c
    }

    fn call<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        container: &DevaContainer,
        op_type: u32,
        request: Req,
    ) -> Result<Resp> {
        let payload = bincode::serialize(&request)?;
        let bytes = container.process(op_type, &payload, 1)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    #[test]
    fn create_dir_then_file_then_read_dir_matches_scenario() {
        let c = container();
        let root = c.namespace.root();

        let _: CreateDirResponse = call(&c, CREATE_DIR, CreateDirRequest { parent: root, name: "a".into() }).unwrap();
        let (a_id, _) = c.namespace.lookup("/a").unwrap();

        let _: CreateFileResponse =
            call(&c, CREATE_FILE, CreateFileRequest { parent: a_id, name: "b".into() }).unwrap();

        let listing: ReadDirResponse = call(&c, READ_DIR, ReadDirRequest { parent: a_id }).unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name, "b");
        assert_eq!(listing.entries[0].file_type, FileType::File);

        let err = call::<_, CreateFileResponse>(&c, CREATE_FILE, CreateFileRequest { parent: a_id, name: "b".into() })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn create_chunk_requires_a_known_storage_node() {
        let c = container();
        let root = c.namespace.root();
        let file: CreateFileResponse = call(&c, CREATE_FILE, CreateFileRequest { parent: root, name: "f".into() }).unwrap();

        let err = call::<_, CreateChunkResponse>(&c, CREATE_CHUNK, CreateChunkRequest { inode: file.inode })
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn seal_and_new_chunk_is_atomic_and_picks_least_recently_seen_node() {
        let c = container();
        let root = c.namespace.root();
        let file: CreateFileResponse = call(&c, CREATE_FILE, CreateFileRequest { parent: root, name: "f".into() }).unwrap();

        let node_a = ObjectId::generate(0);
        let node_b = ObjectId::generate(0);
        c.heartbeats.insert(node_a, 1);
        c.heartbeats.insert(node_b, 2);

        let first: CreateChunkResponse = call(&c, CREATE_CHUNK, CreateChunkRequest { inode: file.inode }).unwrap();
        assert_eq!(first.placement.node, node_a);

        c.heartbeats.insert(node_a, 10);
        let sealed_and_new: SealAndNewChunkResponse =
            call(&c, SEAL_AND_NEW_CHUNK, SealAndNewChunkRequest { inode: file.inode }).unwrap();
        assert_eq!(sealed_and_new.sealed_chunk_id, first.placement.chunk_id);
        assert_eq!(sealed_and_new.new_placement.node, node_b);

        let err = call::<_, CreateChunkResponse>(&c, CREATE_CHUNK, CreateChunkRequest { inode: file.inode })
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)), "the new tail chunk is already open");
    }

    #[test]
    fn heartbeat_then_list_manusya_reports_node() {
        let c = container();
        let node = ObjectId::generate(0);
        let _: ManusyaHeartbeatResponse =
            call(&c, MANUSYA_HEARTBEAT, ManusyaHeartbeatRequest { node }).unwrap();
        let listed: ListManusyaResponse = call(&c, LIST_MANUSYA, ListManusyaRequest).unwrap();
        assert_eq!(listed.nodes, vec![node]);
    }

    #[test]
    fn snapshot_round_trips_heartbeats() {
        let c = container();
        let node = ObjectId::generate(0);
        c.heartbeats.insert(node, 7);
        let snapshot = c.save_snapshot().unwrap();

        let restored = DevaContainer::new(Arc::new(MemoryStore::new()), 0);
        restored.load_snapshot(&snapshot).unwrap();
        assert_eq!(*restored.heartbeats.get(&node).unwrap(), 7);
    }
}
