//! Deva's numeric op-type space (1..100) and the request/response payloads
//! carried by each.

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

pub const CREATE_FILE: u32 = 1;
pub const CREATE_DIR: u32 = 2;
pub const REMOVE_FILE: u32 = 3;
pub const SEAL_FILE: u32 = 4;
pub const CREATE_CHUNK: u32 = 5;
pub const CHECK_IN_CHUNK: u32 = 6;
pub const SEAL_CHUNK: u32 = 7;
pub const SEAL_AND_NEW_CHUNK: u32 = 8;
pub const READ_DIR: u32 = 9;
pub const GET_FILE_INFO: u32 = 10;
pub const MANUSYA_HEARTBEAT: u32 = 20;
pub const LIST_MANUSYA: u32 = 21;

/// One chunk's placement within a file's ordered chunk list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlacement {
    pub chunk_id: ObjectId,
    pub node: ObjectId,
    pub offset: u64,
}

/// Inode-level metadata for a file, persisted as the inode blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub chunks: Vec<ChunkPlacement>,
    pub sealed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub parent: ObjectId,
    pub name: String,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileResponse {
    pub inode: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDirRequest {
    pub parent: ObjectId,
    pub name: String,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDirResponse {
    pub inode: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFileRequest {
    pub parent: ObjectId,
    pub name: String,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFileResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealFileRequest {
    pub inode: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealFileResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChunkRequest {
    pub inode: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChunkResponse {
    pub placement: ChunkPlacement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInChunkRequest {
    pub inode: ObjectId,
    pub chunk_id: ObjectId,
    pub size: u64,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInChunkResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealChunkRequest {
    pub inode: ObjectId,
    pub chunk_id: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealChunkResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealAndNewChunkRequest {
    pub inode: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealAndNewChunkResponse {
    pub sealed_chunk_id: ObjectId,
    pub new_placement: ChunkPlacement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadDirRequest {
    pub parent: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadDirResponse {
    pub entries: Vec<crate::namespace::DirEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileInfoRequest {
    pub inode: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileInfoResponse {
    pub info: FileInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManusyaHeartbeatRequest {
    pub node: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManusyaHeartbeatResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListManusyaRequest;
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListManusyaResponse {
    pub nodes: Vec<ObjectId>,
}

pub use crate::namespace::FileType as DirEntryType;
