//! Manusya's numeric op-type space (100..200) and the request/response
//! payloads carried by each. Only `RegisterChunk` and `ListChunks` go
//! through the replicated log; append/read/seal/remove are direct,
//! single-node calls against `Bank`.

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

pub const REGISTER_CHUNK: u32 = 101;
pub const LIST_CHUNKS: u32 = 102;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterChunkRequest {
    pub chunk_id: ObjectId,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterChunkResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChunksRequest {
    pub start: ObjectId,
    pub limit: usize,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChunksResponse {
    pub chunk_ids: Vec<ObjectId>,
}
