//! The service-facing trait boundary a transport would dispatch RPCs
//! against, plus a minimal illustrative `axum` binding over it.
//!
//! No wire protocol is wired up here: `DevaService`/`ManusyaService` are
//! async traits with one method per operation, and `http::router` shows
//! how a caller would translate JSON bodies into calls against them. This
//! is scaffolding for a transport layer, not a hardened API.

use std::sync::Arc;

use async_trait::async_trait;

use crate::deva::ops::*;
use crate::error::Result;
use crate::manusya::ops::{ListChunksRequest, ListChunksResponse};
use crate::object_id::ObjectId;

/// Deva's RPC surface: one method per op type named in the namespace and
/// placement design.
#[async_trait]
pub trait DevaService: Send + Sync {
    async fn create_file(&self, request: CreateFileRequest) -> Result<CreateFileResponse>;
    async fn create_dir(&self, request: CreateDirRequest) -> Result<CreateDirResponse>;
    async fn remove_file(&self, request: RemoveFileRequest) -> Result<RemoveFileResponse>;
    async fn seal_file(&self, request: SealFileRequest) -> Result<SealFileResponse>;
    async fn create_chunk(&self, request: CreateChunkRequest) -> Result<CreateChunkResponse>;
    async fn check_in_chunk(&self, request: CheckInChunkRequest) -> Result<CheckInChunkResponse>;
    async fn seal_chunk(&self, request: SealChunkRequest) -> Result<SealChunkResponse>;
    async fn seal_and_new_chunk(&self, request: SealAndNewChunkRequest) -> Result<SealAndNewChunkResponse>;
    async fn read_dir(&self, request: ReadDirRequest) -> Result<ReadDirResponse>;
    async fn get_file_info(&self, request: GetFileInfoRequest) -> Result<GetFileInfoResponse>;
    async fn manusya_heartbeat(&self, request: ManusyaHeartbeatRequest) -> Result<ManusyaHeartbeatResponse>;
    async fn list_manusya(&self, request: ListManusyaRequest) -> Result<ListManusyaResponse>;
}

/// Manusya's RPC surface: direct chunk operations plus the replicated
/// registry list.
#[async_trait]
pub trait ManusyaService: Send + Sync {
    async fn create_chunk(&self, partition_id: u32) -> Result<ObjectId>;
    async fn append(&self, chunk_id: ObjectId, buf: Vec<u8>, offset: u64) -> Result<()>;
    async fn read(&self, chunk_id: ObjectId, offset: u64, length: u64) -> Result<Vec<u8>>;
    async fn seal(&self, chunk_id: ObjectId) -> Result<u64>;
    async fn remove(&self, chunk_id: ObjectId) -> Result<()>;
    async fn list_chunks(&self, request: ListChunksRequest) -> Result<ListChunksResponse>;
}

/// An illustrative, unauthenticated JSON-over-HTTP binding for
/// [`DevaService`]. Not a hardened API: no auth, no rate limiting, no
/// request size caps.
pub mod http {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use std::result::Result as StdResult;
    use tower::ServiceBuilder;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    #[derive(Clone)]
    pub struct DevaState {
        pub service: Arc<dyn DevaService>,
    }

    pub fn router(service: Arc<dyn DevaService>) -> Router {
        let state = DevaState { service };
        Router::new()
            .route("/deva/create_file", post(create_file))
            .route("/deva/create_dir", post(create_dir))
            .route("/deva/remove_file", post(remove_file))
            .route("/deva/read_dir", post(read_dir))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
    }

    #[derive(Clone)]
    pub struct ManusyaState {
        pub service: Arc<dyn ManusyaService>,
    }

    #[derive(serde::Deserialize)]
    pub struct CreateChunkHttpRequest {
        pub partition_id: u32,
    }

    #[derive(serde::Serialize)]
    pub struct CreateChunkHttpResponse {
        pub chunk_id: ObjectId,
    }

    /// Binds `create_chunk`/`list_chunks`, the two Manusya operations with
    /// a real RSM-backed code path; the rest of `ManusyaService` stays
    /// direct-to-`Bank` and is left unrouted here.
    pub fn manusya_router(service: Arc<dyn ManusyaService>) -> Router {
        let state = ManusyaState { service };
        Router::new()
            .route("/manusya/create_chunk", post(create_chunk))
            .route("/manusya/list_chunks", post(list_chunks))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
    }

    async fn create_chunk(
        State(state): State<ManusyaState>,
        Json(request): Json<CreateChunkHttpRequest>,
    ) -> StdResult<Json<CreateChunkHttpResponse>, StatusCode> {
        state
            .service
            .create_chunk(request.partition_id)
            .await
            .map(|chunk_id| Json(CreateChunkHttpResponse { chunk_id }))
            .map_err(status_of)
    }

    async fn list_chunks(
        State(state): State<ManusyaState>,
        Json(request): Json<ListChunksRequest>,
    ) -> StdResult<Json<ListChunksResponse>, StatusCode> {
        state.service.list_chunks(request).await.map(Json).map_err(status_of)
    }

    async fn create_file(
        State(state): State<DevaState>,
        Json(request): Json<CreateFileRequest>,
    ) -> StdResult<Json<CreateFileResponse>, StatusCode> {
        state.service.create_file(request).await.map(Json).map_err(status_of)
    }

    async fn create_dir(
        State(state): State<DevaState>,
        Json(request): Json<CreateDirRequest>,
    ) -> StdResult<Json<CreateDirResponse>, StatusCode> {
        state.service.create_dir(request).await.map(Json).map_err(status_of)
    }

    async fn remove_file(
        State(state): State<DevaState>,
        Json(request): Json<RemoveFileRequest>,
    ) -> StdResult<Json<RemoveFileResponse>, StatusCode> {
        state.service.remove_file(request).await.map(Json).map_err(status_of)
    }

    async fn read_dir(
        State(state): State<DevaState>,
        Json(request): Json<ReadDirRequest>,
    ) -> StdResult<Json<ReadDirResponse>, StatusCode> {
        state.service.read_dir(request).await.map(Json).map_err(status_of)
    }

    use axum::http::StatusCode;

    fn status_of(err: crate::error::Error) -> StatusCode {
        match err {
            crate::error::Error::NotFound(_) => StatusCode::NOT_FOUND,
            crate::error::Error::AlreadyExists(_) => StatusCode::CONFLICT,
            crate::error::Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            crate::error::Error::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            crate::error::Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            crate::error::Error::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
