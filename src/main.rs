//! Entry point for a single Deva or Manusya node, selected by subcommand.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use stratum::config::Config;
use stratum::container_op::{Container, ContainerOp};
use stratum::deva::ops::*;
use stratum::deva::{is_mutating, DevaContainer, DevaOpFactory};
use stratum::error::Result;
use stratum::manusya::ops::{ListChunksRequest, ListChunksResponse};
use stratum::manusya::{ManusyaContainer, ManusyaNode, ManusyaOpFactory};
use stratum::object_id::ObjectId;
use stratum::op::Op;
use stratum::rpc::{http, DevaService, ManusyaService};
use stratum::rsm::Rsm;
use stratum::{bank::Bank, store};

#[derive(Parser)]
#[command(name = "stratum", about = "Replicated chunk storage fabric")]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Run a Deva metadata node.
    Deva {
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
        #[arg(long, default_value_t = 0)]
        partition_id: u32,
    },
    /// Run a Manusya chunk storage node.
    Manusya {
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },
}

struct DevaServiceImpl {
    container: Arc<dyn Container>,
    rsm: Arc<Rsm>,
}

#[async_trait::async_trait]
impl DevaService for DevaServiceImpl {
    async fn create_file(&self, request: CreateFileRequest) -> Result<CreateFileResponse> {
        self.call(CREATE_FILE, request).await
    }
    async fn create_dir(&self, request: CreateDirRequest) -> Result<CreateDirResponse> {
        self.call(CREATE_DIR, request).await
    }
    async fn remove_file(&self, request: RemoveFileRequest) -> Result<RemoveFileResponse> {
        self.call(REMOVE_FILE, request).await
    }
    async fn seal_file(&self, request: SealFileRequest) -> Result<SealFileResponse> {
        self.call(SEAL_FILE, request).await
    }
    async fn create_chunk(&self, request: CreateChunkRequest) -> Result<CreateChunkResponse> {
        self.call(CREATE_CHUNK, request).await
    }
    async fn check_in_chunk(&self, request: CheckInChunkRequest) -> Result<CheckInChunkResponse> {
        self.call(CHECK_IN_CHUNK, request).await
    }
    async fn seal_chunk(&self, request: SealChunkRequest) -> Result<SealChunkResponse> {
        self.call(SEAL_CHUNK, request).await
    }
    async fn seal_and_new_chunk(&self, request: SealAndNewChunkRequest) -> Result<SealAndNewChunkResponse> {
        self.call(SEAL_AND_NEW_CHUNK, request).await
    }
    async fn read_dir(&self, request: ReadDirRequest) -> Result<ReadDirResponse> {
        self.call(READ_DIR, request).await
    }
    async fn get_file_info(&self, request: GetFileInfoRequest) -> Result<GetFileInfoResponse> {
        self.call(GET_FILE_INFO, request).await
    }
    async fn manusya_heartbeat(&self, request: ManusyaHeartbeatRequest) -> Result<ManusyaHeartbeatResponse> {
        self.call(MANUSYA_HEARTBEAT, request).await
    }
    async fn list_manusya(&self, request: ListManusyaRequest) -> Result<ListManusyaResponse> {
        self.call(LIST_MANUSYA, request).await
    }
}

impl DevaServiceImpl {
    async fn call<Req, Resp>(&self, op_type: u32, request: Req) -> Result<Resp>
    where
        Req: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
        Resp: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let op: Box<dyn Op> =
            Box::new(ContainerOp::<Req, Resp>::new(op_type, request, self.container.clone(), Some(tx), is_mutating(op_type)));
        op.apply(&self.rsm)?;
        rx.await.map_err(|_| stratum::error::Error::unavailable("rsm apply task dropped the response channel"))?
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.role {
        Role::Deva { config, partition_id } => run_deva(config.as_deref(), partition_id).await?,
        Role::Manusya { config } => run_manusya(config.as_deref()).await?,
    }

    Ok(())
}

async fn run_deva(config_path: Option<&std::path::Path>, partition_id: u32) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path);
    info!(address = %config.listen_address, partition_id, "starting deva node");

    let backing_store = store::open(&config.storage, &config.db_path())?;
    let deva_container = Arc::new(DevaContainer::new(backing_store, partition_id));
    deva_container.ensure_root()?;

    let factory = Arc::new(DevaOpFactory::new(deva_container.clone()));
    let container: Arc<dyn Container> = deva_container;
    let rsm = Rsm::new(partition_id as u64, format!("deva-{partition_id}"), container.clone(), factory);
    // Single-node illustrative deployment: this replica is always leader,
    // since no consensus layer actually grants leadership here.
    rsm.on_leader_start(0);

    let service: Arc<dyn DevaService> = Arc::new(DevaServiceImpl { container, rsm: rsm.clone() });
    let app = http::router(service);
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;

    let server = tokio::spawn(async move { axum::serve(listener, app).await.expect("deva http server failed") });

    tokio::select! {
        _ = signal::ctrl_c() => warn!("received shutdown signal"),
        _ = server => warn!("deva server terminated unexpectedly"),
    }
    rsm.shutdown().await;
    info!("deva shutdown complete");
    Ok(())
}

async fn run_manusya(config_path: Option<&std::path::Path>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path);
    info!(address = %config.listen_address, "starting manusya node");

    let backing_store = store::open(&config.storage, &config.db_path())?;
    let bank = Arc::new(Bank::new(backing_store));
    bank.load()?;

    let manusya_container = Arc::new(ManusyaContainer::new(bank.clone()));
    let factory = Arc::new(ManusyaOpFactory::new(manusya_container.clone()));
    let container: Arc<dyn Container> = manusya_container;
    let rsm = Rsm::new(0, "manusya".into(), container.clone(), factory);
    // Single-node illustrative deployment: this replica is always leader,
    // since no consensus layer actually grants leadership here.
    rsm.on_leader_start(0);

    let node = Arc::new(ManusyaNode::new(bank, container, rsm.clone()));
    let service: Arc<dyn ManusyaService> = Arc::new(ManusyaServiceImpl { node });
    let app = http::manusya_router(service);
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;

    let server = tokio::spawn(async move { axum::serve(listener, app).await.expect("manusya http server failed") });

    tokio::select! {
        _ = signal::ctrl_c() => warn!("received shutdown signal"),
        _ = server => warn!("manusya server terminated unexpectedly"),
    }
    rsm.shutdown().await;
    info!("manusya shutdown complete");
    Ok(())
}

struct ManusyaServiceImpl {
    node: Arc<ManusyaNode>,
}

#[async_trait::async_trait]
impl ManusyaService for ManusyaServiceImpl {
    async fn create_chunk(&self, partition_id: u32) -> Result<ObjectId> {
        self.node.create_chunk(partition_id).await
    }
    async fn append(&self, chunk_id: ObjectId, buf: Vec<u8>, offset: u64) -> Result<()> {
        self.node.append(chunk_id, &buf, offset)
    }
    async fn read(&self, chunk_id: ObjectId, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.node.read(chunk_id, offset, length)
    }
    async fn seal(&self, chunk_id: ObjectId) -> Result<u64> {
        self.node.seal(chunk_id)
    }
    async fn remove(&self, chunk_id: ObjectId) -> Result<()> {
        self.node.remove(chunk_id)
    }
    async fn list_chunks(&self, request: ListChunksRequest) -> Result<ListChunksResponse> {
        let chunk_ids = self.node.list_chunks(request.start, request.limit);
        Ok(ListChunksResponse { chunk_ids })
    }
}
