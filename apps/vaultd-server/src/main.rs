//! vaultd: a server-side secrets vault over gRPC.
//!
//! Records (passwords, bank cards, texts, files) are scoped to the owning
//! user. File bodies live on disk under the blob root; everything else is
//! in Postgres.

mod handlers;
mod hasher;
mod server;
mod token;
mod validate;


use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vaultd_blob::BlobStore;
use vaultd_proto::vault_service_server::VaultServiceServer;
use vaultd_storage::RetryPolicy;
use vaultd_store_postgres::PostgresStore;

use crate::server::VaultServer;
use crate::token::TokenManager;

#[derive(Parser)]
#[command(name = "vaultd")]
#[command(about = "Secrets vault gRPC server")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// gRPC bind address
    #[arg(long, default_value = "0.0.0.0:50051", env = "VAULTD_ADDR")]
    addr: String,

    /// HTTP health probe bind address
    #[arg(long, default_value = "0.0.0.0:8080", env = "VAULTD_HEALTH_ADDR")]
    health_addr: String,

    /// Secret used to sign bearer tokens
    #[arg(long, env = "VAULTD_TOKEN_SECRET")]
    token_secret: String,

    /// Bearer token lifetime in minutes
    #[arg(long, default_value_t = 60, env = "VAULTD_TOKEN_TTL_MINUTES")]
    token_ttl_minutes: i64,

    /// Root directory for uploaded blobs
    #[arg(long, default_value = "vaultd-blobs", env = "VAULTD_BLOB_ROOT")]
    blob_root: PathBuf,

    /// Chunk size in bytes for file downloads
    #[arg(long, default_value_t = 65536, env = "VAULTD_CHUNK_SIZE")]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    serve(cli).await
}

async fn serve(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = cli.addr.parse()?;
    let health_addr: std::net::SocketAddr = cli.health_addr.parse()?;

    // Cancelled on shutdown so retry backoff sleeps stop promptly.
    let cancel = CancellationToken::new();

    let store = Arc::new(
        PostgresStore::open(&cli.database_url, RetryPolicy::default(), cancel.clone()).await?,
    );
    let blobs = Arc::new(BlobStore::new(cli.blob_root, cli.chunk_size).await?);
    let tokens = TokenManager::new(&cli.token_secret, cli.token_ttl_minutes);
    let vault = VaultServer::new(store.clone(), blobs, tokens);

    // gRPC health checking protocol
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<VaultServiceServer<VaultServer>>()
        .await;

    // HTTP probes: /healthz is plain liveness, /readyz flips once the gRPC
    // listener is up and back off again during drain.
    let (readiness_tx, readiness_rx) = tokio::sync::watch::channel(false);
    let health_router = axum::Router::new()
        .route("/healthz", axum::routing::get(health_handler))
        .route("/readyz", axum::routing::get(readiness_handler))
        .with_state(ReadinessCheck { ready: readiness_rx });

    let grpc_listener = tokio::net::TcpListener::bind(addr).await?;
    let health_listener = tokio::net::TcpListener::bind(health_addr).await?;
    info!("vaultd listening on {}", grpc_listener.local_addr()?);
    info!("health probes on {}", health_listener.local_addr()?);

    let _ = readiness_tx.send(true);

    // One broadcast fans the termination signal out to both servers.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    let cancel_on_shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal(readiness_tx).await;
        cancel_on_shutdown.cancel();
        let _ = shutdown_tx_clone.send(());
    });

    let mut health_shutdown = shutdown_tx.subscribe();
    let health_server =
        axum::serve(health_listener, health_router).with_graceful_shutdown(async move {
            let _ = health_shutdown.recv().await;
        });

    let service = VaultServiceServer::new(vault)
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Gzip);

    let mut grpc_shutdown = shutdown_tx.subscribe();
    let grpc_server = Server::builder()
        .add_service(health_service)
        .add_service(service)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(grpc_listener),
            async move {
                let _ = grpc_shutdown.recv().await;
            },
        );

    // In-flight RPCs finish before either server returns.
    let (grpc_result, health_result) = tokio::join!(grpc_server, health_server);
    grpc_result?;
    health_result?;

    store.close().await;
    info!("shutdown complete");
    Ok(())
}

#[derive(Clone)]
struct ReadinessCheck {
    ready: tokio::sync::watch::Receiver<bool>,
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn readiness_handler(
    axum::extract::State(check): axum::extract::State<ReadinessCheck>,
) -> Result<&'static str, axum::http::StatusCode> {
    if *check.ready.borrow() {
        Ok("ok")
    } else {
        Err(axum::http::StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn shutdown_signal(readiness_tx: tokio::sync::watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("received SIGINT, shutting down gracefully"),
        _ = sigquit.recv() => info!("received SIGQUIT, shutting down gracefully"),
    }

    // Mark not ready so traffic drains before the listeners stop.
    let _ = readiness_tx.send(false);
}
