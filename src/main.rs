//! ATProto content-labeler service.
//!
//! Exposes `com.atproto.label.queryLabels`, `com.atproto.label.subscribeLabels`,
//! and `tools.ozone.moderation.emitEvent` over a signed, append-only label log.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::routing::{any, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

mod auth;
mod broadcaster;
mod config;
mod crypto;
mod error;
mod frame;
mod handlers;
mod labels;
mod policy;
mod sequencer;
mod state;
mod store;

use broadcaster::Broadcaster;
use config::{Config, StoreBackend};
use crypto::did_resolver::DidCache;
use labels::LabelSigner;
use policy::SameAsLabelerPolicy;
use sequencer::Sequencer;
use state::AppState;
use store::memory::InMemoryStore;
use store::postgres::PgStore;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let signer = LabelSigner::from_str_key(&config.labeler_signing_key, &config.labeler_did)?;
    info!(did = %signer.did(), "labeler signer initialized");

    let store: Arc<dyn Store> = match &config.store_backend {
        StoreBackend::Postgres { database_url } => {
            Arc::new(PgStore::connect(database_url).await?)
        }
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
    };

    // §4.I: the service refuses to accept traffic until init completes.
    store.init().await?;
    info!("label store initialized");

    let broadcaster = Arc::new(Broadcaster::default());
    let sequencer = Arc::new(Sequencer::new(store.clone(), signer.clone(), broadcaster.clone()));
    let policy = Arc::new(SameAsLabelerPolicy::new(config.labeler_did.clone()));

    let state = AppState {
        labeler_did: Arc::from(config.labeler_did.as_str()),
        store,
        sequencer,
        broadcaster,
        did_cache: Arc::new(DidCache::new()),
        policy,
    };

    let app = Router::new()
        .route(
            "/xrpc/com.atproto.label.queryLabels",
            get(handlers::query::query_labels),
        )
        .route(
            "/xrpc/tools.ozone.moderation.emitEvent",
            post(handlers::emit::emit_event),
        )
        .route(
            "/xrpc/com.atproto.label.subscribeLabels",
            get(handlers::subscribe::subscribe_labels),
        )
        .route("/xrpc/_health", get(handlers::health::health))
        .fallback(any(method_not_implemented))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow!("invalid bind addr: {e}"))?;
    info!(%addr, "labeler service listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn method_not_implemented() -> error::AppError {
    error::AppError::MethodNotImplemented
}
