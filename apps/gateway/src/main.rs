use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buzzchat_common::SnowflakeGenerator;
use buzzchat_gateway::config::Config;
use buzzchat_gateway::gateway::registry::ConnectionRegistry;
use buzzchat_gateway::log::memory::MemoryLog;
use buzzchat_gateway::log::EventLog;
use buzzchat_gateway::presence::PresenceCoordinator;
use buzzchat_gateway::store::directory::{GroupDirectory, MemoryDirectory};
use buzzchat_gateway::store::kv::{MemoryStore, PresenceStore};
use buzzchat_gateway::store::messages::{MemoryMessages, MessageStore};
use buzzchat_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory backends for single-node runs. A fleet deployment swaps these
    // for the Kafka, Redis, and database clients.
    let log: Arc<dyn EventLog> = Arc::new(MemoryLog::new());
    let presence_store: Arc<dyn PresenceStore> = Arc::new(MemoryStore::new());
    let groups: Arc<dyn GroupDirectory> = Arc::new(MemoryDirectory::new());
    let messages: Arc<dyn MessageStore> = Arc::new(MemoryMessages::new());

    tracing::info!(instance_id = %config.instance_id, "gateway configured");

    let state = AppState {
        snowflake: Arc::new(SnowflakeGenerator::new(config.worker_id)),
        config: Arc::new(config),
        registry: Arc::new(ConnectionRegistry::new()),
        presence: Arc::new(PresenceCoordinator::new(presence_store)),
        log,
        groups,
        messages,
    };

    // The per-instance fan-out consumer, plus the two shared-group writer
    // roles. A multi-service deployment runs the writers elsewhere.
    tokio::spawn(buzzchat_gateway::gateway::consumer::run(state.clone()));
    tokio::spawn(buzzchat_gateway::router::run(state.clone()));
    tokio::spawn(buzzchat_gateway::persist::run(state.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(buzzchat_gateway::gateway::server::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
