//! Application state wiring the session engine to its concrete store and
//! transport.
//!
//! The orchestrator is generic over `ChatStore` and `CompletionTransport`;
//! AppState pins it to SQLite and Ollama.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::session::SessionOrchestrator;
use parley_infra::config::load_config;
use parley_infra::filesystem::{database_url, ensure_data_dir, resolve_data_dir};
use parley_infra::llm::OllamaTransport;
use parley_infra::sqlite::{DatabasePool, SqliteChatStore};
use parley_types::config::ParleyConfig;

/// Orchestrator pinned to the infra implementations.
pub type ConcreteOrchestrator = SessionOrchestrator<SqliteChatStore, OllamaTransport>;

/// Shared application state used by every command.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub store: Arc<SqliteChatStore>,
    pub config: ParleyConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the DB,
    /// wire the orchestrator.
    ///
    /// Does not touch chats; commands call `initialize` on the orchestrator
    /// when they need an active chat.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir).await?;

        let config = load_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let store = Arc::new(SqliteChatStore::new(db_pool.clone()));

        let transport = OllamaTransport::new(&config.ollama)?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            base_url = transport.base_url(),
            "application state initialized"
        );

        let orchestrator = SessionOrchestrator::new(store.clone(), transport, config.clone());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            store,
            config,
            data_dir,
            db_pool,
        })
    }

    /// Close database connections so the WAL is checkpointed on exit.
    pub async fn shutdown(&self) {
        self.db_pool.close().await;
    }
}
