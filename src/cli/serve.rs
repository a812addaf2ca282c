// src/cli/serve.rs — Wire store, provider and relay together and serve HTTP

use std::sync::Arc;

use crate::api::{self, ApiState};
use crate::core::{ChatPolicy, ChatRelay, GenerationSettings, GenerationWorker, SessionRegistry};
use crate::infra::config::Config;
use crate::memory::{self, spawn_store_server, ChatStore};
use crate::provider::openai_compat::OpenAICompatProvider;
use crate::provider::ModelProvider;

pub async fn run_serve(
    mut config: Config,
    port: Option<u16>,
    db: Option<String>,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db) = db {
        config.database.path = Some(db);
    }

    let db_path = config.database.resolved_path();
    let store = memory::open_store(&db_path)?;
    tracing::info!("Database: {}", db_path.display());
    let (store, _store_task) = spawn_store_server(store);

    let provider = OpenAICompatProvider::from_config(&config.provider)?;
    tracing::info!(
        "Provider: {} ({}), model {}",
        provider.id(),
        config.provider.base_url,
        config.provider.model
    );

    let relay = build_relay(&config, Arc::new(store), Arc::new(provider));
    api::start_server(&config.server, ApiState::new(Arc::new(relay))).await
}

/// One registry and one worker shared by every connection.
pub fn build_relay(
    config: &Config,
    store: Arc<dyn ChatStore>,
    provider: Arc<dyn ModelProvider>,
) -> ChatRelay {
    let registry = Arc::new(SessionRegistry::new());
    let worker = Arc::new(GenerationWorker::new(
        store.clone(),
        provider,
        registry,
        GenerationSettings::from_config(config),
    ));
    ChatRelay::new(
        store,
        worker,
        ChatPolicy::from_config(&config.chat),
        config.chat.poll_interval(),
    )
}
