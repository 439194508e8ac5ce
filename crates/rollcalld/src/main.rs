use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod orchestrator;
mod providers;
mod registry;
#[cfg(test)]
mod testutil;

use config::Config;
use dbus_interface::RollcallService;
use orchestrator::{Orchestrator, PipelineSettings};
use providers::CommandProviderFactory;
use registry::ModelRegistry;
use rollcall_attendance::{EmbeddingCipher, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let cfg = Config::from_env();

    let cipher = EmbeddingCipher::from_key_file(&cfg.key_path)?;
    let store = SqliteStore::open(&cfg.db_path, cipher).await?;
    tracing::info!(path = %cfg.db_path.display(), "store opened");

    let mut registry = ModelRegistry::new();
    registry.register(Arc::new(CommandProviderFactory::new(
        &cfg.primary_model,
        &cfg.primary_command,
    )));
    if let (Some(model), Some(command)) = (&cfg.fallback_model, &cfg.fallback_command) {
        registry.register(Arc::new(CommandProviderFactory::new(model, command)));
    }
    let registry = Arc::new(registry);
    tracing::info!(models = ?registry.model_names(), "model registry built");

    let engine = engine::spawn_engine(registry.clone(), cfg.batch_workers)?;

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        engine,
        registry,
        PipelineSettings {
            similarity_threshold: cfg.similarity_threshold,
            antispoof: cfg.antispoof,
            spoof_check_on_fallback: cfg.spoof_check_on_fallback,
        },
    ));

    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Rollcall1")?
        .serve_at(
            "/org/rollcall/Rollcall1",
            RollcallService::new(orchestrator),
        )?
        .build()
        .await?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
