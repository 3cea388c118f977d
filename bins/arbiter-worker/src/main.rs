mod config;
mod engine;
#[cfg(test)]
mod engine_tests;
mod evaluator;
mod executor;
mod pool;
mod runner;
mod toolchain;

use arbiter_common::fixtures::FixtureStore;
use arbiter_common::redis::RedisStore;
use config::WorkerSettings;
use engine::{EngineSettings, JudgeEngine};
use executor::Executor;
use pool::WorkerPool;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use toolchain::ToolchainRegistry;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Arbiter worker booting...");

    let settings = WorkerSettings::from_env();

    // Load language configurations
    let toolchains = ToolchainRegistry::load_or_builtin(&settings.languages_config).map_err(|e| {
        error!("Failed to load language configurations: {:#}", e);
        e
    })?;
    info!(languages = ?toolchains.list_languages(), "Toolchains loaded");

    let fixtures = FixtureStore::new(&settings.common.fixture_root);
    info!(root = %fixtures.root().display(), "Fixture store ready");

    // Connect to Redis
    let store = Arc::new(RedisStore::connect(&settings.common.redis_url).await?);
    info!("Connected to Redis: {}", settings.common.redis_url);

    let engine = JudgeEngine::new(
        Arc::new(toolchains),
        Arc::new(fixtures),
        EngineSettings {
            compile_timeout_ms: settings.compile_timeout_ms,
            work_root: settings.work_dir.clone(),
        },
    );
    let executor = Arc::new(Executor::new(store.clone(), Arc::new(engine)));
    let pool = WorkerPool::new(executor, store, settings.concurrency);

    // Setup graceful shutdown
    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received shutdown signal, finishing in-flight submissions...");
                let _ = stop.send(true);
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    pool.run(shutdown).await;

    info!("Worker shutdown complete");
    Ok(())
}
