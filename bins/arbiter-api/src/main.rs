mod handlers;
mod metrics;
mod routes;

use arbiter_common::config::{env_or, Settings};
use arbiter_common::redis::RedisStore;
use arbiter_common::store::{JudgeQueue, RecordStore};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<dyn JudgeQueue>,
    pub max_queue_depth: usize,
    /// Bearer token unlocking system error details; `None` disables admin views
    pub admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arbiter API booting...");

    let settings = Settings::from_env();
    let bind_addr = env_or("BIND_ADDR", "0.0.0.0:3000");
    let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
    if admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, system error details are hidden from everyone");
    }

    metrics::register()?;

    // Connect to Redis
    let redis = Arc::new(RedisStore::connect(&settings.redis_url).await?);
    info!("Connected to Redis: {}", settings.redis_url);

    let state = Arc::new(AppState {
        store: redis.clone(),
        queue: redis,
        max_queue_depth: settings.max_queue_depth,
        admin_token,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(&bind_addr).await?;

    info!("HTTP server listening on {}", bind_addr);
    info!(max_queue_depth = settings.max_queue_depth, "Ready to accept submissions");

    axum::serve(listener, app).await?;
    Ok(())
}
