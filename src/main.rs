//! Amora Reply Engine — Binary Entrypoint
//! Boots the Axum HTTP server: engine config, store and AI client wiring,
//! the durable fallback worker, and the `/reply` + `/metrics` routes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use amora_reply_engine::ai_adapter::build_completion_client;
use amora_reply_engine::api::{create_router, AppState};
use amora_reply_engine::config::EngineConfig;
use amora_reply_engine::engine::ReplyEngine;
use amora_reply_engine::language::AggressionDetector;
use amora_reply_engine::metrics::Metrics;
use amora_reply_engine::ratelimit::RateLimiter;
use amora_reply_engine::scheduler::spawn_fallback_worker;
use amora_reply_engine::store::{DynStore, MemoryStore};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - REPLY_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("REPLY_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reply=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let config = Arc::new(EngineConfig::from_env());

    // In-memory backend for local runs and previews; production deployments
    // swap in the hosted-backend Store implementation at this seam.
    let store: DynStore = Arc::new(MemoryStore::new());
    let ai = build_completion_client(&config.model);

    let metrics = Metrics::init(config.scheduler_interval_secs);

    // Durable fallback worker: drains due jobs with fire-time re-validation.
    let aggression = Arc::new(AggressionDetector::new(&config.aggression.words));
    spawn_fallback_worker(
        Arc::clone(&store),
        aggression,
        config.scheduler_interval_secs,
    );

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let engine = Arc::new(ReplyEngine::new(store, ai, Arc::clone(&config)));

    let router = create_router(AppState { engine, limiter }).merge(metrics.router());

    Ok(router.into())
}
