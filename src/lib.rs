// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod ai_adapter;
pub mod api;
pub mod config;
pub mod engine;
pub mod experiment;
pub mod fallback;
pub mod gates;
pub mod language;
pub mod metrics;
pub mod model;
pub mod prompt;
pub mod ratelimit;
pub mod safety;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::engine::{ReplyEngine, ReplyOutcome, ReplyRequest};
pub use crate::gates::SkipReason;
pub use crate::store::{DynStore, MemoryStore, Store};
