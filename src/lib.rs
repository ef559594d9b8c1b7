// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod model;
pub mod priority;
pub mod rate_limit;
pub mod scheduler;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{AggregateError, AggregateRequest, Aggregator};
pub use crate::api::{router, AppState};
pub use crate::model::{NewsItem, NewsType, Priority, PriorityFilter, Source};
