//! mediafeed library
//!
//! Cached, rate-limit aware aggregation of a user's media posts from a primary
//! provider with a secondary fallback. [`engine::AggregationEngine`] is the
//! entry point; the other modules are exposed for integration tests and for
//! building engines with custom providers.

pub mod backup;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod engine;
pub mod fallback;
pub mod http;
pub mod normalize;
pub mod providers;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use data::{FetchResult, MediaItem, MediaKind, MediaPost};
pub use engine::{AggregationEngine, EngineError, FetchReport, ServedFrom};
