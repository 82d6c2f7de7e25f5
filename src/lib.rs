//! # resilient-fetch
//!
//! 面向不可靠远程服务的弹性访问层：请求去重、TTL 缓存、指数退避重试与熔断。
//!
//! Resilient remote-access layer: wraps any remote call with request
//! deduplication, a TTL cache (in memory, optionally backed by disk),
//! exponential-backoff retry and a per-resource circuit breaker.
//!
//! ## Overview
//!
//! For a given resource type and cache key, [`ResilientFetch`] orders work as:
//!
//! 1. cache read-through
//! 2. circuit breaker of the resource type
//! 3. deduplication of concurrent identical requests
//! 4. retry with backoff, jitter and server retry hints
//! 5. the remote operation itself
//! 6. cache write-through
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_fetch::cache::{CacheKey, ResourceType};
//! use resilient_fetch::{ResilientFetch, ResilientFetchBuilder};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> resilient_fetch::Result<()> {
//!     let fetch: ResilientFetch = ResilientFetchBuilder::new().build()?;
//!
//!     let key = CacheKey::new(ResourceType::Page).push("p1");
//!     let page: Value = fetch
//!         .fetch(&key, || async { Ok(json!({"id": "p1"})) })
//!         .await?;
//!     println!("{}", page);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ResilientFetch`] composition root and its builder |
//! | [`cache`] | TTL store, cache keys, resource types, persistent tier |
//! | [`dedup`] | In-flight request deduplication |
//! | [`resilience`] | Retry executor and circuit breaker |
//! | [`batch`] | Windowed batch execution with retry |
//! | [`config`] | Configuration from YAML, environment and defaults |
//! | [`telemetry`] | Structured diagnostic events and `tracing` setup |
//! | [`transport`] | Transport errors and the optional HTTP adapter |
//! | [`error_code`] | Canonical remote error codes |

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error_code;
pub mod resilience;
pub mod telemetry;
pub mod transport;

pub(crate) mod utils;

// Re-export main types for convenience
pub use cache::{CacheKey, ResourceType};
pub use client::{ResilientFetch, ResilientFetchBuilder, SignalsSnapshot};
pub use config::FetchConfig;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
