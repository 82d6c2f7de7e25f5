//! 缓存模块：带 TTL 的内存缓存，可选磁盘持久层。
//!
//! # Response Caching Module
//!
//! Read-through storage for remote responses, keyed by resource type and
//! identifiers.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheStore`] | In-memory TTL store with statistics and capacity eviction |
//! | [`CacheConfig`] | Enablement, lifetimes, capacity and persistence settings |
//! | [`CacheKey`] | Deterministic `<type>:<id>...` key builder |
//! | [`ResourceType`] | Closed set of resource categories with default lifetimes |
//! | [`PersistentTier`] | Trait for a restart-surviving second tier |
//! | [`FileTier`] | One-JSON-file-per-key persistent tier |
//!
//! ## Example
//!
//! ```rust
//! use resilient_fetch::cache::{CacheConfig, CacheKey, CacheStore, ResourceType};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = CacheStore::new(CacheConfig::default());
//! let key = CacheKey::new(ResourceType::Page).push("p1");
//! cache.set(&key, &serde_json::json!({"id": "p1"}), None);
//! let page: Option<serde_json::Value> = cache.get(&key).await;
//! assert!(page.is_some());
//! # }
//! ```
//!
//! ## Lifetimes
//!
//! | Type | Default TTL |
//! |------|-------------|
//! | `page` | 5 min |
//! | `database`, `data_source` | 10 min |
//! | `block` | 2 min |
//! | `user` | 1 h |
//! | `comment` | 1 min |
//! | `search` | 30 s |

mod backend;
mod key;
mod manager;

pub use backend::{FileTier, PersistedEntry, PersistentTier};
pub use key::{CacheKey, ResourceType};
pub use manager::{CacheConfig, CacheStats, CacheStore, PersistentConfig};
