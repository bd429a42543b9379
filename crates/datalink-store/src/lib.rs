//! Redis-backed [`CacheStore`](datalink_core::CacheStore) and
//! [`StatusStore`](datalink_core::StatusStore) for deployments running several workers.
//!
//! ```no_run
//! # async fn run() -> Result<(), datalink_store::StoreError> {
//! use datalink_core::QueryCache;
//! use datalink_store::{connect, RedisCacheStore};
//! use std::sync::Arc;
//!
//! let conn = connect("redis://127.0.0.1/").await?;
//! let cache = QueryCache::new(Arc::new(RedisCacheStore::new(conn)));
//! # Ok(())
//! # }
//! ```

mod cache;
mod connection;
mod error;
mod status;

pub use cache::RedisCacheStore;
pub use connection::{connect, DEFAULT_NAMESPACE};
pub use error::{Result, StoreError};
pub use status::RedisStatusStore;
