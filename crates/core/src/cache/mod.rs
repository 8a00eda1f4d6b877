//! SQLite-backed, generation-partitioned response cache.
//!
//! This module provides persistent storage for intercepted responses using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named cache generations, each a wholly replaceable partition
//! - Keys derived from request method and absolute URL (SHA-256)
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::{GenerationInfo, VersionManager};
pub use hash::compute_cache_key;
pub use store::{CacheEntry, CacheStore};
