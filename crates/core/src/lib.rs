//! Core types and shared functionality for offgrid.
//!
//! This crate provides:
//! - Generation-partitioned cache store with SQLite backend
//! - Version manager deciding which generations are stale
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheStore, GenerationInfo, VersionManager, compute_cache_key};
pub use config::{AppConfig, ConfigError, DocumentStrategy};
pub use error::Error;
