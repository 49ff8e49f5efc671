//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Request/response values and cache keys
//! - The cache storage trait with memory and SQLite backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheStorage, MemoryStorage, RequestKey, SqliteStorage};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Request, Response};
