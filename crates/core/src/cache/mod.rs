//! Cache storage for response generations.
//!
//! Storage is an injected service behind the [`CacheStorage`] trait so the
//! router never touches a hidden global. Two backends are provided:
//!
//! - [`MemoryStorage`] keeps everything in process memory
//! - [`SqliteStorage`] persists generations with tokio-rusqlite, WAL mode
//!   and versioned migrations

pub mod connection;
pub mod generations;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod storage;

pub use crate::Error;

pub use connection::SqliteStorage;
pub use hash::RequestKey;
pub use memory::MemoryStorage;
pub use storage::CacheStorage;
