//! Cache inspection tools.
//!
//! These read a generation directly from storage, bypassing the worker.

pub mod get;
pub mod keys;

pub use get::{CacheGetParams, get_impl};
pub use keys::{CacheKeysParams, keys_impl};
