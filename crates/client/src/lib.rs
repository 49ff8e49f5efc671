//! Client code for offcache.
//!
//! This crate provides the network seam the router fetches through: the
//! [`Network`] trait, a reqwest-backed implementation and a scripted one.

pub mod fetch;

pub use fetch::{FetchConfig, FixtureNetwork, HttpNetwork, Network, UrlError, resolve};
