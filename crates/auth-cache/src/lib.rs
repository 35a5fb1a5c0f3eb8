//! Request-coalescing, expiry-aware caches that shield a remote metadata authority from
//! redundant lookups.
//!
//! The heart of this crate is the [`Cacher`](caching::Cacher), a read-through cache that collapses
//! concurrent requests for the same key into a single upstream fetch and memoizes both successful
//! and failed outcomes. The [`services`] module builds the authentication resolutions on top of it.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;
pub mod services;
pub mod types;
pub mod utils;
