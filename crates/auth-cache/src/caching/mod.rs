//! # In-memory caching infrastructure
//!
//! Authentication resolutions (principal names to object ids, tickets, permissions) are answered
//! by a remote metadata authority that is comparatively slow and must be shielded from redundant
//! lookups. This module contains the generic [`Cacher`] that does so, along with our central
//! [`CacheError`] type.
//!
//! ## Request Coalescing
//!
//! A [`Cacher`] keeps two tables: the memoized outcomes, and the currently running fetches. A
//! [`Cacher::get`] for a key that has no fresh outcome joins the running fetch for that key, or
//! starts one through the [`FetchFunction`] if there is none. At any instant there is at most one
//! running fetch per key, and all of its waiters observe the same outcome.
//!
//! The running fetches are partitioned into `shards` independently locked maps. The lock of a
//! key's shard is held for the "check the memoized outcome, then join or start a fetch" sequence,
//! as well as for the "memoize the outcome, then retire the fetch" sequence, which is what makes
//! both sequences atomic with respect to each other. Different keys only contend when they happen
//! to share a shard.
//!
//! Fetches are spawned as independent tasks. Dropping the future returned by `get` does not
//! cancel them, they complete and memoize their outcome for the next caller.
//!
//! ## Expiration
//!
//! Successful outcomes are served for `success_ttl`, [`CacheError::Upstream`] failures for
//! `error_ttl` (negative caching). All other errors, most notably [`CacheError::Timeout`], are
//! never memoized since they describe the state of the upstream rather than the key.
//!
//! Expiry is checked against the injected [`Clock`] on every access. Additionally, a background
//! task removes expired entries every `sweep_interval`, and when a `capacity` is configured, the
//! least recently used entries are evicted to stay below it.
//!
//! ## Metrics
//!
//! Each metric is tagged with a `cache` field that corresponds to the cache name:
//!
//! - `caches.access`: All accesses.
//! - `caches.memory.hit`: Accesses served from memory, tagged with a positive or negative `status`.
//! - `caches.memory.miss`: Accesses that started a fetch.
//! - `caches.memory.expired`: Accesses that found an expired entry.
//! - `caches.channel.hit`: Accesses that joined an already running fetch.
//! - `caches.fetch`: Completed fetches, tagged with their `status`.
//! - `caches.fetch.duration`: A timer for the duration of fetches.
//! - `caches.fetch.timeout`: Fetches that exceeded the `fetch_deadline`.
//! - `caches.sweep.removed`: Entries removed by the background sweep.
//! - `caches.memory.entries`: A gauge for the number of entries, updated by the sweep.
//!
//! The same numbers are counted in-process and available as [`CacheStats`].

mod cache_error;
mod cleanup;
mod clock;
mod memory;
mod stats;

pub use cache_error::{CacheContents, CacheError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{Cacher, FetchFunction};
pub use stats::CacheStats;
