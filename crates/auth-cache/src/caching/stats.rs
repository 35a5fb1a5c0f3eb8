use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of the counters of a [`Cacher`](super::Cacher).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// All calls to `get`.
    pub accesses: u64,
    /// Accesses served from a memoized success.
    pub hits: u64,
    /// Accesses served from a memoized failure.
    pub negative_hits: u64,
    /// Accesses that started a new upstream fetch.
    pub misses: u64,
    /// Accesses that joined an already running fetch.
    pub coalesced: u64,
    /// Upstream fetches started.
    pub fetches: u64,
    /// Fetches that completed with any error, timeouts included.
    pub fetch_errors: u64,
    /// Fetches that exceeded their deadline.
    pub timeouts: u64,
    /// Entries found expired on access.
    pub expired: u64,
    /// Entries removed by the expiry sweep.
    pub swept: u64,
}

impl CacheStats {
    /// The share of accesses that did not start a fetch.
    pub fn hit_ratio(&self) -> f64 {
        if self.accesses == 0 {
            return 0.0;
        }
        // The counters are loaded independently, so `misses` may be ahead of `accesses`.
        let served = self.accesses.saturating_sub(self.misses);
        served as f64 / self.accesses as f64
    }
}

#[derive(Debug, Default)]
pub(super) struct CacheCounters {
    pub accesses: AtomicU64,
    pub hits: AtomicU64,
    pub negative_hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub fetches: AtomicU64,
    pub fetch_errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub expired: AtomicU64,
    pub swept: AtomicU64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            accesses: load(&self.accesses),
            hits: load(&self.hits),
            negative_hits: load(&self.negative_hits),
            misses: load(&self.misses),
            coalesced: load(&self.coalesced),
            fetches: load(&self.fetches),
            fetch_errors: load(&self.fetch_errors),
            timeouts: load(&self.timeouts),
            expired: load(&self.expired),
            swept: load(&self.swept),
        }
    }
}

/// Increments one of the [`CacheCounters`].
pub(super) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
