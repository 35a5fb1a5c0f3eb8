use std::time::Duration;

use thiserror::Error;

/// An error that happens when resolving a key through a [`Cacher`](super::Cacher).
///
/// Only [`Upstream`](Self::Upstream) errors describe the key itself and are memoized as negative
/// cache entries. All other variants describe the health of the upstream or of the cache and are
/// handed to the current waiters only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The fetch function failed, for example because the remote authority rejected the request.
    ///
    /// The attached string contains the upstream's reason.
    #[error("upstream request failed: {0}")]
    Upstream(String),
    /// The fetch did not complete within the configured deadline.
    #[error("fetch timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
    /// The fetch task went away before producing a result.
    #[error("fetch was cancelled")]
    Cancelled,
    /// An unexpected error in the cache itself.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    /// Whether this outcome may be stored as a negative cache entry.
    pub fn is_memoizable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// The value of the `status` tag used when emitting metrics for this error.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal",
        }
    }

    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

/// The outcome of a cache lookup, containing either `Ok(T)` or the reason why the key could not
/// be resolved.
pub type CacheContents<T = ()> = Result<T, CacheError>;
