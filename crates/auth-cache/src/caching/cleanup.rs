use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// A cache whose expired entries can be removed in bulk.
pub(super) trait Sweep: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Removes all entries that are expired right now, returning how many were removed.
    fn sweep_expired(&self) -> usize;
}

/// Periodically sweeps the given cache until it is dropped.
///
/// Only a weak reference is held, so the sweeper never keeps a cache alive. Without a tokio
/// runtime no sweeper is started and expired entries are only dropped on access.
pub(super) fn spawn_sweeper<T: Sweep>(cache: Weak<T>, interval: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No tokio runtime available, expired entries are only removed on access");
        return;
    };

    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(cache) = cache.upgrade() else {
                break;
            };
            let removed = cache.sweep_expired();
            tracing::trace!(cache = cache.name(), removed, "Swept expired cache entries");
        }
    });
}
