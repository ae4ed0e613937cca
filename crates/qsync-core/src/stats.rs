//! Observability hooks invoked from the master.

/// A progress snapshot: how many messages have been handed to the
/// syncer so far this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub syncing: usize,
}

/// The two stats hooks the master calls: `on_info` every batch,
/// `on_stats` at round start and whenever the progress interval has
/// elapsed. A log line accompanies every `on_stats` call regardless of
/// what the caller's override does.
pub trait SyncObserver: Send + Sync + 'static {
    fn on_info(&self, _stats: SyncStats) {}

    fn on_stats(&self, stats: SyncStats) {
        tracing::info!(syncing = stats.syncing, "mirror sync progress");
    }
}

/// An observer that only logs, useful for callers that don't need their
/// own stats plumbing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {}
