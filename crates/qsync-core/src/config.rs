//! Tunables for one sync round.

use std::time::Duration;

/// Configuration for a single master sync round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Batch size `B` — the fold flushes at least this often.
    pub batch_size: usize,
    /// Minimum monotonic-time gap between progress-stats emissions.
    pub progress_interval: Duration,
    /// Initial per-mirror send credit handed to the syncer's
    /// [`crate::credit::CreditManager`] at round start.
    pub initial_credit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            progress_interval: Duration::from_secs(1),
            initial_credit: 2,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_initial_credit(mut self, credit: u32) -> Self {
        self.initial_credit = credit;
        self
    }
}
