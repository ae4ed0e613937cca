//! Credit-based flow control between the syncer and its mirrors.
//!
//! The syncer broadcasts every batch to all live mirrors at once, so a
//! single slow mirror gates the whole round — `blocked` is true whenever
//! *any* live mirror has exhausted its credit.

use std::collections::HashMap;

use qsync_types::MirrorId;

/// Tracks per-mirror send credit for one sync round.
#[derive(Debug, Clone)]
pub struct CreditManager {
    credit: HashMap<MirrorId, u32>,
}

impl CreditManager {
    /// Creates a manager with `initial_credit` for each of `peers`.
    pub fn new(peers: impl IntoIterator<Item = MirrorId>, initial_credit: u32) -> Self {
        Self {
            credit: peers.into_iter().map(|p| (p, initial_credit)).collect(),
        }
    }

    /// True once any live mirror has no credit left to receive a batch.
    /// No batches are forwarded while this holds.
    #[must_use]
    pub fn blocked(&self) -> bool {
        self.credit.values().any(|&c| c == 0)
    }

    /// True once there are no live mirrors left to send to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credit.is_empty()
    }

    /// The mirrors currently tracked.
    pub fn peers(&self) -> impl Iterator<Item = MirrorId> + '_ {
        self.credit.keys().copied()
    }

    /// Charges one credit per live mirror for a batch the syncer is
    /// about to broadcast. Call only when [`blocked`](Self::blocked) is
    /// false.
    pub fn charge_broadcast(&mut self) {
        for credit in self.credit.values_mut() {
            *credit = credit.saturating_sub(1);
        }
    }

    /// Restores credit for `peer` after it acks an absorbed batch.
    pub fn handle_bump(&mut self, peer: MirrorId, amount: u32) {
        if let Some(credit) = self.credit.get_mut(&peer) {
            *credit = credit.saturating_add(amount);
        }
    }

    /// Drops a mirror from accounting, e.g. on a down-notification.
    pub fn peer_down(&mut self, peer: MirrorId) {
        self.credit.remove(&peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrors(ids: &[u64]) -> Vec<MirrorId> {
        ids.iter().copied().map(MirrorId::new).collect()
    }

    #[test]
    fn blocked_when_any_peer_exhausted() {
        let mut cm = CreditManager::new(mirrors(&[1, 2]), 1);
        assert!(!cm.blocked());
        cm.charge_broadcast();
        assert!(cm.blocked());
    }

    #[test]
    fn bump_restores_credit() {
        let mut cm = CreditManager::new(mirrors(&[1]), 1);
        cm.charge_broadcast();
        assert!(cm.blocked());
        cm.handle_bump(MirrorId::new(1), 1);
        assert!(!cm.blocked());
    }

    #[test]
    fn peer_down_removes_from_blocking_calculation() {
        let mut cm = CreditManager::new(mirrors(&[1, 2]), 1);
        cm.charge_broadcast();
        assert!(cm.blocked());
        cm.peer_down(MirrorId::new(1));
        assert!(cm.blocked());
        cm.peer_down(MirrorId::new(2));
        assert!(!cm.blocked());
        assert!(cm.is_empty());
    }
}
