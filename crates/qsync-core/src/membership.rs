//! The membership bus.
//!
//! A single broadcast operation used to kick off a sync round such that
//! the `sync_start` announcement is ordered after every message the
//! syncer's owning node had already broadcast — guaranteeing a mirror's
//! pre-sync mailbox drains before the round begins.
//!
//! See `qsync-testkit::InMemoryMembershipBus` for the reference
//! implementation used by tests.

use qsync_types::RoundToken;

/// Capability to announce the start of a sync round to every node that
/// might be hosting a candidate mirror.
pub trait MembershipBus: Send + Sync + 'static {
    /// Broadcasts `sync_start(round)`. Must preserve FIFO ordering
    /// relative to any message previously broadcast by this caller.
    fn broadcast_sync_start(&self, round: RoundToken);
}
