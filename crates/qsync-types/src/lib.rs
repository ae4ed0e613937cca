//! Core identifiers for the mirror-queue synchronization protocol.
//!
//! This crate holds the small, `Copy` newtypes shared by the master,
//! syncer and mirror tasks in `qsync-core`:
//! - [`RoundToken`] — the correlator tagging one sync round end to end.
//! - [`MirrorId`] — addresses a mirror replica for routing and credit
//!   bookkeeping.
//! - [`MsgId`] — the backing queue's opaque message identifier.
//! - [`Priority`] — the discriminant used when zipping ack handles
//!   returned by a priority-queue-backed queue.
//! - [`AckTag`] — the backing queue's opaque handle for a pending,
//!   unacknowledged message.

use std::fmt::{self, Display};

/// A fresh, globally-unique token correlating every message of one sync
/// round.
///
/// A stale `RoundToken` (one that does not match the round currently in
/// progress) must cause the carrying message to be ignored — see the
/// mirror's sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundToken(u128);

impl RoundToken {
    /// Generates a new, effectively-unique round token.
    ///
    /// There is no `Default` impl: a round token must always be freshly
    /// minted, never reused across rounds.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }
}

impl Display for RoundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifies a candidate or confirmed mirror replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MirrorId(u64);

impl MirrorId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for MirrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mirror-{}", self.0)
    }
}

impl From<u64> for MirrorId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<MirrorId> for u64 {
    fn from(id: MirrorId) -> Self {
        id.0
    }
}

/// Opaque message identifier, as produced by the backing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgId(u64);

impl MsgId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MsgId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Delivery priority, the discriminant consumed by the priority-queue
/// ack-zipping path during batch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// All priorities, lowest first — used by the priority-queue
    /// partition helper to enumerate groups in a stable order.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Opaque ack handle returned by the backing queue's
/// `batch_publish_delivered` for one republished, ack-tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckTag(u64);

impl AckTag {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for AckTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ack-{}", self.0)
    }
}

impl From<u64> for AckTag {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_tokens_are_not_trivially_equal() {
        let a = RoundToken::generate();
        let b = RoundToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn mirror_id_roundtrips_through_u64() {
        let id = MirrorId::new(42);
        assert_eq!(u64::from(id), 42);
    }

    #[test]
    fn priority_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
