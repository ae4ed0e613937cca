//! Error and outcome surface at the master/mirror ↔ caller boundary.

use std::time::Duration;

use qsync_types::{AckTag, MsgId};
use thiserror::Error;

/// Internal plumbing failures — a channel closing where the protocol
/// did not expect it, or similar. These never escape a round on their
/// own; they are folded into [`SyncOutcome::SyncDied`] /
/// [`MirrorOutcome::Stop`] at the boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("syncer channel closed unexpectedly")]
    SyncerChannelClosed,
    #[error("mirror channel closed unexpectedly")]
    MirrorChannelClosed,
    #[error("master channel closed unexpectedly")]
    MasterChannelClosed,
}

/// What one master sync round resolved to.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Every candidate mirror denied — no mirror needed syncing.
    AlreadySynced,
    /// The round completed; all surviving mirrors carry a fresh ack-map.
    Ok,
    /// The syncer crashed mid-round. Carries an opaque reason; the
    /// caller may retry with a freshly generated round token.
    SyncDied(String),
    /// The parent queue is shutting down. Not retried.
    Shutdown(String),
    /// An external cancel request won the race with the fold. Mirrors
    /// will observe the syncer disappearing and self-purge.
    Cancelled,
}

/// What one mirror's participation in a round resolved to. Generic over
/// the backing queue type so the mirror can hand its (possibly purged)
/// queue state back to the caller.
#[derive(Debug)]
pub enum MirrorOutcome<Q> {
    /// `depth(BQS) == 0` at entry — no sync was needed.
    Denied,
    /// The round completed; `ack_map` holds every `(msg_id, ack_tag)`
    /// pair for ack-tracked messages this mirror republished.
    Ok(MirrorState<Q>),
    /// The syncer went down; the backing queue has been purged and is
    /// ready for a future sync round.
    Failed(MirrorState<Q>),
    /// The mirror's parent process exited, or it was told to delete and
    /// terminate out of band. Carries whatever partial state remained.
    Stop(String, MirrorState<Q>),
}

/// The mirror-local state surviving a round: the ack-map, the last
/// ram-duration reading, and the backing queue itself.
#[derive(Debug)]
pub struct MirrorState<Q> {
    pub ack_map: Vec<(MsgId, AckTag)>,
    pub ram_duration: Duration,
    pub backing_queue: Q,
}

impl<Q> MirrorState<Q> {
    pub fn new(backing_queue: Q) -> Self {
        Self {
            ack_map: Vec::new(),
            ram_duration: Duration::ZERO,
            backing_queue,
        }
    }
}
