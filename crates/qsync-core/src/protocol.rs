//! Wire types and channel wiring for the three-party protocol.
//!
//! Selective receive becomes `tokio::select!` over a small set of typed
//! channels per actor; "linked" becomes "the parent holds the child's
//! `JoinHandle` and aborts it on early return"; "monitored" becomes a
//! `oneshot` whose sender the monitored task holds until it returns,
//! closing the paired receiver on exit.

use qsync_types::{MirrorId, RoundToken};
use tokio::sync::{mpsc, oneshot};

use crate::backing_queue::Record;

/// The mpsc buffer depth used for every protocol channel. Small on
/// purpose: at most one batch is ever in flight, so nothing here needs
/// deep queueing — a bound of 4 comfortably fits `{msgs}`/`{next}` plus
/// a pending `{done}`/cancel without blocking.
pub const CHANNEL_DEPTH: usize = 4;

/// Master → Syncer.
#[derive(Debug)]
pub enum MasterToSyncer {
    /// One batch from the fold, already in publish order.
    Msgs(RoundToken, Vec<Record>),
    /// The fold is exhausted; no more batches will follow.
    Done(RoundToken),
}

/// Syncer → Master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncerToMaster {
    /// At least one mirror opted in; the master may start folding.
    Ready,
    /// Send the next batch (or `Done`) now.
    Next(RoundToken),
}

/// Syncer → Mirror.
#[derive(Debug)]
pub enum SyncerToMirror {
    /// One batch to absorb.
    Batch(RoundToken, Vec<Record>),
    /// The round is over; no more batches will follow.
    Complete(RoundToken),
}

/// Mirror → Syncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorToSyncer {
    /// This mirror wants to sync (`DD > 0`).
    SyncReady,
    /// This mirror declares itself already caught up (`DD == 0`).
    SyncDeny,
    /// Credit returned after absorbing one batch.
    BumpCredit,
}

/// A synchronous cancel request from the control plane. `reply` is
/// fired only after the syncer has actually been stopped.
#[derive(Debug)]
pub struct CancelRequest {
    pub reply: oneshot::Sender<()>,
}

/// The syncer's view of one candidate mirror: a channel to reach it, and
/// a liveness receiver that resolves (by its sender being dropped) when
/// that mirror task ends.
pub struct SyncerMirrorSlot {
    pub id: MirrorId,
    pub to_mirror: mpsc::Sender<SyncerToMirror>,
    pub mirror_down: oneshot::Receiver<()>,
    /// Held for the lifetime of the syncer round; dropping it (when the
    /// syncer task returns) signals this mirror that the syncer is
    /// gone.
    pub syncer_alive: oneshot::Sender<()>,
}

/// A mirror's view of its link to the syncer.
pub struct MirrorEndpoint {
    pub id: MirrorId,
    pub to_syncer: mpsc::Sender<(MirrorId, MirrorToSyncer)>,
    pub from_syncer: mpsc::Receiver<SyncerToMirror>,
    pub syncer_down: oneshot::Receiver<()>,
    /// Held for the lifetime of the mirror round; dropping it signals
    /// the syncer that this mirror is gone.
    pub mirror_alive: oneshot::Sender<()>,
}

/// Builds one mirror's channel pair: the syncer-side slot and the
/// mirror-side endpoint. `to_syncer` is the shared, pre-cloned sender
/// into the syncer's single fan-in mailbox.
#[must_use]
pub fn wire_mirror(
    id: MirrorId,
    to_syncer: mpsc::Sender<(MirrorId, MirrorToSyncer)>,
) -> (SyncerMirrorSlot, MirrorEndpoint) {
    let (to_mirror_tx, from_syncer_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (mirror_alive_tx, mirror_down_rx) = oneshot::channel();
    let (syncer_alive_tx, syncer_down_rx) = oneshot::channel();
    (
        SyncerMirrorSlot {
            id,
            to_mirror: to_mirror_tx,
            mirror_down: mirror_down_rx,
            syncer_alive: syncer_alive_tx,
        },
        MirrorEndpoint {
            id,
            to_syncer,
            from_syncer: from_syncer_rx,
            syncer_down: syncer_down_rx,
            mirror_alive: mirror_alive_tx,
        },
    )
}

/// Channel handles the master needs to talk to a syncer it is about to
/// spawn.
pub struct MasterSyncerLink {
    pub to_syncer: mpsc::Sender<MasterToSyncer>,
    pub from_master: mpsc::Receiver<MasterToSyncer>,
    pub to_master: mpsc::Sender<SyncerToMaster>,
    pub from_syncer: mpsc::Receiver<SyncerToMaster>,
}

#[must_use]
pub fn wire_master_syncer() -> MasterSyncerLink {
    let (to_syncer, from_master) = mpsc::channel(CHANNEL_DEPTH);
    let (to_master, from_syncer) = mpsc::channel(CHANNEL_DEPTH);
    MasterSyncerLink {
        to_syncer,
        from_master,
        to_master,
        from_syncer,
    }
}
