//! The syncer's side of one sync round.
//!
//! Spawned by the master, linked to it (the master holds this task's
//! `JoinHandle` and aborts it on cancel), and monitoring every candidate
//! mirror individually via the `oneshot` liveness receiver bundled into
//! its [`SyncerMirrorSlot`].

use std::collections::HashMap;
use std::sync::Arc;

use qsync_types::{MirrorId, RoundToken};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::SyncConfig;
use crate::credit::CreditManager;
use crate::error::SyncError;
use crate::membership::MembershipBus;
use crate::protocol::{
    MasterToSyncer, MirrorToSyncer, SyncerMirrorSlot, SyncerToMaster, SyncerToMirror,
};

/// Negotiates with every candidate, then relays batches from the master
/// to every mirror that opted in until the master signals `Done` or this
/// task is aborted by its parent.
pub async fn run_syncer_round(
    round: RoundToken,
    candidates: Vec<SyncerMirrorSlot>,
    mut mirror_inbox: mpsc::Receiver<(MirrorId, MirrorToSyncer)>,
    membership: Arc<dyn MembershipBus>,
    config: SyncConfig,
    mut from_master: mpsc::Receiver<MasterToSyncer>,
    to_master: mpsc::Sender<SyncerToMaster>,
) {
    membership.broadcast_sync_start(round);

    let mut slots: HashMap<MirrorId, SyncerMirrorSlot> = candidates.into_iter().map(|c| (c.id, c)).collect();
    let mut pending: Vec<MirrorId> = slots.keys().copied().collect();

    // Built before negotiation, not after, so a candidate that crashes
    // before declaring ready or deny is still observed — otherwise the
    // only way to notice it would be another message landing on
    // `mirror_inbox`, which may never happen if it was the last pending
    // candidate.
    let mut liveness: JoinSet<MirrorId> = JoinSet::new();
    for (id, slot) in &mut slots {
        let down_rx = std::mem::replace(&mut slot.mirror_down, tokio::sync::oneshot::channel().1);
        let id = *id;
        liveness.spawn(async move {
            let _ = down_rx.await;
            id
        });
    }

    while !pending.is_empty() {
        tokio::select! {
            biased;
            Some(Ok(down)) = liveness.join_next() => {
                pending.retain(|p| *p != down);
                slots.remove(&down);
            }
            msg = mirror_inbox.recv() => {
                match msg {
                    Some((id, MirrorToSyncer::SyncReady)) => {
                        pending.retain(|p| *p != id);
                    }
                    Some((id, MirrorToSyncer::SyncDeny)) => {
                        pending.retain(|p| *p != id);
                        slots.remove(&id);
                    }
                    Some((_, MirrorToSyncer::BumpCredit)) => {
                        // Only meaningful post-negotiation; a mirror that sends
                        // this before declaring ready violates its own protocol
                        // and is simply ignored rather than torn down.
                    }
                    None => {
                        tracing::warn!(%round, "mirror inbox closed during negotiation");
                        return;
                    }
                }
            }
        }
    }

    if slots.is_empty() {
        tracing::info!(%round, "every candidate mirror denied; syncer exiting before ready");
        return;
    }

    let mut credit = CreditManager::new(slots.keys().copied(), config.initial_credit);

    if to_master.send(SyncerToMaster::Ready).await.is_err() {
        tracing::warn!(%round, error = %SyncError::MasterChannelClosed, "closed right after negotiation");
        return;
    }

    relay_loop(
        round,
        &mut slots,
        &mut credit,
        &mut liveness,
        &mut from_master,
        &to_master,
        &mut mirror_inbox,
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn relay_loop(
    round: RoundToken,
    slots: &mut HashMap<MirrorId, SyncerMirrorSlot>,
    credit: &mut CreditManager,
    liveness: &mut JoinSet<MirrorId>,
    from_master: &mut mpsc::Receiver<MasterToSyncer>,
    to_master: &mpsc::Sender<SyncerToMaster>,
    mirror_inbox: &mut mpsc::Receiver<(MirrorId, MirrorToSyncer)>,
) {
    loop {
        if credit.is_empty() {
            tracing::info!(%round, "every mirror went down; syncer exiting");
            return;
        }

        if to_master.send(SyncerToMaster::Next(round)).await.is_err() {
            tracing::warn!(%round, "master channel closed requesting next");
            return;
        }

        tokio::select! {
            biased;
            Some(Ok(down)) = liveness.join_next() => {
                credit.peer_down(down);
                slots.remove(&down);
            }
            msg = from_master.recv() => {
                match msg {
                    Some(MasterToSyncer::Msgs(r, batch)) if r == round => {
                        if !drain_credit_bumps(mirror_inbox, credit) {
                            return;
                        }
                        if !wait_for_credit(credit, liveness, slots, mirror_inbox).await {
                            return;
                        }
                        credit.charge_broadcast();
                        for slot in slots.values() {
                            if slot.to_mirror.send(SyncerToMirror::Batch(round, batch.clone())).await.is_err() {
                                tracing::debug!(mirror = %slot.id, "mirror channel closed mid-broadcast");
                            }
                        }
                    }
                    Some(MasterToSyncer::Done(r)) if r == round => {
                        for slot in slots.values() {
                            let _ = slot.to_mirror.send(SyncerToMirror::Complete(round)).await;
                        }
                        return;
                    }
                    Some(_) | None => {
                        tracing::warn!(%round, "master channel closed or sent a stale round");
                        return;
                    }
                }
            }
        }
    }
}

/// Blocks the relay loop while credit is exhausted, returning `false` if
/// every mirror died before credit was restored.
async fn wait_for_credit(
    credit: &mut CreditManager,
    liveness: &mut JoinSet<MirrorId>,
    slots: &mut HashMap<MirrorId, SyncerMirrorSlot>,
    mirror_inbox: &mut mpsc::Receiver<(MirrorId, MirrorToSyncer)>,
) -> bool {
    while credit.blocked() {
        tokio::select! {
            Some(Ok(down)) = liveness.join_next() => {
                credit.peer_down(down);
                slots.remove(&down);
            }
            msg = mirror_inbox.recv() => match msg {
                Some((id, MirrorToSyncer::BumpCredit)) => credit.handle_bump(id, 1),
                Some(_) => {}
                None => return false,
            }
        }
        if credit.is_empty() {
            return false;
        }
    }
    true
}

/// Drains any `bump_credit` casts that arrived out of turn so they don't
/// starve behind the next batch. Returns `false` if the mailbox closed.
fn drain_credit_bumps(
    mirror_inbox: &mut mpsc::Receiver<(MirrorId, MirrorToSyncer)>,
    credit: &mut CreditManager,
) -> bool {
    loop {
        match mirror_inbox.try_recv() {
            Ok((id, MirrorToSyncer::BumpCredit)) => credit.handle_bump(id, 1),
            Ok((_, MirrorToSyncer::SyncReady | MirrorToSyncer::SyncDeny)) => {}
            Err(mpsc::error::TryRecvError::Empty) => return true,
            Err(mpsc::error::TryRecvError::Disconnected) => return false,
        }
    }
}
