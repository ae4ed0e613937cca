//! The master's side of one sync round.
//!
//! The fold itself never suspends mid-record — `BackingQueue::snapshot`
//! hands the whole sequence over up front — but the *protocol* still
//! suspends between batches: after a flush, waiting for `{next}` |
//! cancel | parent exit | syncer exit. That wait is the only `.await`
//! point in the fold.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use qsync_types::{MirrorId, RoundToken};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backing_queue::{BackingQueue, Record};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncOutcome};
use crate::membership::MembershipBus;
use crate::protocol::{
    wire_master_syncer, CancelRequest, MasterToSyncer, MirrorToSyncer, SyncerMirrorSlot,
    SyncerToMaster,
};
use crate::stats::{SyncObserver, SyncStats};
use crate::syncer;

/// Runs one sync round to completion for `bq` against `candidates`.
///
/// `round` must be the same fresh [`RoundToken`] every candidate mirror
/// in this round was (or will be) invoked with — in a real deployment
/// the mirror learns it from the syncer's `sync_start` broadcast; callers
/// here mint it once and pass it to both sides.
///
/// `cancel_rx` and `admin_rx` are expected to outlive a single round —
/// the caller owns them for the lifetime of the queue and passes a
/// mutable borrow in here each time a round starts.
pub async fn run_master_round<Q: BackingQueue>(
    round: RoundToken,
    bq: &mut Q,
    candidates: Vec<SyncerMirrorSlot>,
    mirror_inbox: mpsc::Receiver<(MirrorId, MirrorToSyncer)>,
    membership: Arc<dyn MembershipBus>,
    config: SyncConfig,
    observer: &dyn SyncObserver,
    cancel_rx: &mut mpsc::Receiver<CancelRequest>,
    admin_rx: &mut mpsc::Receiver<crate::backing_queue::AdminHook>,
    shutdown: &mut watch::Receiver<bool>,
) -> SyncOutcome {
    let link = wire_master_syncer();
    let mut from_syncer = link.from_syncer;
    let to_syncer = link.to_syncer;

    let mut syncer_task: JoinHandle<()> = tokio::spawn(syncer::run_syncer_round(
        round,
        candidates,
        mirror_inbox,
        membership,
        config,
        link.from_master,
        link.to_master,
    ));

    tracing::info!(%round, "master round starting negotiation");

    tokio::select! {
        biased;
        changed = shutdown.changed() => {
            return finish_shutdown(changed, &mut syncer_task).await;
        }
        msg = from_syncer.recv() => {
            match msg {
                Some(SyncerToMaster::Ready) => {}
                Some(SyncerToMaster::Next(_)) | None => {
                    return finish_without_ready(&mut syncer_task).await;
                }
            }
        }
    }

    tracing::info!(%round, "master round folding backing queue");
    let snapshot = bq.snapshot();
    let len = snapshot.len();

    let mut acc: Vec<Record> = Vec::new();
    let mut curr = 0usize;
    let mut sent = 0usize;
    let mut last_stats = Instant::now();
    observer.on_stats(SyncStats { syncing: 0 });

    for record in snapshot {
        if let Some(last) = acc.last() {
            if last.unacked != record.unacked {
                let outcome = flush_batch(
                    round,
                    std::mem::take(&mut acc),
                    &to_syncer,
                    &mut from_syncer,
                    &mut syncer_task,
                    cancel_rx,
                    admin_rx,
                    bq,
                    observer,
                    &mut sent,
                    &mut last_stats,
                    &config,
                    shutdown,
                )
                .await;
                if let ControlFlow::Break(outcome) = outcome {
                    return outcome;
                }
            }
        }
        curr += 1;
        acc.push(record);
        if curr == len || curr % config.batch_size == 0 {
            let outcome = flush_batch(
                round,
                std::mem::take(&mut acc),
                &to_syncer,
                &mut from_syncer,
                &mut syncer_task,
                cancel_rx,
                admin_rx,
                bq,
                observer,
                &mut sent,
                &mut last_stats,
                &config,
                shutdown,
            )
            .await;
            if let ControlFlow::Break(outcome) = outcome {
                return outcome;
            }
        }
    }

    if !acc.is_empty() {
        let outcome = flush_batch(
            round,
            std::mem::take(&mut acc),
            &to_syncer,
            &mut from_syncer,
            &mut syncer_task,
            cancel_rx,
            admin_rx,
            bq,
            observer,
            &mut sent,
            &mut last_stats,
            &config,
            shutdown,
        )
        .await;
        if let ControlFlow::Break(outcome) = outcome {
            return outcome;
        }
    }

    // The fold is exhausted. One final next/done exchange closes the
    // round, even if nothing was ever sent.
    tokio::select! {
        biased;
        changed = shutdown.changed() => {
            return finish_shutdown(changed, &mut syncer_task).await;
        }
        msg = from_syncer.recv() => {
            match msg {
                Some(SyncerToMaster::Next(r)) if r == round => {}
                _ => return SyncOutcome::SyncDied(SyncError::SyncerChannelClosed.to_string()),
            }
        }
        Some(cancel) = cancel_rx.recv() => {
            syncer_task.abort();
            let _ = cancel.reply.send(());
            return SyncOutcome::Cancelled;
        }
        res = &mut syncer_task => {
            return SyncOutcome::SyncDied(join_reason(res));
        }
    }

    if to_syncer.send(MasterToSyncer::Done(round)).await.is_err() {
        return SyncOutcome::SyncDied(SyncError::SyncerChannelClosed.to_string());
    }

    match syncer_task.await {
        Ok(()) => {
            tracing::info!(%round, sent, "master round complete");
            SyncOutcome::Ok
        }
        Err(e) => SyncOutcome::SyncDied(e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn flush_batch<Q: BackingQueue>(
    round: RoundToken,
    batch: Vec<Record>,
    to_syncer: &mpsc::Sender<MasterToSyncer>,
    from_syncer: &mut mpsc::Receiver<SyncerToMaster>,
    syncer_task: &mut JoinHandle<()>,
    cancel_rx: &mut mpsc::Receiver<CancelRequest>,
    admin_rx: &mut mpsc::Receiver<crate::backing_queue::AdminHook>,
    bq: &mut Q,
    observer: &dyn SyncObserver,
    sent: &mut usize,
    last_stats: &mut Instant,
    config: &SyncConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> ControlFlow<SyncOutcome, ()> {
    *sent += batch.len();
    observer.on_info(SyncStats { syncing: *sent });
    if last_stats.elapsed() >= config.progress_interval {
        observer.on_stats(SyncStats { syncing: *sent });
        *last_stats = Instant::now();
    }

    while let Ok(hook) = admin_rx.try_recv() {
        bq.invoke(hook);
    }

    if to_syncer.send(MasterToSyncer::Msgs(round, batch)).await.is_err() {
        return ControlFlow::Break(SyncOutcome::SyncDied(SyncError::SyncerChannelClosed.to_string()));
    }

    tokio::select! {
        biased;
        changed = shutdown.changed() => {
            return ControlFlow::Break(finish_shutdown(changed, syncer_task).await);
        }
        msg = from_syncer.recv() => {
            match msg {
                Some(SyncerToMaster::Next(r)) if r == round => ControlFlow::Continue(()),
                Some(_) | None => ControlFlow::Break(SyncOutcome::SyncDied(
                    "syncer sent an unexpected message or closed its channel".into(),
                )),
            }
        }
        Some(cancel) = cancel_rx.recv() => {
            syncer_task.abort();
            let _ = cancel.reply.send(());
            ControlFlow::Break(SyncOutcome::Cancelled)
        }
        res = &mut *syncer_task => {
            ControlFlow::Break(SyncOutcome::SyncDied(join_reason(res)))
        }
    }
}

async fn finish_without_ready(syncer_task: &mut JoinHandle<()>) -> SyncOutcome {
    match syncer_task.await {
        Ok(()) => SyncOutcome::AlreadySynced,
        Err(e) => SyncOutcome::SyncDied(e.to_string()),
    }
}

async fn finish_shutdown(
    changed: Result<(), watch::error::RecvError>,
    syncer_task: &mut JoinHandle<()>,
) -> SyncOutcome {
    syncer_task.abort();
    match changed {
        Ok(()) => SyncOutcome::Shutdown("parent queue shutting down".into()),
        Err(_) => SyncOutcome::SyncDied("shutdown channel closed".into()),
    }
}

fn join_reason(res: Result<(), tokio::task::JoinError>) -> String {
    match res {
        Ok(()) => "syncer exited before completing round".to_string(),
        Err(e) => e.to_string(),
    }
}
