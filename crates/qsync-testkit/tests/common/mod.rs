use std::sync::Arc;

use qsync_core::{
    wire_mirror, AdminHook, CancelRequest, MirrorAdminInputs, MirrorOutcome, MirrorToSyncer,
    SetRamDurationTarget, SyncConfig, SyncOutcome, TracingObserver,
};
use qsync_core::master::run_master_round;
use qsync_core::mirror::run_mirror_round;
use qsync_testkit::{InMemoryBackingQueue, InMemoryMembershipBus};
use qsync_types::{MirrorId, RoundToken};
use tokio::sync::{mpsc, watch};

/// Runs one full round: spawns a mirror task per `mirror_bqs` entry and
/// drives `run_master_round` against `master_bq`, returning the master's
/// outcome alongside every mirror's outcome in input order.
pub async fn run_round(
    master_bq: &mut InMemoryBackingQueue,
    mirror_bqs: Vec<InMemoryBackingQueue>,
    config: SyncConfig,
) -> (SyncOutcome, Vec<MirrorOutcome<InMemoryBackingQueue>>) {
    let round = RoundToken::generate();
    let membership = Arc::new(InMemoryMembershipBus::new());
    let (to_syncer_tx, mirror_inbox) = mpsc::channel::<(MirrorId, MirrorToSyncer)>(64);

    let mut slots = Vec::new();
    let mut mirror_tasks = Vec::new();
    for (i, bq) in mirror_bqs.into_iter().enumerate() {
        let id = MirrorId::new(i as u64);
        let (slot, endpoint) = wire_mirror(id, to_syncer_tx.clone());
        slots.push(slot);

        mirror_tasks.push(tokio::spawn(async move {
            let (_admin_tx, mut admin_rx) = mpsc::channel::<AdminHook>(1);
            let (_ram_tx, mut ram_duration_rx) = mpsc::channel::<SetRamDurationTarget>(1);
            let (_tick_tx, mut ram_tick_rx) = mpsc::channel::<()>(1);
            let (_term_tx, mut terminate_rx) = mpsc::channel::<String>(1);
            let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
            run_mirror_round(
                round,
                bq,
                endpoint,
                MirrorAdminInputs {
                    admin_rx: &mut admin_rx,
                    ram_duration_rx: &mut ram_duration_rx,
                    ram_tick_rx: &mut ram_tick_rx,
                    terminate_rx: &mut terminate_rx,
                },
                &|| std::time::Duration::ZERO,
                &mut shutdown_rx,
            )
            .await
        }));
    }
    drop(to_syncer_tx);

    let (_cancel_tx, mut cancel_rx) = mpsc::channel::<CancelRequest>(1);
    let (_admin_tx, mut admin_rx) = mpsc::channel::<AdminHook>(4);
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let observer = TracingObserver;

    let outcome = run_master_round(
        round,
        master_bq,
        slots,
        mirror_inbox,
        membership,
        config,
        &observer,
        &mut cancel_rx,
        &mut admin_rx,
        &mut shutdown_rx,
    )
    .await;

    let mut mirror_outcomes = Vec::new();
    for task in mirror_tasks {
        mirror_outcomes.push(task.await.expect("mirror task panicked"));
    }

    (outcome, mirror_outcomes)
}
