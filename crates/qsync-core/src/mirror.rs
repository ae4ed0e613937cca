//! The mirror's side of one sync round.
//!
//! Invoked directly with a round token already agreed out of band (the
//! `sync_start` broadcast that triggers this call in a real deployment is
//! outside this crate's scope — see [`crate::membership::MembershipBus`]).
//! Monitors the syncer via the `oneshot` it is handed in
//! [`crate::protocol::MirrorEndpoint`]; the syncer monitors this task the
//! same way, via `mirror_alive` held for this function's whole lifetime.

use qsync_types::RoundToken;
use tokio::sync::{mpsc, watch};

use crate::backing_queue::{AdminHook, BackingQueue, SetRamDurationTarget};
use crate::batch::apply_batch;
use crate::error::{MirrorOutcome, MirrorState, SyncError};
use crate::protocol::{MirrorEndpoint, MirrorToSyncer, SyncerToMirror};

/// Every external input the mirror's sync loop selects over besides its
/// link to the syncer or `shutdown`.
pub struct MirrorAdminInputs<'a> {
    pub admin_rx: &'a mut mpsc::Receiver<AdminHook>,
    pub ram_duration_rx: &'a mut mpsc::Receiver<SetRamDurationTarget>,
    pub ram_tick_rx: &'a mut mpsc::Receiver<()>,
    pub terminate_rx: &'a mut mpsc::Receiver<String>,
}

/// Runs one mirror's participation in the sync round identified by
/// `round`. `bq` is consumed and handed back inside the returned
/// [`MirrorOutcome`] so the caller can keep operating the queue
/// afterward.
pub async fn run_mirror_round<Q: BackingQueue>(
    round: RoundToken,
    mut bq: Q,
    mut endpoint: MirrorEndpoint,
    admin: MirrorAdminInputs<'_>,
    refresh_ram_duration: &(dyn Fn() -> std::time::Duration + Send + Sync),
    shutdown: &mut watch::Receiver<bool>,
) -> MirrorOutcome<Q> {
    if bq.depth() == 0 {
        let _ = endpoint.to_syncer.send((endpoint.id, MirrorToSyncer::SyncDeny)).await;
        return MirrorOutcome::Denied;
    }

    if endpoint
        .to_syncer
        .send((endpoint.id, MirrorToSyncer::SyncReady))
        .await
        .is_err()
    {
        return MirrorOutcome::Failed(MirrorState::new(bq));
    }
    bq.purge();

    let mut state = MirrorState::new(bq);
    let MirrorAdminInputs {
        admin_rx,
        ram_duration_rx,
        ram_tick_rx,
        terminate_rx,
    } = admin;

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                return MirrorOutcome::Stop(shutdown_reason(changed), state);
            }
            reason = terminate_rx.recv() => {
                let reason = reason.unwrap_or_else(|| "master terminated out of band".to_string());
                state.backing_queue.delete_and_terminate(&reason);
                return MirrorOutcome::Stop(reason, state);
            }
            _ = &mut endpoint.syncer_down => {
                state.backing_queue.purge();
                return MirrorOutcome::Failed(state);
            }
            Some(hook) = admin_rx.recv() => {
                state.backing_queue.invoke(hook);
            }
            Some(SetRamDurationTarget(target)) = ram_duration_rx.recv() => {
                state.backing_queue.set_ram_duration_target(target);
            }
            Some(()) = ram_tick_rx.recv() => {
                state.ram_duration = refresh_ram_duration();
            }
            msg = endpoint.from_syncer.recv() => {
                match msg {
                    Some(SyncerToMirror::Batch(r, batch)) if r == round => {
                        let additions = apply_batch(&mut state.backing_queue, &batch);
                        state.ack_map.extend(additions);
                        if endpoint
                            .to_syncer
                            .send((endpoint.id, MirrorToSyncer::BumpCredit))
                            .await
                            .is_err()
                        {
                            return MirrorOutcome::Failed(state);
                        }
                    }
                    Some(SyncerToMirror::Complete(r)) if r == round => {
                        return MirrorOutcome::Ok(state);
                    }
                    Some(_) => {
                        // A batch or completion tagged with a stale round;
                        // ignore, the syncer for our round is still live.
                    }
                    None => {
                        tracing::warn!(%round, error = %SyncError::SyncerChannelClosed, "mirror lost its syncer link");
                        state.backing_queue.purge();
                        return MirrorOutcome::Failed(state);
                    }
                }
            }
        }
    }
}

fn shutdown_reason(changed: Result<(), watch::error::RecvError>) -> String {
    match changed {
        Ok(()) => "parent process exiting".to_string(),
        Err(_) => "shutdown channel closed".to_string(),
    }
}
