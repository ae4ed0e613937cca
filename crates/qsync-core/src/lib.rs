//! The master/syncer/mirror synchronization protocol for mirrored
//! queues, generic over a pluggable backing queue and membership bus.
//!
//! See [`master::run_master_round`] and [`mirror::run_mirror_round`] for
//! the two entry points a surrounding queue process drives; `qsync-core`
//! never talks to a network or a disk directly — every I/O boundary is a
//! trait in [`backing_queue`] or [`membership`], or a channel endpoint in
//! [`protocol`].

pub mod backing_queue;
pub mod batch;
pub mod config;
pub mod credit;
pub mod error;
pub mod master;
pub mod membership;
pub mod mirror;
pub mod protocol;
pub mod stats;
pub mod syncer;

pub use backing_queue::{AckHandles, AdminHook, BackingQueue, Msg, Props, PublishItem, Record, SetRamDurationTarget};
pub use config::SyncConfig;
pub use credit::CreditManager;
pub use error::{MirrorOutcome, MirrorState, SyncError, SyncOutcome};
pub use membership::MembershipBus;
pub use mirror::MirrorAdminInputs;
pub use protocol::{
    wire_master_syncer, wire_mirror, CancelRequest, MasterSyncerLink, MasterToSyncer,
    MirrorEndpoint, MirrorToSyncer, SyncerMirrorSlot, SyncerToMaster, SyncerToMirror,
};
pub use stats::{SyncObserver, SyncStats, TracingObserver};
