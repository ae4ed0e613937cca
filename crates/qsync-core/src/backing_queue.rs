//! The backing-queue capability interface.
//!
//! `qsync-core` never talks to a concrete storage engine. Every master and
//! mirror is generic over a type implementing [`BackingQueue`]; the real
//! broker splices its own queue engine in at this seam, and
//! `qsync-testkit` provides an in-memory implementation for tests.

use qsync_types::{AckTag, MsgId, Priority};

/// An immutable message identifier and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub id: MsgId,
    pub payload: Vec<u8>,
}

/// Delivery metadata carried alongside a [`Msg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Props {
    /// Whether a publisher confirm is still owed for this message.
    pub needs_confirming: bool,
    /// Whether the backing queue should mark this message as already
    /// delivered to a consumer once republished.
    pub delivered: bool,
    pub priority: Priority,
}

impl Props {
    #[must_use]
    pub fn new(priority: Priority) -> Self {
        Self {
            needs_confirming: true,
            delivered: false,
            priority,
        }
    }
}

/// One message record as seen by the sync path: `(Msg, Props, Unacked)`.
///
/// `unacked == true` marks an ack-tracked message — one the master held
/// in the delivered-but-not-yet-acknowledged state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub msg: Msg,
    pub props: Props,
    pub unacked: bool,
}

/// A `(Msg, Props)` pair as handed to a backing-queue publish call, after
/// the batch-application rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishItem {
    pub msg: Msg,
    pub props: Props,
}

/// The ack-handle shape returned by [`BackingQueue::batch_publish_delivered`].
///
/// A flat queue and a priority queue return ack handles in different
/// shapes; rather than inspect the first element of an untyped sequence
/// to tell them apart, that discriminant is a tagged variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckHandles {
    /// A flat queue returned one handle per published record, in order.
    Flat(Vec<AckTag>),
    /// A priority queue returned handles grouped per priority.
    ByPriority(Vec<(Priority, Vec<AckTag>)>),
}

/// An administrative hook invoked out-of-band on both master and mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminHook {
    /// Drains a pending "set-maximum-since-use" cast, avoiding a
    /// priority inversion on the file-handle cache.
    SetMaximumSinceUse,
    /// Runs an arbitrary backing-queue hook.
    RunBackingQueue,
}

/// A mirror-only administrative cast carrying a parameter, handled
/// alongside [`AdminHook`] but threaded separately since it targets
/// [`BackingQueue::set_ram_duration_target`] rather than `invoke`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetRamDurationTarget(pub f64);

/// The capability interface a queue engine exposes to the sync protocol.
/// Implementors own their state directly — each master/mirror task owns
/// one exclusively, never shared across tasks.
pub trait BackingQueue: Send + 'static {
    /// Snapshot length, used as `len` by the master's fold phase.
    fn depth(&self) -> usize;

    /// An ordered snapshot of every record currently in the queue, the
    /// sequence the master's fold walks. Cheap to produce here because
    /// `qsync-core` treats the fold's *suspension points* (flush /
    /// wait-for-next) as owned by the master task, not by this call —
    /// see `master::run_master_round`.
    fn snapshot(&self) -> Vec<Record>;

    /// Purges both the ack-tracked and regular portions of the queue,
    /// returning the number of messages discarded.
    fn purge(&mut self) -> usize;

    /// Purges only the ack-tracked portion (used by the master after a
    /// completed round has folded ack-tracked messages into a mirror's
    /// ack-map — not on the sync path itself, but exposed for symmetry
    /// with the rest of the capability interface).
    fn purge_acks(&mut self);

    /// Republishes a run of regular (non-ack-tracked) messages.
    fn batch_publish(&mut self, batch: Vec<PublishItem>);

    /// Republishes a run of ack-tracked messages, returning the ack
    /// handles the backing queue assigned them.
    fn batch_publish_delivered(&mut self, batch: Vec<PublishItem>) -> AckHandles;

    /// Applies an administrative hook.
    fn invoke(&mut self, hook: AdminHook);

    /// Sets the ram-duration target used by the backing queue's own
    /// memory-management policy.
    fn set_ram_duration_target(&mut self, target_secs: f64);

    /// Deletes the queue's contents and releases any resources; called
    /// on out-of-band master termination.
    fn delete_and_terminate(&mut self, reason: &str);
}
