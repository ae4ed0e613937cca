//! In-memory [`BackingQueue`] and [`MembershipBus`] implementations for
//! exercising `qsync-core` without a real broker behind it.

use std::collections::VecDeque;

use qsync_core::{AckHandles, AdminHook, BackingQueue, MembershipBus, PublishItem, Record, SetRamDurationTarget};
use qsync_types::{AckTag, Priority, RoundToken};
use tokio::sync::broadcast;

/// An in-memory backing queue. Optionally simulates a priority-queue
/// backend (grouped ack handles) rather than a flat one, to exercise
/// both ack-handle shapes.
pub struct InMemoryBackingQueue {
    records: VecDeque<Record>,
    next_ack_tag: u64,
    priority_queue: bool,
    ram_duration_target: Option<f64>,
    admin_log: Vec<AdminHook>,
    terminated: Option<String>,
}

impl InMemoryBackingQueue {
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
            next_ack_tag: 0,
            priority_queue: false,
            ram_duration_target: None,
            admin_log: Vec::new(),
            terminated: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Makes `batch_publish_delivered` return [`AckHandles::ByPriority`]
    /// instead of a flat sequence, simulating a priority-queue-backed
    /// engine.
    #[must_use]
    pub fn with_priority_queue(mut self) -> Self {
        self.priority_queue = true;
        self
    }

    #[must_use]
    pub fn admin_log(&self) -> &[AdminHook] {
        &self.admin_log
    }

    #[must_use]
    pub fn ram_duration_target(&self) -> Option<f64> {
        self.ram_duration_target
    }

    #[must_use]
    pub fn terminated_reason(&self) -> Option<&str> {
        self.terminated.as_deref()
    }

    fn take_ack_tag(&mut self) -> AckTag {
        let tag = AckTag::new(self.next_ack_tag);
        self.next_ack_tag += 1;
        tag
    }
}

impl BackingQueue for InMemoryBackingQueue {
    fn depth(&self) -> usize {
        self.records.len()
    }

    fn snapshot(&self) -> Vec<Record> {
        self.records.iter().cloned().collect()
    }

    fn purge(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        tracing::debug!(count, "in-memory backing queue purged");
        count
    }

    fn purge_acks(&mut self) {
        self.records.retain(|r| !r.unacked);
    }

    fn batch_publish(&mut self, batch: Vec<PublishItem>) {
        for item in batch {
            self.records.push_back(Record {
                msg: item.msg,
                props: item.props,
                unacked: false,
            });
        }
    }

    fn batch_publish_delivered(&mut self, batch: Vec<PublishItem>) -> AckHandles {
        if self.priority_queue {
            let mut groups: Vec<(Priority, Vec<AckTag>)> = Vec::new();
            for item in &batch {
                let tag = self.take_ack_tag();
                match groups.iter_mut().find(|(p, _)| *p == item.props.priority) {
                    Some((_, tags)) => tags.push(tag),
                    None => groups.push((item.props.priority, vec![tag])),
                }
            }
            for item in batch {
                self.records.push_back(Record {
                    msg: item.msg,
                    props: item.props,
                    unacked: true,
                });
            }
            AckHandles::ByPriority(groups)
        } else {
            let mut tags = Vec::with_capacity(batch.len());
            for item in batch {
                tags.push(self.take_ack_tag());
                self.records.push_back(Record {
                    msg: item.msg,
                    props: item.props,
                    unacked: true,
                });
            }
            AckHandles::Flat(tags)
        }
    }

    fn invoke(&mut self, hook: AdminHook) {
        self.admin_log.push(hook);
    }

    fn set_ram_duration_target(&mut self, target_secs: f64) {
        self.ram_duration_target = Some(target_secs);
    }

    fn delete_and_terminate(&mut self, reason: &str) {
        tracing::warn!(reason, "in-memory backing queue deleted and terminated");
        self.records.clear();
        self.terminated = Some(reason.to_string());
    }
}

/// Extension point used by tests that need to call
/// [`BackingQueue::set_ram_duration_target`] through the mirror-only
/// [`SetRamDurationTarget`] cast rather than directly.
pub fn apply_ram_duration_target(bq: &mut InMemoryBackingQueue, cast: SetRamDurationTarget) {
    bq.set_ram_duration_target(cast.0);
}

/// An in-memory membership bus backed by `tokio::sync::broadcast`.
/// Subscribers call [`subscribe`](Self::subscribe) to observe every
/// `sync_start` announcement; production code only needs this for
/// ordering fidelity, but tests use it to assert a round actually
/// announced itself.
pub struct InMemoryMembershipBus {
    sender: broadcast::Sender<RoundToken>,
}

impl Default for InMemoryMembershipBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }
}

impl InMemoryMembershipBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoundToken> {
        self.sender.subscribe()
    }
}

impl MembershipBus for InMemoryMembershipBus {
    fn broadcast_sync_start(&self, round: RoundToken) {
        // No receivers is a normal state (no subscribers care yet); the
        // guarantee this bus exists to provide is ordering, not delivery.
        let _ = self.sender.send(round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsync_core::{Msg, Props};
    use qsync_types::MsgId;

    fn record(id: u64, unacked: bool) -> Record {
        Record {
            msg: Msg { id: MsgId::new(id), payload: vec![] },
            props: Props::new(Priority::Normal),
            unacked,
        }
    }

    #[test]
    fn purge_clears_and_reports_count() {
        let mut bq = InMemoryBackingQueue::new(vec![record(1, false), record(2, false)]);
        assert_eq!(bq.purge(), 2);
        assert_eq!(bq.depth(), 0);
    }

    #[test]
    fn flat_backing_queue_returns_one_handle_per_message() {
        let mut bq = InMemoryBackingQueue::empty();
        let items = vec![
            PublishItem { msg: Msg { id: MsgId::new(1), payload: vec![] }, props: Props::new(Priority::Normal) },
        ];
        let handles = bq.batch_publish_delivered(items);
        assert!(matches!(handles, AckHandles::Flat(tags) if tags.len() == 1));
    }

    #[test]
    fn membership_bus_broadcasts_to_subscribers() {
        let bus = InMemoryMembershipBus::new();
        let mut rx = bus.subscribe();
        let round = RoundToken::generate();
        bus.broadcast_sync_start(round);
        assert_eq!(rx.try_recv().unwrap(), round);
    }
}
