//! Batch application and ack-tag zipping.
//!
//! This is the piece of the protocol with no network or channel
//! involvement at all — pure transformation of one batch into backing-
//! queue calls and `(msg_id, ack_tag)` pairs. Kept separate from
//! `mirror.rs` so it can be exercised directly by property tests without
//! spinning up any tasks.

use qsync_types::{MsgId, Priority};

use crate::backing_queue::{AckHandles, BackingQueue, PublishItem, Record};

/// Splits a batch into the longest runs that share one `unacked` value,
/// preserving order. The master's batching rule already guarantees one
/// batch is uniform, but the mirror partitions defensively rather than
/// assuming it.
pub fn partition_uniform_runs(batch: &[Record]) -> Vec<&[Record]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..batch.len() {
        if batch[i].unacked != batch[start].unacked {
            runs.push(&batch[start..i]);
            start = i;
        }
    }
    if start < batch.len() {
        runs.push(&batch[start..]);
    }
    runs
}

/// Rewrites a run of regular (not-ack-tracked) records for
/// `batch_publish`: `delivered` is set and `needs_confirming` cleared,
/// since the publisher confirm was already handled by the master.
fn rewrite_regular(run: &[Record]) -> Vec<PublishItem> {
    run.iter()
        .map(|r| {
            let mut props = r.props.clone();
            props.needs_confirming = false;
            props.delivered = true;
            PublishItem {
                msg: r.msg.clone(),
                props,
            }
        })
        .collect()
}

fn rewrite_delivered(run: &[Record]) -> Vec<PublishItem> {
    run.iter()
        .map(|r| PublishItem {
            msg: r.msg.clone(),
            props: r.props.clone(),
        })
        .collect()
}

/// Groups publish items by priority, preserving within-group order.
pub fn partition_by_priority(items: &[PublishItem]) -> Vec<(Priority, Vec<PublishItem>)> {
    let mut groups: Vec<(Priority, Vec<PublishItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(p, _)| *p == item.props.priority) {
            Some((_, bucket)) => bucket.push(item.clone()),
            None => groups.push((item.props.priority, vec![item.clone()])),
        }
    }
    groups
}

/// Zips ack handles returned by `batch_publish_delivered` against the
/// published items, producing the `(msg_id, ack_tag)` pairs to append to
/// a mirror's ack-map.
///
/// # Panics
///
/// Panics if a flat handle sequence's length doesn't match `items`, or
/// if a priority group in the handle sequence has no corresponding
/// published items of that priority — both indicate the backing queue
/// violated its own contract.
pub fn zip_ack_handles(handles: AckHandles, items: &[PublishItem]) -> Vec<(MsgId, qsync_types::AckTag)> {
    match handles {
        AckHandles::Flat(tags) => {
            assert_eq!(
                tags.len(),
                items.len(),
                "backing queue returned {} flat ack handles for {} published items",
                tags.len(),
                items.len()
            );
            items
                .iter()
                .zip(tags)
                .map(|(item, tag)| (item.msg.id, tag))
                .collect()
        }
        AckHandles::ByPriority(groups) => {
            let by_priority = partition_by_priority(items);
            let mut out = Vec::new();
            for (priority, tags) in groups {
                let bucket = by_priority
                    .iter()
                    .find(|(p, _)| *p == priority)
                    .map(|(_, items)| items.as_slice())
                    .unwrap_or_else(|| {
                        panic!("backing queue returned ack handles for priority {priority:?} with no matching published items")
                    });
                assert_eq!(
                    bucket.len(),
                    tags.len(),
                    "priority {priority:?}: {} ack handles for {} published items",
                    tags.len(),
                    bucket.len()
                );
                out.extend(bucket.iter().zip(tags).map(|(item, tag)| (item.msg.id, tag)));
            }
            out
        }
    }
}

/// Applies one sync batch to a mirror's backing queue, partitioning by
/// `unacked` run and zipping any returned ack handles. Returns the
/// `(msg_id, ack_tag)` pairs to append to the mirror's ack-map, in the
/// order they were produced.
pub fn apply_batch<Q: BackingQueue>(bq: &mut Q, batch: &[Record]) -> Vec<(MsgId, qsync_types::AckTag)> {
    let mut ack_map_additions = Vec::new();
    for run in partition_uniform_runs(batch) {
        if run.first().is_some_and(|r| r.unacked) {
            let items = rewrite_delivered(run);
            let handles = bq.batch_publish_delivered(items.clone());
            ack_map_additions.extend(zip_ack_handles(handles, &items));
        } else {
            bq.batch_publish(rewrite_regular(run));
        }
    }
    ack_map_additions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing_queue::{Msg, Props};

    fn record(id: u64, unacked: bool, priority: Priority) -> Record {
        Record {
            msg: Msg {
                id: MsgId::new(id),
                payload: vec![],
            },
            props: Props::new(priority),
            unacked,
        }
    }

    #[test]
    fn uniform_batch_is_one_run() {
        let batch = vec![
            record(1, false, Priority::Normal),
            record(2, false, Priority::Normal),
        ];
        assert_eq!(partition_uniform_runs(&batch).len(), 1);
    }

    #[test]
    fn mixed_batch_splits_into_runs_preserving_order() {
        let batch = vec![
            record(1, false, Priority::Normal),
            record(2, true, Priority::Normal),
            record(3, true, Priority::Normal),
            record(4, false, Priority::Normal),
        ];
        let runs = partition_uniform_runs(&batch);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].iter().map(|r| r.msg.id).collect::<Vec<_>>(), vec![MsgId::new(1)]);
        assert_eq!(
            runs[1].iter().map(|r| r.msg.id).collect::<Vec<_>>(),
            vec![MsgId::new(2), MsgId::new(3)]
        );
        assert_eq!(runs[2].iter().map(|r| r.msg.id).collect::<Vec<_>>(), vec![MsgId::new(4)]);
    }

    #[test]
    fn priority_partition_preserves_order_within_group() {
        let items: Vec<PublishItem> = vec![
            PublishItem {
                msg: Msg { id: MsgId::new(1), payload: vec![] },
                props: Props::new(Priority::High),
            },
            PublishItem {
                msg: Msg { id: MsgId::new(2), payload: vec![] },
                props: Props::new(Priority::Low),
            },
            PublishItem {
                msg: Msg { id: MsgId::new(3), payload: vec![] },
                props: Props::new(Priority::High),
            },
        ];
        let groups = partition_by_priority(&items);
        let high = groups.iter().find(|(p, _)| *p == Priority::High).unwrap();
        assert_eq!(
            high.1.iter().map(|i| i.msg.id).collect::<Vec<_>>(),
            vec![MsgId::new(1), MsgId::new(3)]
        );
    }

    #[test]
    fn flat_ack_handles_zip_in_order() {
        let items = vec![
            PublishItem { msg: Msg { id: MsgId::new(1), payload: vec![] }, props: Props::new(Priority::Normal) },
            PublishItem { msg: Msg { id: MsgId::new(2), payload: vec![] }, props: Props::new(Priority::Normal) },
        ];
        let handles = AckHandles::Flat(vec![10.into(), 11.into()]);
        let zipped = zip_ack_handles(handles, &items);
        assert_eq!(zipped, vec![(MsgId::new(1), 10.into()), (MsgId::new(2), 11.into())]);
    }
}
