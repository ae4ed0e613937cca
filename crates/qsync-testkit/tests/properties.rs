//! Round-token uniqueness and order-preservation across randomly
//! generated snapshots.

mod common;

use std::collections::HashSet;

use common::run_round;
use proptest::prelude::*;
use qsync_core::{BackingQueue, MirrorOutcome, Msg, Props, Record, SyncConfig};
use qsync_testkit::InMemoryBackingQueue;
use qsync_types::{MsgId, Priority, RoundToken};

#[test]
fn round_tokens_stay_unique_across_many_rounds() {
    let mut seen = HashSet::new();
    for _ in 0..500 {
        let token = RoundToken::generate();
        assert!(seen.insert(token), "round token collided: {token}");
    }
}

fn arbitrary_records() -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((0u64..1000, any::<bool>()), 0..40)
}

proptest! {
    #[test]
    fn mirror_applies_records_in_master_order(pairs in arbitrary_records()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        let records: Vec<Record> = pairs
            .iter()
            .enumerate()
            .map(|(i, (id, unacked))| Record {
                msg: Msg { id: MsgId::new(*id * 1000 + i as u64), payload: vec![] },
                props: Props::new(Priority::Normal),
                unacked: *unacked,
            })
            .collect();
        let expected_order: Vec<MsgId> = records.iter().map(|r| r.msg.id).collect();
        let has_records = !records.is_empty();

        let applied_order: Option<Vec<MsgId>> = runtime.block_on(async move {
            let mut master_bq = InMemoryBackingQueue::new(records);
            let mirrors = vec![InMemoryBackingQueue::new(vec![Record {
                msg: Msg { id: MsgId::new(u64::MAX), payload: vec![] },
                props: Props::new(Priority::Normal),
                unacked: false,
            }])];

            let (_outcome, mut mirror_outcomes) =
                run_round(&mut master_bq, mirrors, SyncConfig::default().with_batch_size(3)).await;

            match mirror_outcomes.remove(0) {
                MirrorOutcome::Ok(state) => Some(
                    state
                        .backing_queue
                        .snapshot()
                        .iter()
                        .map(|r| r.msg.id)
                        .collect(),
                ),
                _ => None,
            }
        });

        if has_records {
            if let Some(applied_order) = applied_order {
                prop_assert_eq!(applied_order, expected_order);
            }
        }
    }
}
