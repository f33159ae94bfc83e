//! End-to-end checks of the durable pending-action queue driven through
//! the poll scan, the way the relayer tasks drive it.

use xgov_relayer::poller::{poll_and_process, Outcome};
use xgov_relayer::store::{
    ActionId, ActionKind, DeferredActionStore, SequenceTrackerStore,
    SledStore,
};
use ActionKind::{BridgeMessage, Proposal};

fn id(s: &str) -> ActionId {
    ActionId::new(s).unwrap()
}

#[tokio::test]
async fn scan_executes_only_past_due_actions_and_rewrites_the_index_once() {
    let store = SledStore::temporary().unwrap();
    store.record_action(Proposal, "base", &id("10"), 1_000).unwrap();
    store.record_action(Proposal, "base", &id("20"), 9_000).unwrap();
    store.record_action(Proposal, "base", &id("30"), 1_000).unwrap();

    let report = poll_and_process(&store, Proposal, "base", 5_000, |action| {
        let outcome = match action.id.as_str() {
            "10" => Outcome::Succeeded,
            "30" => Outcome::Failed,
            other => panic!("unexpected execution of {other}"),
        };
        async move { Ok(outcome) }
    })
    .await
    .unwrap();

    assert_eq!(report.succeeded, vec![id("10")]);
    assert_eq!(report.failed, vec![id("30")]);
    assert!(report.consumed.is_empty());

    // only the future-dated action survives, with its ready-time intact.
    assert_eq!(store.action_index(Proposal, "base").unwrap(), vec![id("20")]);
    assert_eq!(
        store.ready_at(Proposal, "base", &id("20")).unwrap(),
        Some(9_000)
    );
    assert_eq!(store.ready_at(Proposal, "base", &id("10")).unwrap(), None);
    assert_eq!(store.ready_at(Proposal, "base", &id("30")).unwrap(), None);

    // both outcomes are terminal; a repeated scan does nothing.
    let report = poll_and_process(&store, Proposal, "base", 5_000, |_| async {
        panic!("nothing should run twice")
    })
    .await
    .unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn nothing_runs_before_its_ready_time() {
    let store = SledStore::temporary().unwrap();
    store.record_action(Proposal, "base", &id("42"), 10_000).unwrap();
    for now in [0, 5_000, 9_999] {
        let report =
            poll_and_process(&store, Proposal, "base", now, |_| async {
                panic!("executed before the ready-time")
            })
            .await
            .unwrap();
        assert!(report.is_empty());
    }
    assert_eq!(store.action_index(Proposal, "base").unwrap(), vec![id("42")]);
}

#[tokio::test]
async fn networks_do_not_see_each_other() {
    let store = SledStore::temporary().unwrap();
    store.record_action(Proposal, "base", &id("1"), 0).unwrap();
    store.record_action(Proposal, "optimism", &id("2"), 0).unwrap();

    let report =
        poll_and_process(&store, Proposal, "base", 100, |action| async move {
            assert_eq!(action.id.as_str(), "1");
            Ok(Outcome::Succeeded)
        })
        .await
        .unwrap();
    assert_eq!(report.succeeded, vec![id("1")]);
    assert_eq!(
        store.action_index(Proposal, "optimism").unwrap(),
        vec![id("2")]
    );

    // sequence marks are per network too.
    store.set_last_sequence("base", 7).unwrap();
    assert_eq!(store.get_last_sequence("base", 0).unwrap(), 7);
    assert_eq!(store.get_last_sequence("optimism", 0).unwrap(), 0);
}

#[tokio::test]
async fn proposal_and_bridge_queues_do_not_see_each_other() {
    // the same network carries both queues, and the same numeric id sits
    // in each: a proposal dedup record and a ready bridge sequence.
    let store = SledStore::temporary().unwrap();
    store.record_action(Proposal, "base", &id("10"), 90_000).unwrap();
    store.record_action(BridgeMessage, "base", &id("10"), 100).unwrap();

    let report = poll_and_process(
        &store,
        BridgeMessage,
        "base",
        5_000,
        |action| async move {
            assert_eq!(action.ready_at, 100);
            Ok(Outcome::Succeeded)
        },
    )
    .await
    .unwrap();
    assert_eq!(report.succeeded, vec![id("10")]);

    // draining the bridge queue leaves the proposal record untouched.
    assert_eq!(store.action_index(Proposal, "base").unwrap(), vec![id("10")]);
    assert_eq!(
        store.ready_at(Proposal, "base", &id("10")).unwrap(),
        Some(90_000)
    );
    assert!(store.action_index(BridgeMessage, "base").unwrap().is_empty());
}
