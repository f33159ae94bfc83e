//! Discovers newly signed bridge messages and queues them on the spoke
//! temporal governor, scheduling their timelocked execution.

use parking_lot::Mutex;
use url::Url;

use crate::error::Error;
use crate::governance::TemporalGovernorContract;
use crate::notify::{
    Card, Notifications, COLOR_FAILURE, COLOR_SCHEDULED,
};
use crate::probe;
use crate::store::{
    ActionId, ActionKind, DeferredActionStore, SequenceTrackerStore,
};
use crate::utils;
use crate::vaa::VaaSource;

/// Walks the bridge message sequence upwards from the last queued one.
/// Every signed message found is queued on the temporal governor and
/// recorded with a ready-time one timelock in the future; the walk stops
/// at the first sequence the attestation service has nothing for.
pub struct VaaQueuer<T, F, S> {
    network: String,
    temporal_governor: T,
    fetcher: F,
    store: S,
    notifications: Notifications,
    explorer: Option<Url>,
    timelock_delay: u64,
    // the last sequence an undecodable-payload alert went out for, so a
    // stuck sequence pages once instead of every cycle.
    alerted: Mutex<Option<u64>>,
}

impl<T, F, S> VaaQueuer<T, F, S>
where
    T: TemporalGovernorContract,
    F: VaaSource,
    S: DeferredActionStore + SequenceTrackerStore,
{
    /// Creates a queuer for `network` with the given timelock, in
    /// seconds.
    pub fn new(
        network: impl Into<String>,
        temporal_governor: T,
        fetcher: F,
        store: S,
        notifications: Notifications,
        explorer: Option<Url>,
        timelock_delay: u64,
    ) -> Self {
        Self {
            network: network.into(),
            temporal_governor,
            fetcher,
            store,
            notifications,
            explorer,
            timelock_delay,
            alerted: Mutex::new(None),
        }
    }

    /// One discovery pass. Returns how many messages were queued.
    ///
    /// The high-water mark only advances after a message is both queued
    /// on chain and recorded in the store, so a failure in between is
    /// retried from the same sequence next cycle. A sequence whose
    /// payload the service serves but cannot be decoded blocks the walk
    /// (later sequences must not jump the queue) and pages an operator.
    #[tracing::instrument(skip(self), fields(network = %self.network))]
    pub async fn run_cycle(&self, now: u64) -> crate::Result<usize> {
        let mut queued = 0usize;
        loop {
            let last = self.store.get_last_sequence(&self.network, 0)?;
            let next = last + 1;
            let vaa = match self.fetcher.fetch_once(&self.network, next).await
            {
                Ok(vaa) => vaa,
                Err(Error::FetchExhausted { .. }) => {
                    tracing::trace!(
                        sequence = next,
                        "no new bridge message yet",
                    );
                    break;
                }
                Err(
                    e @ (Error::InvalidVaaPayload
                    | Error::InvalidVaaResponse(_)),
                ) => {
                    self.report_undecodable(next, &e).await;
                    break;
                }
                Err(e) => return Err(e),
            };
            let tx_hash = self.temporal_governor.queue_proposal(&vaa).await?;
            let ready_at = now + self.timelock_delay;
            self.store.record_action(
                ActionKind::BridgeMessage,
                &self.network,
                &ActionId::from(next),
                ready_at,
            )?;
            self.store.set_last_sequence(&self.network, next)?;
            queued += 1;
            let link = utils::tx_link(self.explorer.as_ref(), tx_hash);
            tracing::info!(
                target: probe::TARGET,
                kind = %probe::Kind::Queue,
                network = %self.network,
                sequence = next,
                ready_at,
                tx = %utils::ClickableLink::new(
                    &format!("{tx_hash:#x}"),
                    link.as_deref().unwrap_or(""),
                ),
                "bridge message queued",
            );
            self.notifications
                .channel(
                    format!(
                        "Queued bridge message {next} on {}",
                        self.network
                    ),
                    format!(
                        "The proposal becomes executable at <t:{ready_at}>.",
                    ),
                )
                .await;
            let mut card = Card::new("Bridge message queued", COLOR_SCHEDULED)
                .field("Network", &self.network, true)
                .field("Sequence", next.to_string(), true)
                .field("Will be executed at", format!("<t:{ready_at}>"), true);
            if let Some(link) = link {
                card = card.url(link);
            }
            self.notifications.card(card).await;
        }
        Ok(queued)
    }

    async fn report_undecodable(&self, sequence: u64, error: &Error) {
        tracing::error!(
            target: probe::TARGET,
            kind = %probe::Kind::Queue,
            network = %self.network,
            sequence,
            error = %error,
            "bridge message payload does not decode, queue walk is stuck",
        );
        {
            let mut alerted = self.alerted.lock();
            if *alerted == Some(sequence) {
                return;
            }
            *alerted = Some(sequence);
        }
        self.notifications
            .channel(
                format!(
                    "Bridge message {sequence} on {} does not decode",
                    self.network
                ),
                "Manual intervention required.".to_string(),
            )
            .await;
        self.notifications
            .card(
                Card::new("Bridge message payload undecodable", COLOR_FAILURE)
                    .field("Network", &self.network, true)
                    .field("Sequence", sequence.to_string(), true)
                    .field("Error", error.to_string(), false),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::notify::test_support::RecordingSink;
    use crate::store::InMemoryStore;
    use crate::tasks::test_support::{MockTemporalGovernor, MockVaaSource};
    use ActionKind::BridgeMessage;

    fn queuer(
        fetcher: MockVaaSource,
        store: InMemoryStore,
        sink: Arc<RecordingSink>,
    ) -> VaaQueuer<MockTemporalGovernor, MockVaaSource, InMemoryStore> {
        VaaQueuer::new(
            "base",
            MockTemporalGovernor::default(),
            fetcher,
            store,
            Notifications::new(sink, "governance-alerts"),
            None,
            86_400,
        )
    }

    fn id(s: &str) -> ActionId {
        ActionId::new(s).unwrap()
    }

    #[tokio::test]
    async fn queues_every_signed_message_and_schedules_it() {
        let sink = Arc::new(RecordingSink::default());
        let queuer = queuer(
            MockVaaSource::default()
                .with_message(1, b"first")
                .with_message(2, b"second"),
            InMemoryStore::default(),
            sink.clone(),
        );
        let queued = queuer.run_cycle(1_000).await.unwrap();
        assert_eq!(queued, 2);
        assert_eq!(queuer.temporal_governor.queued.lock().len(), 2);
        assert_eq!(
            queuer.store.action_index(BridgeMessage, "base").unwrap(),
            vec![id("1"), id("2")]
        );
        // ready one timelock after queueing.
        assert_eq!(
            queuer.store.ready_at(BridgeMessage, "base", &id("1")).unwrap(),
            Some(87_400)
        );
        assert_eq!(queuer.store.get_last_sequence("base", 0).unwrap(), 2);
        assert_eq!(sink.cards.lock().len(), 2);

        // nothing new, the next cycle is a no-op.
        let queued = queuer.run_cycle(2_000).await.unwrap();
        assert_eq!(queued, 0);
        assert_eq!(queuer.temporal_governor.queued.lock().len(), 2);
    }

    #[tokio::test]
    async fn queueing_failure_keeps_the_high_water_mark() {
        let sink = Arc::new(RecordingSink::default());
        let queuer = queuer(
            MockVaaSource::default().with_message(1, b"first"),
            InMemoryStore::default(),
            sink.clone(),
        );
        *queuer.temporal_governor.failing.lock() = true;
        assert!(queuer.run_cycle(1_000).await.is_err());
        assert_eq!(queuer.store.get_last_sequence("base", 0).unwrap(), 0);
        assert!(queuer
            .store
            .action_index(BridgeMessage, "base")
            .unwrap()
            .is_empty());

        // once the contract recovers, the same sequence is retried.
        *queuer.temporal_governor.failing.lock() = false;
        let queued = queuer.run_cycle(2_000).await.unwrap();
        assert_eq!(queued, 1);
        assert_eq!(queuer.store.get_last_sequence("base", 0).unwrap(), 1);
    }

    #[tokio::test]
    async fn undecodable_payload_blocks_the_walk_and_pages_once() {
        let sink = Arc::new(RecordingSink::default());
        let queuer = queuer(
            MockVaaSource::default()
                .with_undecodable(1)
                .with_message(2, b"second"),
            InMemoryStore::default(),
            sink.clone(),
        );
        let queued = queuer.run_cycle(1_000).await.unwrap();
        // nothing is queued past the stuck sequence and the mark holds.
        assert_eq!(queued, 0);
        assert!(queuer.temporal_governor.queued.lock().is_empty());
        assert_eq!(queuer.store.get_last_sequence("base", 0).unwrap(), 0);
        {
            let messages = sink.messages.lock();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].message, "Manual intervention required.");
            let cards = sink.cards.lock();
            assert_eq!(cards.len(), 1);
            assert_eq!(cards[0].color, COLOR_FAILURE);
        }

        // the next cycle stays stuck but does not page again.
        let queued = queuer.run_cycle(2_000).await.unwrap();
        assert_eq!(queued, 0);
        assert_eq!(sink.messages.lock().len(), 1);
        assert_eq!(sink.cards.lock().len(), 1);
    }
}
