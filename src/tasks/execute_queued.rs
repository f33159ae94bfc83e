//! Executes queued bridge messages on the temporal governor once their
//! timelock has elapsed.

use url::Url;

use crate::error::Error;
use crate::governance::TemporalGovernorContract;
use crate::notify::{Card, Notifications, COLOR_FAILURE, COLOR_SUCCESS};
use crate::poller::{poll_and_process, Outcome, PollReport};
use crate::probe;
use crate::store::{ActionKind, DeferredActionStore, PendingAction};
use crate::utils;
use crate::vaa::VaaSource;

/// Drains the queued bridge messages of a network: each one whose
/// timelock has elapsed is re-fetched from the attestation service and
/// executed on the temporal governor.
pub struct QueuedExecutor<T, F, S> {
    network: String,
    temporal_governor: T,
    fetcher: F,
    store: S,
    notifications: Notifications,
    explorer: Option<Url>,
}

impl<T, F, S> QueuedExecutor<T, F, S>
where
    T: TemporalGovernorContract,
    F: VaaSource,
    S: DeferredActionStore,
{
    /// Creates a queued-message executor for `network`.
    pub fn new(
        network: impl Into<String>,
        temporal_governor: T,
        fetcher: F,
        store: S,
        notifications: Notifications,
        explorer: Option<Url>,
    ) -> Self {
        Self {
            network: network.into(),
            temporal_governor,
            fetcher,
            store,
            notifications,
            explorer,
        }
    }

    /// One poll scan over the queued messages.
    #[tracing::instrument(skip(self), fields(network = %self.network))]
    pub async fn run_cycle(&self, now: u64) -> crate::Result<PollReport> {
        let report = poll_and_process(
            &self.store,
            ActionKind::BridgeMessage,
            &self.network,
            now,
            |action| self.process(action),
        )
        .await?;
        if !report.is_empty() {
            tracing::debug!(
                target: probe::TARGET,
                kind = %probe::Kind::Poll,
                network = %self.network,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                consumed = report.consumed.len(),
                "queued message scan done",
            );
        }
        Ok(report)
    }

    async fn process(&self, action: PendingAction) -> crate::Result<Outcome> {
        let sequence: u64 = action
            .id
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidProposalId(action.id.to_string()))?;
        let vaa = match self.fetcher.fetch(&self.network, sequence).await {
            Ok(vaa) => vaa,
            Err(Error::FetchExhausted { attempts, .. }) => {
                tracing::error!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Execute,
                    network = %self.network,
                    sequence,
                    attempts,
                    "bridge message disappeared from the attestation service",
                );
                self.fail(
                    sequence,
                    "The signed message could not be fetched.",
                )
                .await;
                return Ok(Outcome::Failed);
            }
            // anything else is transient; keep the message queued.
            Err(e) => return Err(e),
        };
        match self.temporal_governor.execute_proposal(&vaa).await {
            Ok(tx_hash) => {
                let link = utils::tx_link(self.explorer.as_ref(), tx_hash);
                tracing::info!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Execute,
                    network = %self.network,
                    sequence,
                    tx = %utils::ClickableLink::new(
                        &format!("{tx_hash:#x}"),
                        link.as_deref().unwrap_or(""),
                    ),
                    "queued bridge message executed",
                );
                self.notifications
                    .channel(
                        format!(
                            "Executed bridge message {sequence} on {}",
                            self.network
                        ),
                        "The queued proposal went through.".to_string(),
                    )
                    .await;
                let mut card =
                    Card::new("Bridge message executed", COLOR_SUCCESS)
                        .field("Network", &self.network, true)
                        .field("Sequence", sequence.to_string(), true)
                        .field(
                            "Executed at",
                            format!("<t:{}>", action.ready_at),
                            true,
                        );
                if let Some(link) = link {
                    card = card.url(link);
                }
                self.notifications.card(card).await;
                Ok(Outcome::Succeeded)
            }
            Err(e) => {
                tracing::error!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Execute,
                    network = %self.network,
                    sequence,
                    error = %e,
                    "queued bridge message execution failed",
                );
                self.fail(sequence, &e.to_string()).await;
                Ok(Outcome::Failed)
            }
        }
    }

    async fn fail(&self, sequence: u64, detail: &str) {
        self.notifications
            .channel(
                format!(
                    "Bridge message {sequence} failed on {}",
                    self.network
                ),
                "Manual intervention required.".to_string(),
            )
            .await;
        self.notifications
            .card(
                Card::new("Bridge message execution failed", COLOR_FAILURE)
                    .field("Network", &self.network, true)
                    .field("Sequence", sequence.to_string(), true)
                    .field("Error", detail, false),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::notify::test_support::RecordingSink;
    use crate::store::{ActionId, InMemoryStore};
    use crate::tasks::test_support::{MockTemporalGovernor, MockVaaSource};

    fn id(s: &str) -> ActionId {
        ActionId::new(s).unwrap()
    }

    fn executor(
        fetcher: MockVaaSource,
        store: InMemoryStore,
        sink: Arc<RecordingSink>,
    ) -> QueuedExecutor<MockTemporalGovernor, MockVaaSource, InMemoryStore>
    {
        QueuedExecutor::new(
            "base",
            MockTemporalGovernor::default(),
            fetcher,
            store,
            Notifications::new(sink, "governance-alerts"),
            None,
        )
    }

    #[tokio::test]
    async fn elapsed_timelock_executes_the_message() {
        let sink = Arc::new(RecordingSink::default());
        let store = InMemoryStore::default();
        store
            .record_action(ActionKind::BridgeMessage, "base", &id("1"), 1_000)
            .unwrap();
        let executor = executor(
            MockVaaSource::default().with_message(1, b"payload"),
            store,
            sink.clone(),
        );

        // still timelocked, nothing happens.
        let report = executor.run_cycle(999).await.unwrap();
        assert!(report.is_empty());
        assert!(executor.temporal_governor.executed.lock().is_empty());

        let report = executor.run_cycle(1_000).await.unwrap();
        assert_eq!(report.succeeded, vec![id("1")]);
        assert_eq!(executor.temporal_governor.executed.lock().len(), 1);
        assert!(executor
            .store
            .action_index(ActionKind::BridgeMessage, "base")
            .unwrap()
            .is_empty());
        let cards = sink.cards.lock();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].color, COLOR_SUCCESS);
    }

    #[tokio::test]
    async fn unfetchable_message_is_terminal() {
        let sink = Arc::new(RecordingSink::default());
        let store = InMemoryStore::default();
        store
            .record_action(ActionKind::BridgeMessage, "base", &id("1"), 0)
            .unwrap();
        let executor =
            executor(MockVaaSource::default(), store, sink.clone());
        let report = executor.run_cycle(1_000).await.unwrap();
        assert_eq!(report.failed, vec![id("1")]);
        assert!(executor
            .store
            .action_index(ActionKind::BridgeMessage, "base")
            .unwrap()
            .is_empty());
        let messages = sink.messages.lock();
        assert_eq!(messages[0].message, "Manual intervention required.");
        assert_eq!(sink.cards.lock()[0].color, COLOR_FAILURE);
    }

    #[tokio::test]
    async fn reverted_execution_is_terminal_and_flagged() {
        let sink = Arc::new(RecordingSink::default());
        let store = InMemoryStore::default();
        store
            .record_action(ActionKind::BridgeMessage, "base", &id("1"), 0)
            .unwrap();
        let executor = executor(
            MockVaaSource::default().with_message(1, b"payload"),
            store,
            sink.clone(),
        );
        *executor.temporal_governor.failing.lock() = true;
        let report = executor.run_cycle(1_000).await.unwrap();
        assert_eq!(report.failed, vec![id("1")]);
        assert!(executor
            .store
            .action_index(ActionKind::BridgeMessage, "base")
            .unwrap()
            .is_empty());
        assert_eq!(sink.cards.lock()[0].color, COLOR_FAILURE);
    }
}
