//! Executes passed proposals from the pending queue and prunes the ones
//! that can never execute.

use ethers::types::U256;
use url::Url;

use crate::error::Error;
use crate::governance::{disposition, Disposition, GovernorContract};
use crate::notify::{
    Card, Notifications, COLOR_FAILURE, COLOR_INFO, COLOR_SUCCESS,
};
use crate::poller::{poll_and_process, Outcome, PollReport};
use crate::probe;
use crate::store::{ActionKind, DeferredActionStore, PendingAction};
use crate::utils;

/// Drains the pending proposal queue of `sender_network`: proposals whose
/// ready-time has elapsed are executed on the hub governor if they
/// passed, pruned if they were canceled, defeated, or already executed,
/// and left pending otherwise.
pub struct ProposalExecutor<G, S> {
    network: String,
    sender_network: String,
    governor: G,
    store: S,
    notifications: Notifications,
    explorer: Option<Url>,
}

impl<G, S> ProposalExecutor<G, S>
where
    G: GovernorContract,
    S: DeferredActionStore,
{
    /// Creates a proposal executor running on `network`, draining the
    /// queue recorded under `sender_network`.
    pub fn new(
        network: impl Into<String>,
        sender_network: impl Into<String>,
        governor: G,
        store: S,
        notifications: Notifications,
        explorer: Option<Url>,
    ) -> Self {
        Self {
            network: network.into(),
            sender_network: sender_network.into(),
            governor,
            store,
            notifications,
            explorer,
        }
    }

    /// One poll scan over the pending queue.
    #[tracing::instrument(skip(self), fields(network = %self.network))]
    pub async fn run_cycle(&self, now: u64) -> crate::Result<PollReport> {
        let report = poll_and_process(
            &self.store,
            ActionKind::Proposal,
            &self.sender_network,
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
                "proposal queue scan done",
            );
        }
        Ok(report)
    }

    async fn process(&self, action: PendingAction) -> crate::Result<Outcome> {
        let proposal_id = U256::from_dec_str(action.id.as_str())
            .map_err(|_| Error::InvalidProposalId(action.id.to_string()))?;
        let state = self.governor.state(proposal_id).await?;
        match disposition(state) {
            Disposition::Execute => self.execute(proposal_id).await,
            Disposition::Prune(reason) => {
                tracing::info!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Execute,
                    network = %self.network,
                    %proposal_id,
                    state = %state,
                    "pruning a proposal that can never execute",
                );
                self.notifications
                    .channel(
                        format!(
                            "Proposal {proposal_id} is {}",
                            reason.describe()
                        ),
                        "Removed from the pending queue.".to_string(),
                    )
                    .await;
                self.notifications
                    .card(
                        Card::new(
                            format!(
                                "Proposal {proposal_id} is {}",
                                reason.describe()
                            ),
                            COLOR_INFO,
                        )
                        .field("Network", &self.network, true)
                        .field("Proposal", proposal_id.to_string(), true),
                    )
                    .await;
                Ok(Outcome::Succeeded)
            }
            Disposition::EmitVotes | Disposition::Skip => {
                tracing::trace!(
                    %proposal_id,
                    state = %state,
                    "not executable yet, keeping it pending",
                );
                Ok(Outcome::NotReady)
            }
        }
    }

    async fn execute(&self, proposal_id: U256) -> crate::Result<Outcome> {
        match self.governor.execute(proposal_id).await {
            Ok(tx_hash) => {
                let link = utils::tx_link(self.explorer.as_ref(), tx_hash);
                tracing::info!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Execute,
                    network = %self.network,
                    %proposal_id,
                    tx = %utils::ClickableLink::new(
                        &format!("{tx_hash:#x}"),
                        link.as_deref().unwrap_or(""),
                    ),
                    "proposal executed",
                );
                self.notifications
                    .channel(
                        format!("Proposal {proposal_id} executed"),
                        format!("Executed on {}.", self.network),
                    )
                    .await;
                let mut card =
                    Card::new("Proposal executed", COLOR_SUCCESS)
                        .field("Network", &self.network, true)
                        .field("Proposal", proposal_id.to_string(), true);
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
                    %proposal_id,
                    error = %e,
                    "proposal execution failed",
                );
                self.notifications
                    .channel(
                        format!("Proposal {proposal_id} failed to execute"),
                        "Manual execution required.".to_string(),
                    )
                    .await;
                self.notifications
                    .card(
                        Card::new("Proposal execution failed", COLOR_FAILURE)
                            .field("Network", &self.network, true)
                            .field("Proposal", proposal_id.to_string(), true)
                            .field("Error", e.to_string(), false),
                    )
                    .await;
                Ok(Outcome::Failed)
            }
        }
    }
}
