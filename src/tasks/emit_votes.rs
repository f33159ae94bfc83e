//! Bridges remote vote tallies back to the hub governor while proposals
//! are in their cross-chain vote collection window.

use url::Url;

use crate::governance::{
    disposition, Disposition, GovernorContract, VoteCollectionContract,
};
use crate::notify::{Card, Notifications, COLOR_SCHEDULED};
use crate::probe;
use crate::store::{ActionId, ActionKind, DeferredActionStore};
use crate::utils;

/// Emits this network's vote tallies for every live proposal still in
/// vote collection. Each proposal is emitted at most once; the store
/// remembers which ones already went out.
pub struct VoteEmitter<G, V, S> {
    network: String,
    governor: G,
    vote_collection: V,
    store: S,
    notifications: Notifications,
    explorer: Option<Url>,
}

impl<G, V, S> VoteEmitter<G, V, S>
where
    G: GovernorContract,
    V: VoteCollectionContract,
    S: DeferredActionStore,
{
    /// Creates a vote emitter for `network`. The governor lives on the
    /// hub network and only ever gets queried, so a read-only client is
    /// enough for it.
    pub fn new(
        network: impl Into<String>,
        governor: G,
        vote_collection: V,
        store: S,
        notifications: Notifications,
        explorer: Option<Url>,
    ) -> Self {
        Self {
            network: network.into(),
            governor,
            vote_collection,
            store,
            notifications,
            explorer,
        }
    }

    /// One emission pass over all live proposals.
    #[tracing::instrument(skip(self), fields(network = %self.network))]
    pub async fn run_cycle(&self, now: u64) -> crate::Result<()> {
        let proposals = self.governor.live_proposals().await?;
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Votes,
            network = %self.network,
            live = proposals.len(),
            "scanning live proposals",
        );
        for proposal_id in proposals {
            let state = match self.governor.state(proposal_id).await {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        %proposal_id,
                        error = %e,
                        "failed to query the proposal state",
                    );
                    continue;
                }
            };
            if disposition(state) != Disposition::EmitVotes {
                tracing::trace!(%proposal_id, %state, "not collecting votes");
                continue;
            }
            let id = ActionId::from(proposal_id);
            if self.store.contains_action(
                ActionKind::Proposal,
                &self.network,
                &id,
            )? {
                tracing::trace!(%proposal_id, "votes already emitted");
                continue;
            }
            if let Err(e) = self.emit(proposal_id, now).await {
                tracing::error!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Votes,
                    network = %self.network,
                    %proposal_id,
                    error = %e,
                    "failed to emit votes",
                );
            }
        }
        Ok(())
    }

    async fn emit(
        &self,
        proposal_id: ethers::types::U256,
        now: u64,
    ) -> crate::Result<()> {
        let info =
            self.vote_collection.proposal_information(proposal_id).await?;
        if info.total_votes.is_zero() {
            tracing::trace!(%proposal_id, "no votes cast here, nothing to bridge");
            return Ok(());
        }
        let cost = self.vote_collection.bridge_cost_all().await?;
        let tx_hash =
            self.vote_collection.emit_votes(proposal_id, cost).await?;
        // remember the emission so the next cycle skips this proposal. it
        // lands in the proposal queue, never among queued bridge messages.
        self.store.record_action(
            ActionKind::Proposal,
            &self.network,
            &ActionId::from(proposal_id),
            now,
        )?;
        let link = utils::tx_link(self.explorer.as_ref(), tx_hash);
        tracing::info!(
            target: probe::TARGET,
            kind = %probe::Kind::Votes,
            network = %self.network,
            %proposal_id,
            total_votes = %info.total_votes,
            tx = %utils::ClickableLink::new(
                &format!("{tx_hash:#x}"),
                link.as_deref().unwrap_or(""),
            ),
            "votes emitted",
        );
        self.notifications
            .channel(
                format!("Votes emitted for proposal {proposal_id}"),
                format!(
                    "Bridged {} votes from {} back to the governor.",
                    info.total_votes, self.network,
                ),
            )
            .await;
        let mut card = Card::new("Votes emitted", COLOR_SCHEDULED)
            .field("Network", &self.network, true)
            .field("Proposal", proposal_id.to_string(), true)
            .field("Total votes", info.total_votes.to_string(), true);
        if let Some(link) = link {
            card = card.url(link);
        }
        self.notifications.card(card).await;
        Ok(())
    }
}
