// Copyright 2024 XGov Relayer Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Governance domain types: the proposal lifecycle state machine, the
//! disposition gate that decides what the relayer does with a proposal in
//! a given state, and the contract traits the automation tasks run
//! against.

use async_trait::async_trait;
use ethers::types::{Bytes, TxHash, U256};

use crate::error::Result;

/// The lifecycle state of a cross-chain governance proposal, as reported
/// by the on-chain governor.
///
/// The numeric discriminants are part of the contract ABI; anything the
/// contract may grow in the future lands in [`ProposalState::Other`]
/// instead of failing decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    /// Voting has closed on the hub and remote vote tallies are being
    /// collected over the bridge.
    VoteCollection,
    /// The proposal was canceled by its proposer.
    Canceled,
    /// The proposal did not reach quorum or lost the vote.
    Defeated,
    /// The proposal passed and awaits execution.
    Succeeded,
    /// The proposal was already executed.
    Executed,
    /// A state this relayer does not act on (pending, active voting, or a
    /// future contract addition).
    Other(u8),
}

impl From<u8> for ProposalState {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::VoteCollection,
            2 => Self::Canceled,
            3 => Self::Defeated,
            4 => Self::Succeeded,
            5 => Self::Executed,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VoteCollection => write!(f, "vote collection"),
            Self::Canceled => write!(f, "canceled"),
            Self::Defeated => write!(f, "defeated"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Executed => write!(f, "executed"),
            Self::Other(raw) => write!(f, "other ({raw})"),
        }
    }
}

/// Why a pending proposal is pruned from the queue without executing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// The proposal was canceled.
    Canceled,
    /// The proposal was defeated.
    Defeated,
    /// Someone else already executed the proposal.
    AlreadyExecuted,
}

impl PruneReason {
    /// A short human-readable form, used in notifications.
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Defeated => "defeated",
            Self::AlreadyExecuted => "executed",
        }
    }
}

/// What the relayer should do with a proposal in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Bridge the remote vote tally back to the hub.
    EmitVotes,
    /// Execute the proposal on the hub governor.
    Execute,
    /// Drop the pending action; the proposal can never execute.
    Prune(PruneReason),
    /// Do nothing this cycle and keep the action pending.
    Skip,
}

/// The state gate. Total over all states, so an unknown state can never
/// make a task fall through to execution.
pub const fn disposition(state: ProposalState) -> Disposition {
    match state {
        ProposalState::VoteCollection => Disposition::EmitVotes,
        ProposalState::Canceled => Disposition::Prune(PruneReason::Canceled),
        ProposalState::Defeated => Disposition::Prune(PruneReason::Defeated),
        ProposalState::Succeeded => Disposition::Execute,
        ProposalState::Executed => {
            Disposition::Prune(PruneReason::AlreadyExecuted)
        }
        ProposalState::Other(_) => Disposition::Skip,
    }
}

/// The vote bookkeeping of a proposal on a vote collection contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalInformation {
    /// When the voting power snapshot was taken.
    pub vote_snapshot_timestamp: U256,
    /// When voting opened.
    pub voting_start_time: U256,
    /// When voting closed.
    pub voting_end_time: U256,
    /// The deadline for bridging remote tallies back to the hub.
    pub cross_chain_vote_collection_end_timestamp: U256,
    /// The block the voting power snapshot was taken at.
    pub snapshot_block: U256,
    /// Total votes cast on this network, all options combined.
    pub total_votes: U256,
    /// Votes in favor.
    pub votes_for: U256,
    /// Votes against.
    pub votes_against: U256,
}

/// The hub governor contract, queried for live proposals and their
/// states, and invoked to execute passed proposals.
#[async_trait]
pub trait GovernorContract: Send + Sync {
    /// The ids of all proposals currently in a non-final state.
    async fn live_proposals(&self) -> Result<Vec<U256>>;

    /// The lifecycle state of the given proposal.
    async fn state(&self, proposal_id: U256) -> Result<ProposalState>;

    /// Executes the proposal, returning the transaction hash.
    async fn execute(&self, proposal_id: U256) -> Result<TxHash>;
}

/// The vote collection contract on a spoke network.
#[async_trait]
pub trait VoteCollectionContract: Send + Sync {
    /// The vote bookkeeping of the given proposal on this network.
    async fn proposal_information(
        &self,
        proposal_id: U256,
    ) -> Result<ProposalInformation>;

    /// The total bridge fee required to relay the tally to the hub.
    async fn bridge_cost_all(&self) -> Result<U256>;

    /// Bridges this network's tally back to the hub, attaching `value` as
    /// the bridge fee. Returns the transaction hash.
    async fn emit_votes(
        &self,
        proposal_id: U256,
        value: U256,
    ) -> Result<TxHash>;
}

/// The temporal governor contract on a spoke network, fed with signed
/// bridge messages.
#[async_trait]
pub trait TemporalGovernorContract: Send + Sync {
    /// Queues a signed bridge message, starting its timelock.
    async fn queue_proposal(&self, vaa: &Bytes) -> Result<TxHash>;

    /// Executes a previously queued bridge message once its timelock has
    /// elapsed. Returns the transaction hash.
    async fn execute_proposal(&self, vaa: &Bytes) -> Result<TxHash>;
}
