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

//! Contract bindings for the on-chain governance contracts, plus adapters
//! that expose them through the [`crate::governance`] traits so the tasks
//! never depend on a concrete middleware.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256};

use crate::error::Error;
use crate::governance::{
    GovernorContract, ProposalInformation, ProposalState,
    TemporalGovernorContract, VoteCollectionContract,
};

abigen!(
    MultichainGovernor,
    r#"[
        function liveProposals() external view returns (uint256[])
        function state(uint256 proposalId) external view returns (uint8)
        function execute(uint256 proposalId) external payable
    ]"#,
);

abigen!(
    MultichainVoteCollection,
    r#"[
        function proposalInformation(uint256 proposalId) external view returns (uint256, uint256, uint256, uint256, uint256, uint256, uint256, uint256)
        function bridgeCostAll() external view returns (uint256)
        function emitVotes(uint256 proposalId) external payable
    ]"#,
);

abigen!(
    TemporalGovernor,
    r#"[
        function queueProposal(bytes VAA) external
        function executeProposal(bytes VAA) external payable
    ]"#,
);

// A mined transaction either comes back with a receipt or was dropped
// from the mempool while waiting; the latter is not a revert and the
// caller may retry it.
async fn send_and_confirm<M: Middleware + 'static>(
    call: ethers::contract::ContractCall<M, ()>,
) -> crate::Result<TxHash> {
    let pending = call
        .send()
        .await
        .map_err(|e| Error::Contract(e.to_string()))?;
    let receipt: Option<TransactionReceipt> = pending.await?;
    match receipt {
        Some(receipt) => Ok(receipt.transaction_hash),
        None => Err(Error::Generic("transaction dropped from the mempool")),
    }
}

/// The hub governor, behind any middleware. Queries work over a read-only
/// provider; `execute` needs a signer.
#[derive(Debug, Clone)]
pub struct EvmGovernor<M> {
    contract: MultichainGovernor<M>,
}

impl<M: Middleware + 'static> EvmGovernor<M> {
    /// Binds the governor at `address` to the given client.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: MultichainGovernor::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> GovernorContract for EvmGovernor<M> {
    async fn live_proposals(&self) -> crate::Result<Vec<U256>> {
        self.contract
            .live_proposals()
            .call()
            .await
            .map_err(|e| Error::Contract(e.to_string()))
    }

    async fn state(&self, proposal_id: U256) -> crate::Result<ProposalState> {
        let raw = self
            .contract
            .state(proposal_id)
            .call()
            .await
            .map_err(|e| Error::Contract(e.to_string()))?;
        Ok(ProposalState::from(raw))
    }

    async fn execute(&self, proposal_id: U256) -> crate::Result<TxHash> {
        send_and_confirm(self.contract.execute(proposal_id)).await
    }
}

/// The spoke vote collection contract, behind a signing middleware.
#[derive(Debug, Clone)]
pub struct EvmVoteCollection<M> {
    contract: MultichainVoteCollection<M>,
}

impl<M: Middleware + 'static> EvmVoteCollection<M> {
    /// Binds the vote collection contract at `address` to the given
    /// client.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: MultichainVoteCollection::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> VoteCollectionContract for EvmVoteCollection<M> {
    async fn proposal_information(
        &self,
        proposal_id: U256,
    ) -> crate::Result<ProposalInformation> {
        let raw = self
            .contract
            .proposal_information(proposal_id)
            .call()
            .await
            .map_err(|e| Error::Contract(e.to_string()))?;
        Ok(ProposalInformation {
            vote_snapshot_timestamp: raw.0,
            voting_start_time: raw.1,
            voting_end_time: raw.2,
            cross_chain_vote_collection_end_timestamp: raw.3,
            snapshot_block: raw.4,
            total_votes: raw.5,
            votes_for: raw.6,
            votes_against: raw.7,
        })
    }

    async fn bridge_cost_all(&self) -> crate::Result<U256> {
        self.contract
            .bridge_cost_all()
            .call()
            .await
            .map_err(|e| Error::Contract(e.to_string()))
    }

    async fn emit_votes(
        &self,
        proposal_id: U256,
        value: U256,
    ) -> crate::Result<TxHash> {
        let call = self.contract.emit_votes(proposal_id).value(value);
        let gas = call
            .estimate_gas()
            .await
            .map_err(|e| Error::Contract(e.to_string()))?;
        // pad the estimate by 20%, bridged messages make it flaky.
        let call = call.gas(gas + gas / 5);
        send_and_confirm(call).await
    }
}

/// The spoke temporal governor, behind a signing middleware.
#[derive(Debug, Clone)]
pub struct EvmTemporalGovernor<M> {
    contract: TemporalGovernor<M>,
}

impl<M: Middleware + 'static> EvmTemporalGovernor<M> {
    /// Binds the temporal governor at `address` to the given client.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: TemporalGovernor::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> TemporalGovernorContract
    for EvmTemporalGovernor<M>
{
    async fn queue_proposal(&self, vaa: &Bytes) -> crate::Result<TxHash> {
        send_and_confirm(self.contract.queue_proposal(vaa.clone())).await
    }

    async fn execute_proposal(&self, vaa: &Bytes) -> crate::Result<TxHash> {
        send_and_confirm(self.contract.execute_proposal(vaa.clone())).await
    }
}
