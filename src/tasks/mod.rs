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

//! The automation tasks, one per governance workflow step:
//!
//! - [`VoteEmitter`] bridges remote vote tallies back to the hub while a
//!   proposal is collecting cross-chain votes;
//! - [`ProposalExecutor`] executes passed proposals on the hub governor
//!   and prunes the ones that can never execute;
//! - [`VaaQueuer`] discovers newly signed bridge messages and queues them
//!   on the spoke temporal governor, recording their timelock;
//! - [`QueuedExecutor`] executes queued bridge messages once their
//!   timelock has elapsed.
//!
//! Every task exposes a `run_cycle` the service drives on the network's
//! polling interval. A cycle is idempotent: anything it cannot finish
//! stays pending for the next one.

mod emit_votes;
mod execute_proposals;
mod execute_queued;
mod queue_vaa;

pub use emit_votes::VoteEmitter;
pub use execute_proposals::ProposalExecutor;
pub use execute_queued::QueuedExecutor;
pub use queue_vaa::VaaQueuer;
