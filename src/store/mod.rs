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

//! # Relayer Store Module
//!
//! Durable, idempotent bookkeeping of pending cross-chain actions with
//! pollable readiness, plus the per-network high-water mark of bridge
//! message sequences already queued.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
pub mod sled;

/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;
/// A store that uses [`sled`](https://sled.rs) as the backend.
pub use self::sled::SledStore;

/// The concern a pending action belongs to. Each kind gets its own index
/// per network, so a proposal id and a bridge message sequence that happen
/// to collide numerically stay separate records even on a network that
/// hosts both contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A governance proposal pending execution on the hub.
    Proposal,
    /// A queued bridge message pending its timelock.
    BridgeMessage,
}

impl ActionKind {
    /// The stable key segment this kind occupies in the durable store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::BridgeMessage => "bridge",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier of a pending cross-chain action: a governance proposal id or
/// a bridge message sequence number, kept as its decimal string form.
///
/// The legacy index encoding was a flat comma-joined string, so an id is
/// rejected if it is empty or contains the `,` delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

impl ActionId {
    /// Creates a new `ActionId`, rejecting empty ids and ids containing
    /// the index delimiter.
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains(',') {
            return Err(Error::InvalidActionId { id });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ActionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ActionId> for String {
    fn from(id: ActionId) -> Self {
        id.0
    }
}

impl From<u64> for ActionId {
    fn from(sequence: u64) -> Self {
        Self(sequence.to_string())
    }
}

impl From<U256> for ActionId {
    fn from(proposal_id: U256) -> Self {
        Self(proposal_id.to_string())
    }
}

/// A pending cross-chain action as seen by a poll scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// The action identifier.
    pub id: ActionId,
    /// The Unix timestamp (epoch seconds) after which the action becomes
    /// eligible for execution.
    pub ready_at: u64,
}

/// A store that tracks pending cross-chain actions keyed by kind and
/// network, each with an associated ready-time.
///
/// Implementations must keep each kind-and-network index ordered by
/// insertion and must make `record_action` a single atomic step, so a
/// crash can never leave a ready-time entry without index membership or
/// vice versa.
pub trait DeferredActionStore: Send + Sync + Clone {
    /// Records a new pending action under `kind` and `network`.
    ///
    /// Appends `id` to the index (exactly once; re-recording an existing
    /// id only refreshes its ready-time) and stores `ready_at` under the
    /// per-id key, both in one atomic step.
    fn record_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
        ready_at: u64,
    ) -> Result<()>;

    /// Returns an immutable snapshot of the index, in insertion order. An
    /// absent index and an empty index are both an empty `Vec`; callers
    /// cannot (and must not) tell the difference.
    fn action_index(
        &self,
        kind: ActionKind,
        network: &str,
    ) -> Result<Vec<ActionId>>;

    /// Returns the ready-time of the given action, if it is still stored.
    fn ready_at(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> Result<Option<u64>>;

    /// Checks whether the given action is currently recorded.
    fn contains_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> Result<bool> {
        Ok(self.ready_at(kind, network, id)?.is_some())
    }

    /// Removes the given actions: deletes each per-id entry and rewrites
    /// the surviving index once. An index emptied this way is written back
    /// empty rather than deleted.
    fn remove_actions(
        &self,
        kind: ActionKind,
        network: &str,
        ids: &[ActionId],
    ) -> Result<()>;
}

/// A store for the per-network high-water mark of bridge message sequence
/// numbers that have already been queued.
pub trait SequenceTrackerStore: Send + Sync {
    /// Get the last queued sequence number for the network.
    /// If not found, returns `default_sequence`.
    fn get_last_sequence(
        &self,
        network: &str,
        default_sequence: u64,
    ) -> Result<u64>;

    /// Sets the last queued sequence number for the network and returns
    /// the old one.
    fn set_last_sequence(&self, network: &str, sequence: u64) -> Result<u64>;
}

impl<S> DeferredActionStore for Arc<S>
where
    S: DeferredActionStore,
{
    fn record_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
        ready_at: u64,
    ) -> Result<()> {
        S::record_action(self, kind, network, id, ready_at)
    }

    fn action_index(
        &self,
        kind: ActionKind,
        network: &str,
    ) -> Result<Vec<ActionId>> {
        S::action_index(self, kind, network)
    }

    fn ready_at(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> Result<Option<u64>> {
        S::ready_at(self, kind, network, id)
    }

    fn contains_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> Result<bool> {
        S::contains_action(self, kind, network, id)
    }

    fn remove_actions(
        &self,
        kind: ActionKind,
        network: &str,
        ids: &[ActionId],
    ) -> Result<()> {
        S::remove_actions(self, kind, network, ids)
    }
}

impl<S> SequenceTrackerStore for Arc<S>
where
    S: SequenceTrackerStore,
{
    fn get_last_sequence(
        &self,
        network: &str,
        default_sequence: u64,
    ) -> Result<u64> {
        S::get_last_sequence(self, network, default_sequence)
    }

    fn set_last_sequence(&self, network: &str, sequence: u64) -> Result<u64> {
        S::set_last_sequence(self, network, sequence)
    }
}
