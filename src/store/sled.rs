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

use std::fmt::Debug;
use std::path::Path;

use sled::transaction::ConflictableTransactionError;

use super::{ActionId, ActionKind, DeferredActionStore, SequenceTrackerStore};

const ACTIONS_TREE: &str = "deferred_actions";
const SEQUENCES_TREE: &str = "last_sequences";

/// SledStore is a store that keeps the pending actions and sequence
/// high-water marks in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    fn index_key(kind: ActionKind, network: &str) -> String {
        format!("idx/{kind}/{network}")
    }

    fn action_key(kind: ActionKind, network: &str, id: &ActionId) -> String {
        format!("act/{kind}/{network}/{id}")
    }
}

impl DeferredActionStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn record_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
        ready_at: u64,
    ) -> crate::Result<()> {
        let tree = self.db.open_tree(ACTIONS_TREE)?;
        let index_key = Self::index_key(kind, network);
        let action_key = Self::action_key(kind, network, id);
        let ready_at_bytes = serde_json::to_vec(&ready_at)?;
        // both the index membership and the ready-time land in one
        // transaction, so a crash can never leave an orphaned entry.
        tree.transaction(|tx| {
            let mut ids: Vec<ActionId> = match tx.get(index_key.as_bytes())? {
                Some(raw) => serde_json::from_slice(&raw)
                    .map_err(ConflictableTransactionError::Abort)?,
                None => Vec::new(),
            };
            if !ids.contains(id) {
                ids.push(id.clone());
                let encoded = serde_json::to_vec(&ids)
                    .map_err(ConflictableTransactionError::Abort)?;
                tx.insert(index_key.as_bytes(), encoded)?;
            }
            tx.insert(action_key.as_bytes(), ready_at_bytes.as_slice())?;
            Ok(())
        })?;
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn action_index(
        &self,
        kind: ActionKind,
        network: &str,
    ) -> crate::Result<Vec<ActionId>> {
        let tree = self.db.open_tree(ACTIONS_TREE)?;
        match tree.get(Self::index_key(kind, network))? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    #[tracing::instrument(skip(self))]
    fn ready_at(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> crate::Result<Option<u64>> {
        let tree = self.db.open_tree(ACTIONS_TREE)?;
        match tree.get(Self::action_key(kind, network, id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn remove_actions(
        &self,
        kind: ActionKind,
        network: &str,
        ids: &[ActionId],
    ) -> crate::Result<()> {
        let tree = self.db.open_tree(ACTIONS_TREE)?;
        let index_key = Self::index_key(kind, network);
        tree.transaction(|tx| {
            let stored: Vec<ActionId> = match tx.get(index_key.as_bytes())? {
                Some(raw) => serde_json::from_slice(&raw)
                    .map_err(ConflictableTransactionError::Abort)?,
                None => Vec::new(),
            };
            let kept: Vec<ActionId> = stored
                .into_iter()
                .filter(|stored_id| !ids.contains(stored_id))
                .collect();
            let encoded = serde_json::to_vec(&kept)
                .map_err(ConflictableTransactionError::Abort)?;
            // an index emptied by removing every action stays behind as an
            // empty record; readers treat it the same as an absent key.
            tx.insert(index_key.as_bytes(), encoded)?;
            for id in ids {
                tx.remove(Self::action_key(kind, network, id).as_bytes())?;
            }
            Ok(())
        })?;
        self.db.flush()?;
        Ok(())
    }
}

impl SequenceTrackerStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn get_last_sequence(
        &self,
        network: &str,
        default_sequence: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree(SEQUENCES_TREE)?;
        let val = tree.get(network.as_bytes())?;
        match val {
            Some(v) => {
                let mut output = [0u8; 8];
                output.copy_from_slice(&v);
                Ok(u64::from_le_bytes(output))
            }
            None => Ok(default_sequence),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_last_sequence(
        &self,
        network: &str,
        sequence: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree(SEQUENCES_TREE)?;
        let bytes = sequence.to_le_bytes();
        let old = tree.insert(network.as_bytes(), &bytes)?;
        match old {
            Some(v) => {
                let mut output = [0u8; 8];
                output.copy_from_slice(&v);
                Ok(u64::from_le_bytes(output))
            }
            None => Ok(sequence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionKind::{BridgeMessage, Proposal};

    fn store() -> SledStore {
        let tmp = tempfile::tempdir().unwrap();
        SledStore::open(tmp.path()).unwrap()
    }

    fn id(s: &str) -> ActionId {
        ActionId::new(s).unwrap()
    }

    #[test]
    fn record_action_round_trips_exactly_once() {
        let store = store();
        store.record_action(Proposal, "base", &id("42"), 1000).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("42")]
        );
        assert_eq!(
            store.ready_at(Proposal, "base", &id("42")).unwrap(),
            Some(1000)
        );

        // re-recording only refreshes the ready-time.
        store.record_action(Proposal, "base", &id("42"), 2000).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("42")]
        );
        assert_eq!(
            store.ready_at(Proposal, "base", &id("42")).unwrap(),
            Some(2000)
        );
    }

    #[test]
    fn index_keeps_insertion_order() {
        let store = store();
        for s in ["10", "2", "30"] {
            store.record_action(Proposal, "base", &id(s), 0).unwrap();
        }
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("10"), id("2"), id("30")]
        );
    }

    #[test]
    fn networks_are_isolated() {
        let store = store();
        store.record_action(Proposal, "base", &id("1"), 0).unwrap();
        store.record_action(Proposal, "moonbeam", &id("2"), 0).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("1")]
        );
        assert_eq!(
            store.action_index(Proposal, "moonbeam").unwrap(),
            vec![id("2")]
        );
        assert!(!store.contains_action(Proposal, "base", &id("2")).unwrap());
    }

    #[test]
    fn kinds_are_isolated_within_a_network() {
        let store = store();
        // the same numeric id on the same network, one per concern.
        store.record_action(Proposal, "base", &id("10"), 0).unwrap();
        store
            .record_action(BridgeMessage, "base", &id("10"), 500)
            .unwrap();
        assert_eq!(
            store.ready_at(Proposal, "base", &id("10")).unwrap(),
            Some(0)
        );
        assert_eq!(
            store.ready_at(BridgeMessage, "base", &id("10")).unwrap(),
            Some(500)
        );

        // draining one concern leaves the other untouched.
        store.remove_actions(BridgeMessage, "base", &[id("10")]).unwrap();
        assert_eq!(
            store.action_index(BridgeMessage, "base").unwrap(),
            Vec::<ActionId>::new()
        );
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("10")]
        );
    }

    #[test]
    fn remove_actions_deletes_both_entries() {
        let store = store();
        store.record_action(Proposal, "base", &id("10"), 0).unwrap();
        store.record_action(Proposal, "base", &id("20"), 0).unwrap();
        store.remove_actions(Proposal, "base", &[id("10")]).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("20")]
        );
        assert_eq!(store.ready_at(Proposal, "base", &id("10")).unwrap(), None);
        assert_eq!(
            store.ready_at(Proposal, "base", &id("20")).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn emptied_index_reads_the_same_as_an_absent_one() {
        let store = store();
        store.record_action(Proposal, "base", &id("10"), 0).unwrap();
        store.remove_actions(Proposal, "base", &[id("10")]).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            Vec::<ActionId>::new()
        );
        assert_eq!(
            store.action_index(Proposal, "never-seen").unwrap(),
            Vec::<ActionId>::new()
        );
    }

    #[test]
    fn last_sequence_high_water_mark() {
        let store = store();
        assert_eq!(store.get_last_sequence("base", 0).unwrap(), 0);
        store.set_last_sequence("base", 7).unwrap();
        assert_eq!(store.get_last_sequence("base", 0).unwrap(), 7);
        let old = store.set_last_sequence("base", 8).unwrap();
        assert_eq!(old, 7);
        assert_eq!(store.get_last_sequence("base", 0).unwrap(), 8);
    }
}
