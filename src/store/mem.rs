use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ActionId, ActionKind, DeferredActionStore, SequenceTrackerStore};

#[derive(Debug, Default)]
struct NetworkActions {
    index: Vec<ActionId>,
    ready_at: HashMap<ActionId, u64>,
}

/// An in-memory twin of the sled store, used in tests and dry runs.
///
/// One lock guards both the index and the ready-times of a network, so
/// `record_action` stays a single atomic step here too.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    actions: Arc<RwLock<HashMap<(ActionKind, String), NetworkActions>>>,
    last_sequences: Arc<RwLock<HashMap<String, u64>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl DeferredActionStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn record_action(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
        ready_at: u64,
    ) -> crate::Result<()> {
        let mut guard = self.actions.write();
        let entry = guard.entry((kind, network.to_owned())).or_default();
        if !entry.index.contains(id) {
            entry.index.push(id.clone());
        }
        entry.ready_at.insert(id.clone(), ready_at);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn action_index(
        &self,
        kind: ActionKind,
        network: &str,
    ) -> crate::Result<Vec<ActionId>> {
        let guard = self.actions.read();
        Ok(guard
            .get(&(kind, network.to_owned()))
            .map(|entry| entry.index.clone())
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    fn ready_at(
        &self,
        kind: ActionKind,
        network: &str,
        id: &ActionId,
    ) -> crate::Result<Option<u64>> {
        let guard = self.actions.read();
        Ok(guard
            .get(&(kind, network.to_owned()))
            .and_then(|entry| entry.ready_at.get(id).copied()))
    }

    #[tracing::instrument(skip(self))]
    fn remove_actions(
        &self,
        kind: ActionKind,
        network: &str,
        ids: &[ActionId],
    ) -> crate::Result<()> {
        let mut guard = self.actions.write();
        if let Some(entry) = guard.get_mut(&(kind, network.to_owned())) {
            entry.index.retain(|stored_id| !ids.contains(stored_id));
            for id in ids {
                entry.ready_at.remove(id);
            }
        }
        Ok(())
    }
}

impl SequenceTrackerStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_last_sequence(
        &self,
        network: &str,
        default_sequence: u64,
    ) -> crate::Result<u64> {
        let guard = self.last_sequences.read();
        Ok(guard.get(network).copied().unwrap_or(default_sequence))
    }

    #[tracing::instrument(skip(self))]
    fn set_last_sequence(
        &self,
        network: &str,
        sequence: u64,
    ) -> crate::Result<u64> {
        let mut guard = self.last_sequences.write();
        let val = guard.entry(network.to_owned()).or_insert(sequence);
        let old = *val;
        *val = sequence;
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionKind::{BridgeMessage, Proposal};

    fn id(s: &str) -> ActionId {
        ActionId::new(s).unwrap()
    }

    #[test]
    fn behaves_like_the_sled_store() {
        let store = InMemoryStore::default();
        store.record_action(Proposal, "base", &id("42"), 1000).unwrap();
        store.record_action(Proposal, "base", &id("42"), 2000).unwrap();
        store.record_action(Proposal, "base", &id("7"), 0).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("42"), id("7")]
        );
        assert_eq!(
            store.ready_at(Proposal, "base", &id("42")).unwrap(),
            Some(2000)
        );

        store.remove_actions(Proposal, "base", &[id("42")]).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("7")]
        );
        assert_eq!(store.ready_at(Proposal, "base", &id("42")).unwrap(), None);

        assert_eq!(store.get_last_sequence("base", 3).unwrap(), 3);
        store.set_last_sequence("base", 4).unwrap();
        assert_eq!(store.get_last_sequence("base", 3).unwrap(), 4);
    }

    #[test]
    fn kinds_do_not_share_an_index() {
        let store = InMemoryStore::default();
        store.record_action(Proposal, "base", &id("10"), 0).unwrap();
        store
            .record_action(BridgeMessage, "base", &id("10"), 500)
            .unwrap();
        store.remove_actions(BridgeMessage, "base", &[id("10")]).unwrap();
        assert_eq!(
            store.action_index(Proposal, "base").unwrap(),
            vec![id("10")]
        );
        assert!(store
            .action_index(BridgeMessage, "base")
            .unwrap()
            .is_empty());
    }
}
