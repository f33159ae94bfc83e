//! The poll-and-process scan over a network's pending actions.
//!
//! Each poll cycle takes an immutable snapshot of the index, decides the
//! fate of every action in it, and rewrites the surviving index once at
//! the end. Mutating the index while iterating is exactly the hazard this
//! module exists to avoid.

use std::future::Future;

use crate::error::Result;
use crate::store::{ActionId, ActionKind, DeferredActionStore, PendingAction};

/// The tri-state outcome an executor reports for a ready action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action was carried out; remove it and report success.
    Succeeded,
    /// The action failed terminally (revert, exhausted fetch budget);
    /// remove it and flag it for manual intervention. It is not retried.
    Failed,
    /// The action is not actionable yet; leave it untouched.
    NotReady,
}

/// What a single poll cycle did, so the caller can log or assert on it.
/// Notifications are the executor's business, not the poller's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Actions executed and removed.
    pub succeeded: Vec<ActionId>,
    /// Actions terminally failed and removed.
    pub failed: Vec<ActionId>,
    /// Actions whose ready-time was already gone; removed as consumed.
    pub consumed: Vec<ActionId>,
}

impl PollReport {
    /// Whether the cycle removed anything from the store.
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty()
            && self.failed.is_empty()
            && self.consumed.is_empty()
    }
}

/// Scans the pending actions of one kind on `network` and executes those
/// whose ready-time has elapsed.
///
/// For each id in the index snapshot:
/// - a missing ready-time means the action was already consumed; it is
///   marked for removal without invoking the executor;
/// - a malformed store entry or an executor error aborts that id only,
///   leaving it pending; the scan continues with the next id;
/// - `now < ready_at` skips the id without any mutation;
/// - otherwise the executor decides via [`Outcome`]; `Succeeded` and
///   `Failed` both remove the id (the distinction only matters for the
///   caller's notifications), `NotReady` leaves it.
///
/// The index is rewritten once, and only if at least one id was removed.
#[tracing::instrument(skip(store, executor))]
pub async fn poll_and_process<S, F, Fut>(
    store: &S,
    kind: ActionKind,
    network: &str,
    now: u64,
    mut executor: F,
) -> Result<PollReport>
where
    S: DeferredActionStore,
    F: FnMut(PendingAction) -> Fut,
    Fut: Future<Output = Result<Outcome>>,
{
    let mut report = PollReport::default();
    let ids = store.action_index(kind, network)?;
    if ids.is_empty() {
        tracing::trace!(%kind, %network, "no pending actions");
        return Ok(report);
    }
    tracing::debug!(
        %kind,
        %network,
        count = ids.len(),
        "scanning pending actions",
    );
    let mut removed: Vec<ActionId> = Vec::new();
    for id in ids {
        let ready_at = match store.ready_at(kind, network, &id) {
            Ok(Some(ready_at)) => ready_at,
            Ok(None) => {
                tracing::debug!(
                    %network,
                    %id,
                    "ready-time missing, treating as already consumed",
                );
                report.consumed.push(id.clone());
                removed.push(id);
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    %network,
                    %id,
                    error = %e,
                    "malformed store entry, leaving it pending",
                );
                continue;
            }
        };
        if now < ready_at {
            tracing::trace!(
                %network,
                %id,
                ready_at,
                now,
                "not ready yet, skipping",
            );
            continue;
        }
        let action = PendingAction {
            id: id.clone(),
            ready_at,
        };
        match executor(action).await {
            Ok(Outcome::Succeeded) => {
                report.succeeded.push(id.clone());
                removed.push(id);
            }
            Ok(Outcome::Failed) => {
                report.failed.push(id.clone());
                removed.push(id);
            }
            Ok(Outcome::NotReady) => {
                tracing::trace!(%network, %id, "not actionable, skipping");
            }
            Err(e) => {
                tracing::warn!(
                    %network,
                    %id,
                    error = %e,
                    "action processing aborted, will retry next cycle",
                );
            }
        }
    }
    if !removed.is_empty() {
        store.remove_actions(kind, network, &removed)?;
    }
    Ok(report)
}
