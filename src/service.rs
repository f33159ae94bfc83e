//! A module for starting the long-running relayer tasks.
//!
//! `ignite` walks the configured networks and spawns one task per
//! contract found on each: a vote emitter for a vote collection contract,
//! a proposal executor for a governor, and a queuer plus a queued
//! executor for a temporal governor. Every task reruns on the network's
//! polling interval until the context broadcasts shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::chains::{EvmGovernor, EvmTemporalGovernor, EvmVoteCollection};
use crate::context::RelayerContext;
use crate::notify::{Notifications, WebhookNotifier};
use crate::probe;
use crate::store::SledStore;
use crate::tasks::{ProposalExecutor, QueuedExecutor, VaaQueuer, VoteEmitter};
use crate::utils;
use crate::vaa::VaaFetcher;

/// The store type the service runs against.
pub type Store = SledStore;

/// Sets up the notification sink and starts the tasks of every enabled
/// network. Returns once everything is spawned.
pub async fn ignite(
    ctx: &RelayerContext,
    store: Arc<Store>,
) -> crate::Result<()> {
    tracing::debug!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&ctx.config)?
    );
    let sink = Arc::new(WebhookNotifier::new(&ctx.config.notifications));
    let notifications =
        Notifications::new(sink, &ctx.config.notifications.channel_alias);
    let fetcher = ctx.config.vaa_service.as_ref().map(VaaFetcher::new);
    for name in ctx.config.networks.keys() {
        start_vote_emitter(ctx, name, store.clone(), notifications.clone())?;
        start_proposal_executor(
            ctx,
            name,
            store.clone(),
            notifications.clone(),
        )?;
        start_temporal_governor_tasks(
            ctx,
            name,
            store.clone(),
            notifications.clone(),
            fetcher.as_ref(),
        )?;
    }
    Ok(())
}

fn start_vote_emitter(
    ctx: &RelayerContext,
    network_name: &str,
    store: Arc<Store>,
    notifications: Notifications,
) -> crate::Result<()> {
    let network = ctx.network(network_name)?;
    let Some(address) = network.contracts.vote_collection else {
        return Ok(());
    };
    let Some(governor_network) = network.governor_network.clone() else {
        tracing::warn!(
            "{} has a vote collection contract but no governor-network, \
             the vote emitter will not start",
            network_name,
        );
        return Ok(());
    };
    let Some(governor_address) = ctx
        .network(&governor_network)
        .ok()
        .and_then(|n| n.contracts.governor)
    else {
        tracing::warn!(
            "{} does not carry a governor contract, the vote emitter on {} \
             will not start",
            governor_network,
            network_name,
        );
        return Ok(());
    };
    // the governor is only queried here, a plain provider is enough.
    let governor_provider = Arc::new(ctx.evm_provider(&governor_network)?);
    let worker = VoteEmitter::new(
        network_name,
        EvmGovernor::new(governor_address, governor_provider),
        EvmVoteCollection::new(address, ctx.signer(network_name)?),
        store,
        notifications,
        network.explorer.clone(),
    );
    let mut shutdown = ctx.shutdown_signal();
    let interval = Duration::from_millis(network.polling_interval);
    let task_name = format!("vote emitter for {network_name}");
    tracing::debug!("Starting {}", task_name);
    tokio::task::spawn(async move {
        let cycles = async {
            loop {
                if let Err(e) = worker.run_cycle(utils::unix_now()).await {
                    tracing::error!(
                        target: probe::TARGET,
                        kind = %probe::Kind::Votes,
                        error = %e,
                        "{} cycle failed",
                        task_name,
                    );
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::select! {
            _ = cycles => {},
            _ = shutdown.recv() => {
                tracing::trace!("Stopping {}", task_name);
            },
        }
    });
    Ok(())
}

fn start_proposal_executor(
    ctx: &RelayerContext,
    network_name: &str,
    store: Arc<Store>,
    notifications: Notifications,
) -> crate::Result<()> {
    let network = ctx.network(network_name)?;
    let Some(address) = network.contracts.governor else {
        return Ok(());
    };
    let Some(sender_network) = network.sender_network.clone() else {
        tracing::warn!(
            "{} has a governor contract but no sender-network, the proposal \
             executor will not start",
            network_name,
        );
        return Ok(());
    };
    let worker = ProposalExecutor::new(
        network_name,
        sender_network,
        EvmGovernor::new(address, ctx.signer(network_name)?),
        store,
        notifications,
        network.explorer.clone(),
    );
    let mut shutdown = ctx.shutdown_signal();
    let interval = Duration::from_millis(network.polling_interval);
    let task_name = format!("proposal executor for {network_name}");
    tracing::debug!("Starting {}", task_name);
    tokio::task::spawn(async move {
        let cycles = async {
            loop {
                if let Err(e) = worker.run_cycle(utils::unix_now()).await {
                    tracing::error!(
                        target: probe::TARGET,
                        kind = %probe::Kind::Execute,
                        error = %e,
                        "{} cycle failed",
                        task_name,
                    );
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::select! {
            _ = cycles => {},
            _ = shutdown.recv() => {
                tracing::trace!("Stopping {}", task_name);
            },
        }
    });
    Ok(())
}

fn start_temporal_governor_tasks(
    ctx: &RelayerContext,
    network_name: &str,
    store: Arc<Store>,
    notifications: Notifications,
    fetcher: Option<&VaaFetcher>,
) -> crate::Result<()> {
    let network = ctx.network(network_name)?;
    let Some(address) = network.contracts.temporal_governor else {
        return Ok(());
    };
    let Some(fetcher) = fetcher else {
        tracing::warn!(
            "{} has a temporal governor but no vaa-service is configured, \
             its tasks will not start",
            network_name,
        );
        return Ok(());
    };
    let signer = ctx.signer(network_name)?;
    let queuer = VaaQueuer::new(
        network_name,
        EvmTemporalGovernor::new(address, signer.clone()),
        fetcher.clone(),
        store.clone(),
        notifications.clone(),
        network.explorer.clone(),
        network.timelock_delay,
    );
    let executor = QueuedExecutor::new(
        network_name,
        EvmTemporalGovernor::new(address, signer),
        fetcher.clone(),
        store,
        notifications,
        network.explorer.clone(),
    );
    let mut shutdown = ctx.shutdown_signal();
    let interval = Duration::from_millis(network.polling_interval);
    let task_name = format!("temporal governor tasks for {network_name}");
    tracing::debug!("Starting {}", task_name);
    tokio::task::spawn(async move {
        let cycles = async {
            loop {
                // queue first so a message signed and timelocked with a
                // zero delay can execute within the same cycle.
                let now = utils::unix_now();
                if let Err(e) = queuer.run_cycle(now).await {
                    tracing::error!(
                        target: probe::TARGET,
                        kind = %probe::Kind::Queue,
                        error = %e,
                        "{} queueing cycle failed",
                        task_name,
                    );
                }
                if let Err(e) = executor.run_cycle(utils::unix_now()).await {
                    tracing::error!(
                        target: probe::TARGET,
                        kind = %probe::Kind::Execute,
                        error = %e,
                        "{} execution cycle failed",
                        task_name,
                    );
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::select! {
            _ = cycles => {},
            _ = shutdown.recv() => {
                tracing::trace!("Stopping {}", task_name);
            },
        }
    });
    Ok(())
}
