//! The relayer context: the loaded configuration plus factories for the
//! per-network providers and signers, and the shutdown broadcast channel
//! every long-running task listens on.

use std::sync::Arc;
use std::time::Duration;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use tokio::sync::broadcast;

use crate::config::{NetworkConfig, RelayerConfig};
use crate::error::Error;

/// A provider with a signing wallet attached, bound to one network.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// RelayerContext holds the configuration and the shutdown channel shared
/// by every running task.
#[derive(Clone)]
pub struct RelayerContext {
    /// The loaded configuration.
    pub config: RelayerConfig,
    /// Broadcasts a shutdown signal to all the application clients.
    notify_shutdown: broadcast::Sender<()>,
}

impl RelayerContext {
    /// Creates a new relayer context.
    pub fn new(config: RelayerConfig) -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self {
            config,
            notify_shutdown,
        }
    }

    /// Returns a new `Shutdown` receiver; resolves when [`Self::shutdown`]
    /// is called.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// The configuration of the named network.
    pub fn network(&self, name: &str) -> crate::Result<&NetworkConfig> {
        self.config
            .networks
            .get(name)
            .ok_or_else(|| Error::NetworkNotFound {
                network: name.to_owned(),
            })
    }

    /// A read-only JSON-RPC provider for the named network.
    pub fn evm_provider(&self, name: &str) -> crate::Result<Provider<Http>> {
        let network = self.network(name)?;
        let provider = Provider::try_from(network.http_endpoint.as_str())?
            .interval(Duration::from_millis(5u64));
        Ok(provider)
    }

    /// The signing wallet of the named network, bound to its chain id.
    pub fn evm_wallet(&self, name: &str) -> crate::Result<LocalWallet> {
        let network = self.network(name)?;
        let wallet = LocalWallet::from_bytes(network.private_key.as_bytes())?
            .with_chain_id(network.chain_id);
        Ok(wallet)
    }

    /// A signing client for the named network.
    pub fn signer(&self, name: &str) -> crate::Result<Arc<SignerClient>> {
        let provider = self.evm_provider(name)?;
        let wallet = self.evm_wallet(name)?;
        Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single
/// value is ever sent. Once a value has been sent via the broadcast
/// channel, the tasks should shutdown.
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,
    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }
        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_network_is_an_error() {
        let ctx = RelayerContext::new(RelayerConfig::default());
        assert!(matches!(
            ctx.network("nowhere"),
            Err(Error::NetworkNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = RelayerContext::new(RelayerConfig::default());
        let mut first = ctx.shutdown_signal();
        let mut second = ctx.shutdown_signal();
        ctx.shutdown();
        first.recv().await;
        second.recv().await;
        // a second recv returns immediately.
        first.recv().await;
    }
}
