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
//
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use url::Url;

const fn default_timelock_delay() -> u64 {
    0
}

const fn default_polling_interval() -> u64 {
    60_000
}

const fn default_max_retries() -> usize {
    5
}

const fn default_initial_delay() -> u64 {
    2_000
}

fn default_channel_alias() -> String {
    "governance-alerts".to_string()
}

/// RelayerConfig is the configuration for the governance relayer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// EVM networks and their configuration.
    ///
    /// a map between network name and its configuration.
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
    /// The VAA attestation service. Required for networks that carry a
    /// temporal governor contract.
    #[serde(default)]
    pub vaa_service: Option<VaaServiceConfig>,
    /// Operator notification endpoints.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// NetworkConfig is the configuration of one EVM network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Whether this network's tasks run at all.
    #[serde(default)]
    pub enabled: bool,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: Url,
    /// Block Explorer for this network.
    ///
    /// Optional, and only used for printing clickable links
    /// for transactions.
    #[serde(skip_serializing)]
    pub explorer: Option<Url>,
    /// chain specific id.
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The Private Key of this account on this network.
    /// the format is more dynamic here:
    /// 1. if it starts with '0x' then this would be a raw (32 bytes) hex
    ///    encoded private key.
    /// 2. if it starts with '$' then it would be considered as an
    ///    environment variable holding a hex-encoded private key.
    ///    Example: $BASE_PRIVATE_KEY
    #[serde(skip_serializing)]
    pub private_key: PrivateKey,
    /// The governance contracts deployed on this network.
    #[serde(default)]
    pub contracts: ContractsConfig,
    /// The network whose pending proposal queue this network's governor
    /// executes from. Required when `contracts.governor` is set.
    #[serde(default)]
    pub sender_network: Option<String>,
    /// The network carrying the hub governor this network's vote
    /// collection reports to. Required when `contracts.vote-collection`
    /// is set.
    #[serde(default)]
    pub governor_network: Option<String>,
    /// The timelock of the temporal governor, in seconds. Queued bridge
    /// messages become executable this long after queueing.
    #[serde(default = "default_timelock_delay")]
    pub timelock_delay: u64,
    /// How often this network's tasks run, in milliseconds.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
}

/// The governance contract addresses on one network. All optional; each
/// present address starts the corresponding automation task.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractsConfig {
    /// The hub governor.
    pub governor: Option<Address>,
    /// The spoke vote collection contract.
    pub vote_collection: Option<Address>,
    /// The spoke temporal governor.
    pub temporal_governor: Option<Address>,
}

/// VaaServiceConfig is the configuration of the VAA attestation service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VaaServiceConfig {
    /// The endpoint serving signed bridge messages.
    pub endpoint: Url,
    /// How many times a missing message is retried before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// The delay before the first retry, in milliseconds. Doubled on
    /// every subsequent retry.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,
}

/// NotificationsConfig is the configuration of the operator notification
/// endpoints. Both are optional; an unconfigured endpoint drops its
/// notifications.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotificationsConfig {
    /// The internal endpoint plain channel messages are posted to.
    #[serde(default)]
    pub channel_endpoint: Option<Url>,
    /// The channel alias stamped on every channel message.
    #[serde(default = "default_channel_alias")]
    pub channel_alias: String,
    /// The chat webhook rich cards are posted to. Webhook URLs carry a
    /// secret token, so the `$ENV_VAR` indirection is supported here too.
    #[serde(default, skip_serializing)]
    pub webhook: Option<WebhookUrl>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channel_endpoint: None,
            channel_alias: default_channel_alias(),
            webhook: None,
        }
    }
}

/// A signer private key. Never serialized, redacted in Debug output.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl PrivateKey {
    /// The raw key bytes, for constructing a wallet.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl serde::de::Visitor<'_> for PrivateKeyVistor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    // hex value
                    let maybe_hex = H256::from_str(value);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n got {value} but expected a 66 chars string (including the 0x prefix)"))),
                    }
                } else if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    let maybe_hex = H256::from_str(&val);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n got {val} but expected a 66 chars string (including the 0x prefix) but found {} chars", val.len()))),
                    }
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected a 0x-prefixed hex key or a $ENV_VAR reference, got {value}",
                    )))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

/// A webhook URL. Treated as a secret: redacted in Debug output and
/// loadable through the `$ENV_VAR` indirection.
#[derive(Clone)]
pub struct WebhookUrl(Url);

impl From<WebhookUrl> for Url {
    fn from(url: WebhookUrl) -> Self {
        url.0
    }
}

impl std::fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookUrl").finish()
    }
}

impl<'de> Deserialize<'de> for WebhookUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct WebhookUrlVistor;
        impl serde::de::Visitor<'_> for WebhookUrlVistor {
            type Value = Url;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter
                    .write_str("a url or an env var containing a url in it")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with('$') {
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    Url::parse(&val).map_err(serde::de::Error::custom)
                } else {
                    Url::parse(value).map_err(serde::de::Error::custom)
                }
            }
        }

        let url = deserializer.deserialize_str(WebhookUrlVistor)?;
        Ok(Self(url))
    }
}

/// Loads the relayer configuration from every toml and json file in the
/// given directory and its subdirectories, merged with the environment.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<RelayerConfig> {
    let mut cfg = config::Config::new();
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", path.as_ref().display());
    let json_pattern = format!("{}/**/*.json", path.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let config_files = glob::glob(&toml_pattern)?
        .flatten()
        .chain(glob::glob(&json_pattern)?.flatten());
    for config_file in config_files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        let file = config::File::from(config_file).format(format);
        if let Err(e) = cfg.merge(file) {
            tracing::warn!("Error while loading config file: {} skipping!", e);
            continue;
        }
    }

    // also merge in the environment (with a prefix of XGOV).
    cfg.merge(config::Environment::with_prefix("XGOV").separator("_"))?;
    // and finally deserialize the config and post-process it
    let config: Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            anyhow::bail!("Error while loading config files")
        }
    }
}

// The postloading_process exists to validate configuration and standardize
// the format of the configuration
fn postloading_process(
    mut config: RelayerConfig,
) -> anyhow::Result<RelayerConfig> {
    tracing::trace!("Checking configuration sanity ...");
    tracing::trace!("postloaded config: {:?}", config);
    // make all network names lower case
    // 1. drain everything, and take enabled networks.
    let old_networks = config
        .networks
        .drain()
        .filter(|(_, network)| network.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, as lowercased, along with the cross-network
    // references they carry.
    for (k, mut v) in old_networks {
        v.sender_network = v.sender_network.map(|n| n.to_lowercase());
        v.governor_network = v.governor_network.map(|n| n.to_lowercase());
        config.networks.insert(k.to_lowercase(), v);
    }
    // check that all referenced networks are present in the config.
    for (network_name, network) in &config.networks {
        for reference in [&network.sender_network, &network.governor_network]
            .into_iter()
            .flatten()
        {
            if !config.networks.contains_key(reference) {
                tracing::warn!(
                    "!!WARNING!!: network {} is not defined in the config.
                    which is referenced by the {} network configuration.
                    Please, define it manually, to allow the relayer to work properly.",
                    reference,
                    network_name,
                );
            }
        }
        if network.contracts.temporal_governor.is_some()
            && config.vaa_service.is_none()
        {
            tracing::warn!(
                "!!WARNING!!: network {} has a temporal governor but no
                vaa-service is configured; its tasks will not start.",
                network_name,
            );
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [vaa-service]
        endpoint = "https://vaa.example.com/signed-vaa"

        [notifications]
        channel-alias = "gov-ops"

        [networks.Base]
        enabled = true
        http-endpoint = "https://base.example.com"
        chain-id = 8453
        private-key = "0x000000000000000000000000000000000000000000000000000000000000dead"
        governor-network = "Moonbeam"
        timelock-delay = 86400

        [networks.Base.contracts]
        vote-collection = "0x0000000000000000000000000000000000000001"
        temporal-governor = "0x0000000000000000000000000000000000000002"

        [networks.moonbeam]
        enabled = true
        http-endpoint = "https://moonbeam.example.com"
        chain-id = 1284
        private-key = "$XGOV_TEST_MOONBEAM_KEY"
        sender-network = "base"

        [networks.moonbeam.contracts]
        governor = "0x0000000000000000000000000000000000000003"

        [networks.disabled-net]
        http-endpoint = "https://nowhere.example.com"
        chain-id = 1
        private-key = "0x000000000000000000000000000000000000000000000000000000000000beef"
    "#;

    fn parse(s: &str) -> anyhow::Result<RelayerConfig> {
        let mut cfg = config::Config::new();
        cfg.merge(config::File::from_str(s, config::FileFormat::Toml))?;
        let config = serde_path_to_error::deserialize(cfg)
            .map_err(|e: serde_path_to_error::Error<config::ConfigError>| {
                anyhow::anyhow!("{e}")
            })?;
        postloading_process(config)
    }

    #[test]
    fn sample_config_parses_and_normalizes() {
        std::env::set_var(
            "XGOV_TEST_MOONBEAM_KEY",
            "0x000000000000000000000000000000000000000000000000000000000000cafe",
        );
        let config = parse(SAMPLE).unwrap();
        // disabled networks are dropped, names are lowercased.
        assert_eq!(config.networks.len(), 2);
        let base = &config.networks["base"];
        assert_eq!(base.chain_id, 8453);
        assert_eq!(base.governor_network.as_deref(), Some("moonbeam"));
        assert_eq!(base.timelock_delay, 86400);
        assert_eq!(base.polling_interval, 60_000);
        assert!(base.contracts.vote_collection.is_some());
        assert!(base.contracts.governor.is_none());

        let moonbeam = &config.networks["moonbeam"];
        assert_eq!(moonbeam.sender_network.as_deref(), Some("base"));
        assert_eq!(
            moonbeam.private_key.as_bytes()[30..],
            [0xca, 0xfe]
        );

        let vaa = config.vaa_service.unwrap();
        assert_eq!(vaa.max_retries, 5);
        assert_eq!(vaa.initial_delay, 2_000);
        assert_eq!(config.notifications.channel_alias, "gov-ops");
    }

    #[test]
    fn missing_env_var_fails_deserialization() {
        std::env::remove_var("XGOV_TEST_NO_SUCH_KEY");
        let result = parse(
            r#"
            [networks.base]
            enabled = true
            http-endpoint = "https://base.example.com"
            chain-id = 8453
            private-key = "$XGOV_TEST_NO_SUCH_KEY"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn private_key_debug_is_redacted() {
        std::env::set_var(
            "XGOV_TEST_MOONBEAM_KEY",
            "0x000000000000000000000000000000000000000000000000000000000000cafe",
        );
        let config = parse(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.networks["base"].private_key);
        assert_eq!(rendered, "PrivateKey");
        assert!(!rendered.contains("dead"));
    }
}
