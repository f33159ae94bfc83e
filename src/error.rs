use ethers::providers::ProviderError;
use ethers::signers::WalletError;

/// An enum of all possible errors that could be encountered during the
/// execution of the relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// HTTP client error.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ProviderError),
    /// Ethers wallet error.
    #[error(transparent)]
    EthersWallet(#[from] WalletError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Sled transaction error.
    #[error(transparent)]
    SledTransaction(
        #[from] sled::transaction::TransactionError<serde_json::Error>,
    ),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Contract call failed or reverted.
    #[error("Contract call failed: {}", _0)]
    Contract(String),
    /// Network not found in the configuration.
    #[error("Network Not Found: {}", network)]
    NetworkNotFound {
        /// The name of the network.
        network: String,
    },
    /// An action id that is empty or contains the index delimiter.
    #[error("Invalid action id: {:?}", id)]
    InvalidActionId {
        /// The offending id.
        id: String,
    },
    /// A stored action id that does not parse back to a proposal id.
    #[error("Invalid proposal id: {}", _0)]
    InvalidProposalId(String),
    /// The fetch service returned a payload that is not valid hex bytes.
    #[error("Bridge message payload is not valid hex bytes")]
    InvalidVaaPayload,
    /// The fetch service responded, but the body is not the expected JSON.
    #[error("Bridge message response did not decode: {}", _0)]
    InvalidVaaResponse(#[source] reqwest::Error),
    /// The retry budget for fetching a signed bridge message ran out.
    ///
    /// Terminal for the calling action; it is not retried again until the
    /// next scheduled poll, if the action is still in the store.
    #[error(
        "Failed to fetch bridge message for sequence {} on {} after {} attempts",
        sequence,
        network,
        attempts
    )]
    FetchExhausted {
        /// The network the message belongs to.
        network: String,
        /// The bridge message sequence number.
        sequence: u64,
        /// Total attempts made, including the first one.
        attempts: usize,
    },
}

/// A type alias for the result of the relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
