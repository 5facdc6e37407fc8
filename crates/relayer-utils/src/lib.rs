// Copyright 2022 Webb Technologies Inc.
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

use ethers::providers::ProviderError;

/// Metrics functionality
pub mod metric;
/// Multi provider for ethers.
pub mod multi_provider;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// bridge relayer.
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
    /// Error in Http/Ws Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Config parse error.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Contract ABI encoding or decoding failed.
    #[error("ABI error: {}", _0)]
    Abi(String),
    /// A JSON-RPC call failed with the given message.
    #[error("RPC error: {}", _0)]
    Rpc(String),
    /// Sending or confirming a transaction failed.
    #[error("Transaction error: {}", _0)]
    Transaction(String),
    /// Chain with the given domain id is not configured.
    #[error("Chain Not Found: {}", domain_id)]
    ChainNotFound {
        /// The domain id of the chain.
        domain_id: u8,
    },
    /// Provider not found error.
    #[error("Provider not found for index {0}")]
    ProviderNotFound(usize),
    /// Missing required private key for a local signer.
    #[error("Missing required private-key in the config for chain {}", _0)]
    MissingSecrets(String),
    /// The configured signer backend is not linked into this build.
    #[error("Unsupported signer backend `{backend}` for chain {chain}")]
    UnsupportedSigner {
        /// The backend name, e.g. `kms`.
        backend: String,
        /// The chain name.
        chain: String,
    },
    /// The configuration is invalid.
    #[error("Invalid configuration: {}", _0)]
    InvalidConfig(String),
    /// A message could not be turned into a proposal.
    #[error("Invalid message: {}", _0)]
    InvalidMessage(String),
    /// A deposit event could not be decoded.
    #[error("Invalid deposit data: {}", _0)]
    InvalidDepositData(String),
    /// The event subscription transport is not available.
    #[error("Event subscription unavailable: {}", _0)]
    SubscriptionUnavailable(String),
    /// A channel was closed while its peer was still running.
    #[error("Channel closed: {}", _0)]
    ChannelClosed(&'static str),
    /// The operation was abandoned because the relayer is shutting down.
    #[error("Operation cancelled")]
    Cancelled,
    /// a background task failed and stopped Abnormally.
    #[error("Task Stopped Abnormally: {}", _0)]
    TaskStoppedAbnormally(String),
}

/// How an RPC related [`Error`] should be treated by callers that retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network hiccups, timeouts, rate limits, full mempool. Worth retrying.
    Transient,
    /// The node already knows a transaction with this nonce, most likely
    /// submitted by another instance sharing the key.
    NonceConflict,
    /// Retrying will not help.
    Permanent,
}

const NONCE_CONFLICT_PATTERNS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "invalid nonce",
    "replacement transaction underpriced",
    "already known",
    "known transaction",
    "transaction already imported",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "connect",
    "broken pipe",
    "reset by peer",
    "eof",
    "header not found",
    "429",
    "too many requests",
    "rate limit",
    "txpool is full",
    "mempool is full",
    "transaction pool is full",
    "service unavailable",
    "bad gateway",
    "dropped",
];

impl Error {
    /// Classifies this error for retry purposes.
    pub fn classify(&self) -> ErrorClass {
        match self {
            Error::Io(_) => ErrorClass::Transient,
            Error::EthersProvider(ProviderError::HTTPError(_)) => {
                ErrorClass::Transient
            }
            Error::EthersProvider(e) => classify_message(&e.to_string()),
            Error::Rpc(msg) | Error::Transaction(msg) => classify_message(msg),
            _ => ErrorClass::Permanent,
        }
    }

    /// Shorthand for `classify() == ErrorClass::Transient`.
    pub fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }
}

fn classify_message(msg: &str) -> ErrorClass {
    let msg = msg.to_lowercase();
    if NONCE_CONFLICT_PATTERNS.iter().any(|p| msg.contains(p)) {
        ErrorClass::NonceConflict
    } else if TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// A type alias for the result for the bridge relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
