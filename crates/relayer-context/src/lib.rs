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

#![warn(missing_docs)]
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer: its configuration,
//! metrics, block store, chain providers and the shutdown signal.
use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_config::evm::{EvmChainConfig, SignerConfig};
use bridge_relayer_config::RelayerConfig;
use bridge_relayer_store::SledStore;
use bridge_relayer_types::DomainId;
use bridge_relayer_utils::metric::Metrics;
use bridge_relayer_utils::multi_provider::MultiProvider;
use bridge_relayer_utils::Error;
use ethers::prelude::*;
use tokio_util::sync::CancellationToken;

mod ethers_retry_policy;
pub use ethers_retry_policy::BridgeHttpRetryPolicy;

/// The HTTP provider used for every EVM chain: requests are spread over the
/// configured endpoints and rate limited ones are retried.
pub type EvmProvider = Provider<RetryClient<MultiProvider<Http>>>;

/// Polling interval of pending transactions and filters.
const PROVIDER_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const RATE_LIMIT_RETRIES: u32 = 10;
const TIMEOUT_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// RelayerContext contains Relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: RelayerConfig,
    /// Cancelled once, when the relayer shuts down. Every task holds a clone.
    cancel: CancellationToken,
    /// Represents the metrics for the relayer
    pub metrics: Arc<Metrics>,
    store: SledStore,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: RelayerConfig,
        store: SledStore,
    ) -> bridge_relayer_utils::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
            metrics,
            store,
        })
    }

    /// Returns the token every task watches for the shutdown signal.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals all tasks to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// The configuration of the EVM chain with `domain_id`.
    pub fn evm_chain(
        &self,
        domain_id: DomainId,
    ) -> bridge_relayer_utils::Result<&EvmChainConfig> {
        self.config
            .evm_chain(domain_id)
            .ok_or(Error::ChainNotFound {
                domain_id: domain_id.into_inner(),
            })
    }

    /// Returns a new `EvmProvider` for the chain with `domain_id`.
    pub fn evm_provider(
        &self,
        domain_id: DomainId,
    ) -> bridge_relayer_utils::Result<Arc<EvmProvider>> {
        let chain = self.evm_chain(domain_id)?;
        let providers = std::iter::once(&chain.endpoint)
            .chain(&chain.fallback_endpoints)
            .map(|endpoint| Http::new(endpoint.as_url().clone()))
            .collect::<Vec<_>>();
        tracing::debug!(
            chain = %chain.name,
            endpoints = providers.len(),
            "Creating EVM provider",
        );
        let client = RetryClientBuilder::default()
            .rate_limit_retries(RATE_LIMIT_RETRIES)
            .timeout_retries(TIMEOUT_RETRIES)
            .initial_backoff(INITIAL_BACKOFF)
            .build(
                MultiProvider::new(Arc::new(providers)),
                BridgeHttpRetryPolicy::boxed(),
            );
        let provider = Provider::new(client).interval(PROVIDER_POLL_INTERVAL);
        Ok(Arc::new(provider))
    }

    /// Sets up and returns the wallet signing the votes of the chain with
    /// `domain_id`. `chain_id` is the EVM chain id used for replay
    /// protection.
    ///
    /// Only local signers are linked into the relayer, a configured `kms`
    /// signer is an [`Error::UnsupportedSigner`].
    pub fn evm_wallet(
        &self,
        domain_id: DomainId,
        chain_id: u64,
    ) -> bridge_relayer_utils::Result<LocalWallet> {
        let chain = self.evm_chain(domain_id)?;
        match &chain.signer {
            SignerConfig::Local { private_key } => {
                let private_key = private_key
                    .as_ref()
                    .ok_or_else(|| Error::MissingSecrets(chain.name.clone()))?;
                let wallet = LocalWallet::from_bytes(private_key.as_bytes())?
                    .with_chain_id(chain_id);
                Ok(wallet)
            }
            signer => Err(Error::UnsupportedSigner {
                backend: signer.backend().to_string(),
                chain: chain.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_relayer_config::ChainConfig;

    const KEY: &str =
        "0x000000000000000000000000000000000000000000000000000000000000beef";

    fn config(signer: &str) -> RelayerConfig {
        let raw = format!(
            r#"{{
                "chains": {{
                    "goerli": {{
                        "type": "evm",
                        "name": "goerli",
                        "id": 1,
                        "endpoint": "http://localhost:8545",
                        "fallback-endpoints": ["http://localhost:8546"],
                        "bridge": "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B",
                        "signer": {signer}
                    }}
                }}
            }}"#
        );
        serde_json::from_str(&raw).unwrap()
    }

    fn context(signer: &str) -> RelayerContext {
        RelayerContext::new(config(signer), SledStore::temporary().unwrap())
            .unwrap()
    }

    #[test]
    fn builds_a_wallet_for_local_signers() {
        let ctx = context(&format!(
            r#"{{ "type": "local", "private-key": "{KEY}" }}"#
        ));
        let wallet = ctx.evm_wallet(DomainId::new(1), 5).unwrap();
        assert_eq!(wallet.chain_id(), 5);
    }

    #[test]
    fn kms_signers_are_rejected() {
        let ctx = context(
            r#"{ "type": "kms", "key-id": "alias/relayer", "region": "eu-west-1" }"#,
        );
        let err = ctx.evm_wallet(DomainId::new(1), 5).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSigner { ref backend, ref chain }
                if backend == "kms" && chain == "goerli"
        ));
    }

    #[test]
    fn unknown_chains_are_reported() {
        let ctx = context(&format!(
            r#"{{ "type": "local", "private-key": "{KEY}" }}"#
        ));
        assert!(matches!(
            ctx.evm_provider(DomainId::new(9)),
            Err(Error::ChainNotFound { domain_id: 9 })
        ));
        assert!(ctx.evm_provider(DomainId::new(1)).is_ok());
        assert!(matches!(
            ctx.config.chains.get("goerli"),
            Some(ChainConfig::Evm(_))
        ));
    }

    #[test]
    fn shutdown_reaches_every_holder() {
        let ctx = context(&format!(
            r#"{{ "type": "local", "private-key": "{KEY}" }}"#
        ));
        let token = ctx.shutdown_signal();
        assert!(!token.is_cancelled());
        ctx.clone().shutdown();
        assert!(token.is_cancelled());
    }
}
