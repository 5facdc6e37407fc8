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

//! Bridge relayer configuration.
//!
//! A configuration directory holds any number of `toml` or `json` files that
//! are merged together, then overridden by `BRIDGE_` prefixed environment
//! variables. A minimal chain looks like:
//!
//! ```toml
//! [chains.goerli]
//! type = "evm"
//! id = 1
//! endpoint = "https://goerli.example"
//! bridge = "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B"
//! erc20-handler = "0x3167776db165D8eA0f51790CA2bbf44Db5105ADF"
//! signer = { type = "local", private-key = "$GOERLI_PRIVATE_KEY" }
//! ```
#![warn(missing_docs)]

/// CLI options and process setup.
#[cfg(feature = "cli")]
pub mod cli;
/// Default values for optional keys.
pub mod defaults;
/// EVM chain configuration.
pub mod evm;
/// Loading and validating configuration files.
pub mod utils;

use bridge_relayer_types::DomainId;
use evm::EvmChainConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The whole relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// Process wide settings.
    #[serde(default)]
    pub relayer: GeneralConfig,
    /// The chains this relayer listens to and votes on.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

/// Process wide settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneralConfig {
    /// Capacity of the channels carrying message batches between tasks.
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

/// A chain entry, tagged by its `type`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChainConfig {
    /// An EVM compatible chain.
    Evm(EvmChainConfig),
}

impl ChainConfig {
    /// The domain id of the chain.
    pub fn id(&self) -> DomainId {
        match self {
            Self::Evm(c) => c.id,
        }
    }

    /// The human readable name of the chain.
    pub fn name(&self) -> &str {
        match self {
            Self::Evm(c) => &c.name,
        }
    }

    /// Whether the chain is enabled.
    pub fn enabled(&self) -> bool {
        match self {
            Self::Evm(c) => c.enabled,
        }
    }
}

impl RelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> bridge_relayer_utils::Result<()> {
        use bridge_relayer_utils::Error;

        if self.relayer.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel-capacity must be at least 1".into(),
            ));
        }
        let mut seen = HashSet::new();
        for chain in self.chains.values() {
            if !seen.insert(chain.id()) {
                return Err(Error::InvalidConfig(format!(
                    "domain id {} is used by more than one chain",
                    chain.id()
                )));
            }
            match chain {
                ChainConfig::Evm(c) => Self::verify_evm(c)?,
            }
        }
        Ok(())
    }

    fn verify_evm(c: &EvmChainConfig) -> bridge_relayer_utils::Result<()> {
        use bridge_relayer_utils::Error;

        if c.block_interval == 0 {
            return Err(Error::InvalidConfig(format!(
                "block-interval of chain {} must be at least 1",
                c.name
            )));
        }
        if c.bridge.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "bridge address of chain {} is the zero address",
                c.name
            )));
        }
        if c.gas_multiplier <= 0.0 || !c.gas_multiplier.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "gas-multiplier of chain {} must be a positive number",
                c.name
            )));
        }
        if let Some(ws) = &c.ws_endpoint {
            if !ws.is_ws() {
                return Err(Error::InvalidConfig(format!(
                    "ws-endpoint of chain {} must use ws:// or wss://",
                    c.name
                )));
            }
        }
        if let evm::SignerConfig::Local { private_key: None } = &c.signer {
            return Err(Error::MissingSecrets(c.name.clone()));
        }
        Ok(())
    }

    /// The EVM chain with the given domain id.
    pub fn evm_chain(&self, domain_id: DomainId) -> Option<&EvmChainConfig> {
        self.chains.values().find_map(|chain| match chain {
            ChainConfig::Evm(c) if c.id == domain_id => Some(c),
            _ => None,
        })
    }

    /// Enabled chains, in a stable (domain id) order.
    pub fn enabled_chains(&self) -> Vec<&ChainConfig> {
        let mut chains: Vec<_> =
            self.chains.values().filter(|c| c.enabled()).collect();
        chains.sort_by_key(|c| c.id());
        chains
    }
}
