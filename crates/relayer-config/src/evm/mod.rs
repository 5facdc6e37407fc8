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

use std::time::Duration;

use bridge_relayer_types::{
    private_key::PrivateKey, rpc_url::RpcUrl, DomainId,
};
use ethereum_types::Address;

use super::*;

/// Configuration of one EVM chain taking part in the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    ///
    /// Defaults to the key of the chain in the `chains` table.
    #[serde(default)]
    pub name: String,
    /// Boolean indicating the chain is enabled or not.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// The domain id of this chain inside the bridge federation.
    pub id: DomainId,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub endpoint: RpcUrl,
    /// Extra Http(s) endpoints, requests are spread over all of them.
    #[serde(default, skip_serializing)]
    pub fallback_endpoints: Vec<RpcUrl>,
    /// Websocket Endpoint used to subscribe to proposal events.
    ///
    /// Without it the voter runs in polling mode.
    #[serde(default, skip_serializing)]
    pub ws_endpoint: Option<RpcUrl>,
    /// The bridge contract address.
    pub bridge: Address,
    /// The ERC20 handler contract address, if fungible transfers are relayed.
    #[serde(default)]
    pub erc20_handler: Option<Address>,
    /// The ERC721 handler contract address, if non fungible transfers are relayed.
    #[serde(default)]
    pub erc721_handler: Option<Address>,
    /// The generic handler contract address, if generic calls are relayed.
    #[serde(default)]
    pub generic_handler: Option<Address>,
    /// Gas limit of vote transactions.
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,
    /// Upper bound of the gas price the relayer is willing to pay, in wei.
    #[serde(default)]
    pub max_gas_price: Option<u64>,
    /// Fixed gas price in wei. When absent the node's suggestion is used.
    #[serde(default)]
    pub gas_price: Option<u64>,
    /// Multiplier applied to the node's gas price suggestion.
    #[serde(default = "defaults::gas_multiplier")]
    pub gas_multiplier: f64,
    /// Seconds to wait before polling the chain head again.
    #[serde(default = "defaults::block_retry_interval")]
    pub block_retry_interval: u64,
    /// How deep a block must be buried before its logs are trusted.
    #[serde(default = "defaults::block_confirmations")]
    pub block_confirmations: u64,
    /// How many blocks are scanned per step.
    #[serde(default = "defaults::block_interval")]
    pub block_interval: u64,
    /// The block to start scanning from when nothing newer is persisted.
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Ignore the persisted cursor and start from `start-block`.
    #[serde(default)]
    pub fresh_start: bool,
    /// Ignore both the persisted cursor and `start-block`; start at the head.
    #[serde(default)]
    pub latest_block: bool,
    /// Which key signs the vote transactions.
    #[serde(skip_serializing)]
    pub signer: SignerConfig,
    /// Voter retry and follow-up configuration.
    #[serde(default)]
    pub voter: VoterConfig,
}

impl EvmChainConfig {
    /// [`EvmChainConfig::block_retry_interval`] as a [`Duration`].
    pub fn block_retry_interval(&self) -> Duration {
        Duration::from_secs(self.block_retry_interval)
    }

    /// The configured handler addresses, with the transfer type each one serves.
    pub fn handlers(
        &self,
    ) -> impl Iterator<Item = (Address, bridge_relayer_types::TransferType)> + '_
    {
        use bridge_relayer_types::TransferType::*;
        [
            (self.erc20_handler, Fungible),
            (self.erc721_handler, NonFungible),
            (self.generic_handler, Generic),
        ]
        .into_iter()
        .filter_map(|(addr, kind)| addr.map(|a| (a, kind)))
    }
}

/// How vote transactions get signed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignerConfig {
    /// A private key held by the relayer process.
    Local {
        /// The Private Key of this account on this network
        /// the format is more dynamic here:
        /// 1. if it starts with '0x' then this would be raw (64 bytes) hex encoded
        ///    private key.
        /// 2. if it starts with '$' then it would be considered as an Enviroment variable
        ///    of a hex-encoded private key.
        ///   Example: $GOERLI_PRIVATE_KEY
        #[serde(rename = "private-key", skip_serializing)]
        private_key: Option<PrivateKey>,
    },
    /// A key held by a remote key management service.
    Kms {
        /// Identifier of the key inside the KMS.
        #[serde(rename = "key-id")]
        key_id: String,
        /// Region of the KMS, if it is regional.
        #[serde(default)]
        region: Option<String>,
    },
}

impl SignerConfig {
    /// Name of the signer backend, used in logs and errors.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Kms { .. } => "kms",
        }
    }
}

/// Voter retry and follow-up configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VoterConfig {
    /// Maximum retries of a transient RPC failure, per message.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: usize,
    /// First retry delay, in milliseconds.
    #[serde(default = "defaults::initial_retry_interval")]
    pub initial_retry_interval: u64,
    /// Retry delay cap, in milliseconds.
    #[serde(default = "defaults::max_retry_interval")]
    pub max_retry_interval: u64,
    /// How long the subscription voter waits for the proposal outcome, in seconds.
    #[serde(default = "defaults::follow_up_timeout")]
    pub follow_up_timeout: u64,
}

impl Default for VoterConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            initial_retry_interval: defaults::initial_retry_interval(),
            max_retry_interval: defaults::max_retry_interval(),
            follow_up_timeout: defaults::follow_up_timeout(),
        }
    }
}

impl VoterConfig {
    /// First retry delay.
    pub fn initial_retry_interval(&self) -> Duration {
        Duration::from_millis(self.initial_retry_interval)
    }

    /// Retry delay cap.
    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.max_retry_interval)
    }

    /// Follow-up timeout of the subscription voter.
    pub fn follow_up_timeout(&self) -> Duration {
        Duration::from_secs(self.follow_up_timeout)
    }
}
