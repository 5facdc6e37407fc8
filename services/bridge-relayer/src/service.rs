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

//! # Relayer Service Module 🕸️
//!
//! Builds a [`RelayedChain`] for every enabled chain of the configuration
//! and hands them to the [`Relayer`] router.

use std::sync::Arc;

use bridge_event_watcher_traits::{EventListener, ListenerConfig};
use bridge_ew_evm::{DepositEventHandler, DepositHandlerRegistry};
use bridge_relayer_config::evm::EvmChainConfig;
use bridge_relayer_config::ChainConfig;
use bridge_relayer_context::RelayerContext;
use bridge_relayer_evm_client::{BridgeAbi, EvmClient, ProviderGasPricer};
use bridge_relayer_store::StartBlockOptions;
use bridge_relayer_types::U256;
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::{
    GasPricer, MessageHandlerRegistry, StaticGasPricer, Voter, VoterSettings,
};
use ethers::prelude::{Middleware, Signer, SignerMiddleware};

use crate::{Chain, RelayedChain, Relayer};

/// Builds every enabled chain and the router running them.
///
/// Any chain that cannot be built is fatal: a relayer silently missing a
/// chain would never vote on it.
pub async fn ignite(ctx: &RelayerContext) -> Result<Relayer> {
    let mut chains: Vec<Arc<dyn RelayedChain>> = Vec::new();
    for chain in ctx.config.enabled_chains() {
        tracing::debug!(
            "Starting Background Services for ({}) chain.",
            chain.name()
        );
        match chain {
            ChainConfig::Evm(config) => {
                chains.push(build_evm_chain(ctx, config).await?);
            }
        }
    }
    if chains.is_empty() {
        return Err(Error::InvalidConfig("no chain is enabled".into()));
    }
    Ok(Relayer::new(
        chains,
        ctx.config.relayer.channel_capacity,
        ctx.metrics.clone(),
    ))
}

/// Wires the listener and the voter of one EVM chain.
#[tracing::instrument(skip_all, fields(chain = %config.name, domain_id = %config.id))]
async fn build_evm_chain(
    ctx: &RelayerContext,
    config: &EvmChainConfig,
) -> Result<Arc<dyn RelayedChain>> {
    let domain_id = config.id;
    let provider = ctx.evm_provider(domain_id)?;
    let chain_id = provider.get_chainid().await?;
    let wallet = ctx.evm_wallet(domain_id, chain_id.as_u64())?;
    let relayer = wallet.address();
    tracing::info!(%chain_id, ?relayer, "Connected to chain");

    let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
    let evm_client = Arc::new(
        EvmClient::builder()
            .domain_id(domain_id)
            .client(client)
            .bridge(config.bridge)
            .relayer(relayer)
            .ws_endpoint(config.ws_endpoint.as_ref().map(|u| u.as_url().clone()))
            .abi(BridgeAbi::new()?)
            .build(),
    );

    let deposit_handler = DepositEventHandler::builder()
        .domain_id(domain_id)
        .source(evm_client.clone())
        .registry(config.handlers().collect::<DepositHandlerRegistry>())
        .metrics(ctx.metrics.clone())
        .build();
    let listener = EventListener::new(
        evm_client.clone(),
        vec![Box::new(deposit_handler)],
        ctx.store().clone(),
        listener_config(config),
        ctx.metrics.clone(),
    );

    let gas_pricer: Arc<dyn GasPricer> = match config.gas_price {
        Some(price) => Arc::new(StaticGasPricer::new(capped_gas_price(
            price,
            config.max_gas_price,
        ))),
        None => Arc::new(ProviderGasPricer::new(
            provider,
            config.gas_multiplier,
            config.max_gas_price.map(U256::from),
        )),
    };
    let mut voter = Voter::builder()
        .domain_id(domain_id)
        .bridge(evm_client)
        .gas_pricer(gas_pricer)
        .registry(config.handlers().collect::<MessageHandlerRegistry>())
        .settings(voter_settings(config))
        .metrics(ctx.metrics.clone())
        .build();
    if config.ws_endpoint.is_some() {
        if let Err(e) = voter.enable_subscription(&ctx.shutdown_signal()).await {
            tracing::warn!(
                error = %e,
                "Proposal subscription failed, falling back to polling",
            );
        }
    } else {
        tracing::debug!("No ws-endpoint configured, voting in polling mode");
    }

    let chain = Chain::new(listener, voter, ctx.store().clone(), start_options(config));
    Ok(Arc::new(chain))
}

fn listener_config(config: &EvmChainConfig) -> ListenerConfig {
    ListenerConfig {
        domain_id: config.id,
        block_retry_interval: config.block_retry_interval(),
        block_confirmations: config.block_confirmations,
        block_interval: config.block_interval,
    }
}

fn voter_settings(config: &EvmChainConfig) -> VoterSettings {
    VoterSettings {
        gas_limit: config.gas_limit,
        max_retries: config.voter.max_retries,
        initial_retry_interval: config.voter.initial_retry_interval(),
        max_retry_interval: config.voter.max_retry_interval(),
        follow_up_timeout: config.voter.follow_up_timeout(),
    }
}

fn start_options(config: &EvmChainConfig) -> StartBlockOptions {
    StartBlockOptions {
        configured: config.start_block,
        latest: config.latest_block,
        fresh_start: config.fresh_start,
    }
}

fn capped_gas_price(price: u64, max_gas_price: Option<u64>) -> u64 {
    max_gas_price.map_or(price, |max| price.min(max))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_relayer_config::RelayerConfig;
    use bridge_relayer_store::SledStore;
    use bridge_relayer_types::DomainId;

    use super::*;

    fn chain(extra: &str) -> EvmChainConfig {
        let raw = format!(
            r#"{{
                "name": "goerli",
                "id": 4,
                "endpoint": "http://localhost:8545",
                "bridge": "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B",
                "signer": {{ "type": "kms", "key-id": "relayer" }}
                {extra}
            }}"#
        );
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn chain_settings_follow_the_configuration() {
        let config = chain(
            r#", "block-confirmations": 3, "block-interval": 20,
                "start-block": 1200, "fresh-start": true,
                "voter": { "max-retries": 2, "follow-up-timeout": 60 }"#,
        );
        let listener = listener_config(&config);
        assert_eq!(listener.domain_id, DomainId::new(4));
        assert_eq!(listener.block_confirmations, 3);
        assert_eq!(listener.block_interval, 20);
        assert_eq!(listener.block_retry_interval, Duration::from_secs(5));

        let voter = voter_settings(&config);
        assert_eq!(voter.gas_limit, 2_000_000);
        assert_eq!(voter.max_retries, 2);
        assert_eq!(voter.initial_retry_interval, Duration::from_millis(500));
        assert_eq!(voter.follow_up_timeout, Duration::from_secs(60));

        assert_eq!(
            start_options(&config),
            StartBlockOptions {
                configured: Some(1200),
                latest: false,
                fresh_start: true,
            }
        );
    }

    #[test]
    fn fixed_gas_price_respects_the_cap() {
        assert_eq!(capped_gas_price(50, None), 50);
        assert_eq!(capped_gas_price(50, Some(80)), 50);
        assert_eq!(capped_gas_price(90, Some(80)), 80);
    }

    #[tokio::test]
    async fn nothing_to_relay_is_a_configuration_error() {
        let ctx = RelayerContext::new(
            RelayerConfig::default(),
            SledStore::temporary().unwrap(),
        )
        .unwrap();
        let result = ignite(&ctx).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
