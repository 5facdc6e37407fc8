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

use std::sync::Arc;

use bridge_relayer_types::U256;
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::GasPricer;
use ethers::prelude::Middleware;

/// Precision of the gas multiplier, in thousandths.
const MULTIPLIER_SCALE: u64 = 1_000;

/// The node's gas price suggestion, scaled by a multiplier and capped.
#[derive(Debug)]
pub struct ProviderGasPricer<M> {
    client: Arc<M>,
    multiplier: f64,
    max_gas_price: Option<U256>,
}

impl<M> ProviderGasPricer<M> {
    pub fn new(
        client: Arc<M>,
        multiplier: f64,
        max_gas_price: Option<U256>,
    ) -> Self {
        Self {
            client,
            multiplier,
            max_gas_price,
        }
    }

    fn adjust(&self, suggested: U256) -> U256 {
        let factor = (self.multiplier * MULTIPLIER_SCALE as f64).round() as u64;
        let price = suggested.saturating_mul(U256::from(factor))
            / U256::from(MULTIPLIER_SCALE);
        match self.max_gas_price {
            Some(max) => price.min(max),
            None => price,
        }
    }
}

#[async_trait::async_trait]
impl<M> GasPricer for ProviderGasPricer<M>
where
    M: Middleware + 'static,
{
    async fn gas_price(&self) -> Result<U256> {
        let suggested = self
            .client
            .get_gas_price()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;
        let price = self.adjust(suggested);
        tracing::trace!(%suggested, %price, "gas price");
        Ok(price)
    }
}
