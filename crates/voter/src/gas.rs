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
use bridge_relayer_utils::Result;

/// Decides the gas price of a vote transaction.
#[async_trait::async_trait]
pub trait GasPricer: Send + Sync {
    /// The gas price, in wei, of the next vote.
    async fn gas_price(&self) -> Result<U256>;
}

/// Always the same gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticGasPricer(U256);

impl StaticGasPricer {
    /// A pricer that always answers `price`.
    pub fn new(price: impl Into<U256>) -> Self {
        Self(price.into())
    }
}

#[async_trait::async_trait]
impl GasPricer for StaticGasPricer {
    async fn gas_price(&self) -> Result<U256> {
        Ok(self.0)
    }
}

#[async_trait::async_trait]
impl<T: GasPricer + ?Sized> GasPricer for Arc<T> {
    async fn gas_price(&self) -> Result<U256> {
        (**self).gas_price().await
    }
}
