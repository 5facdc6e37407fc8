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

use crate::Error as RelayerError;
use core::fmt::Debug;
use ethers::providers::{JsonRpcClient, ProviderError};
use futures::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// MultiProvider is a JsonRpcClient that will round-robin requests to the
/// underlying providers, so a chain can be configured with a primary endpoint
/// and any number of fallbacks.
#[derive(Debug, Clone)]
pub struct MultiProvider<P> {
    providers: Arc<Vec<P>>,
    last_used: Arc<AtomicUsize>,
}

impl<P> MultiProvider<P> {
    pub fn new(providers: Arc<Vec<P>>) -> Self {
        Self {
            providers,
            last_used: Default::default(),
        }
    }

    /// Number of underlying providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait::async_trait]
impl<P: JsonRpcClient> JsonRpcClient for MultiProvider<P>
where
    P::Error: Into<ProviderError>,
{
    type Error = ProviderError;

    async fn request<
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    >(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, Self::Error> {
        if self.providers.is_empty() {
            return Err(ProviderError::CustomError(
                RelayerError::ProviderNotFound(0).to_string(),
            ));
        }
        // Take the current index and move the cursor to the next provider,
        // wrapping around at the end of the list.
        let next_provider_idx = self
            .last_used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last_used| {
                Some(last_used.saturating_add(1) % self.providers.len())
            })
            .unwrap_or_default();

        if let Some(provider) = self.providers.get(next_provider_idx) {
            provider
                .request(method, params)
                .map_err(P::Error::into)
                .await
        } else {
            Err(ProviderError::CustomError(
                RelayerError::ProviderNotFound(next_provider_idx).to_string(),
            ))
        }
    }
}
