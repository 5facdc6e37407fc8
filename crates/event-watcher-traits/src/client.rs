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

use bridge_relayer_types::BlockNumber;

/// Read-only access to a chain, as needed by the listener.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// The current head of the chain.
    async fn latest_block(&self) -> bridge_relayer_utils::Result<BlockNumber>;
}

#[async_trait::async_trait]
impl<T> ChainClient for Arc<T>
where
    T: ChainClient + ?Sized,
{
    async fn latest_block(&self) -> bridge_relayer_utils::Result<BlockNumber> {
        (**self).latest_block().await
    }
}
