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

use bridge_relayer_types::{BlockNumber, RawDepositEvent};

/// Reads the `Deposit` logs of a bridge contract.
#[async_trait::async_trait]
pub trait DepositEventSource: Send + Sync {
    /// All deposits emitted in `start..=end`, in log order, with their
    /// sender handler address resolved.
    async fn fetch_deposits(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> bridge_relayer_utils::Result<Vec<RawDepositEvent>>;
}

#[async_trait::async_trait]
impl<T: DepositEventSource + ?Sized> DepositEventSource for Arc<T> {
    async fn fetch_deposits(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> bridge_relayer_utils::Result<Vec<RawDepositEvent>> {
        (**self).fetch_deposits(start, end).await
    }
}
