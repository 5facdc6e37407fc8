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

use bridge_relayer_types::{
    Address, Proposal, ProposalEvent, ProposalStatus, ResourceId, H256, U256,
};
use bridge_relayer_utils::Result;
use futures::stream::BoxStream;

/// A stream of `ProposalEvent`s emitted by a destination bridge.
pub type ProposalEventStream = BoxStream<'static, ProposalEvent>;

/// Gas settings of a vote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactOptions {
    /// Gas limit of the transaction.
    pub gas_limit: u64,
    /// Gas price of the transaction, in wei.
    pub gas_price: U256,
}

/// The calls the voter makes on a destination bridge contract.
#[async_trait::async_trait]
pub trait BridgeClient: Send + Sync {
    /// `_resourceIDToHandlerAddress(resource_id)`.
    async fn handler_address(&self, resource_id: ResourceId) -> Result<Address>;

    /// The current status of `proposal`, from `getProposal`.
    async fn proposal_status(&self, proposal: &Proposal) -> Result<ProposalStatus>;

    /// Whether this relayer already voted on `proposal`.
    async fn has_voted(&self, proposal: &Proposal) -> Result<bool>;

    /// Submits `voteProposal` and returns the transaction hash.
    async fn vote(
        &self,
        proposal: &Proposal,
        options: TransactOptions,
    ) -> Result<H256>;

    /// Subscribes to the `ProposalEvent`s of the bridge. Fails when the
    /// client has no subscription transport.
    async fn subscribe_proposal_events(&self) -> Result<ProposalEventStream>;
}

#[async_trait::async_trait]
impl<T: BridgeClient + ?Sized> BridgeClient for Arc<T> {
    async fn handler_address(&self, resource_id: ResourceId) -> Result<Address> {
        (**self).handler_address(resource_id).await
    }

    async fn proposal_status(&self, proposal: &Proposal) -> Result<ProposalStatus> {
        (**self).proposal_status(proposal).await
    }

    async fn has_voted(&self, proposal: &Proposal) -> Result<bool> {
        (**self).has_voted(proposal).await
    }

    async fn vote(
        &self,
        proposal: &Proposal,
        options: TransactOptions,
    ) -> Result<H256> {
        (**self).vote(proposal, options).await
    }

    async fn subscribe_proposal_events(&self) -> Result<ProposalEventStream> {
        (**self).subscribe_proposal_events().await
    }
}
