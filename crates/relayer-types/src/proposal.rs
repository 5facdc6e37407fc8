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

use ethereum_types::{Address, H256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::{DomainId, ResourceId};

/// Status of a proposal as stored by the destination bridge.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProposalStatus {
    #[display(fmt = "inactive")]
    Inactive,
    #[display(fmt = "active")]
    Active,
    #[display(fmt = "passed")]
    Passed,
    #[display(fmt = "executed")]
    Executed,
    #[display(fmt = "cancelled")]
    Cancelled,
}

impl ProposalStatus {
    /// Nothing can happen to the proposal anymore.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled)
    }

    /// Votes are no longer needed: the proposal reached quorum or is final.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Passed | Self::Executed | Self::Cancelled)
    }
}

impl TryFrom<u8> for ProposalStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Inactive),
            1 => Ok(Self::Active),
            2 => Ok(Self::Passed),
            3 => Ok(Self::Executed),
            4 => Ok(Self::Cancelled),
            other => Err(other),
        }
    }
}

/// A message turned into an execution ready call for the destination
/// bridge. Derived by the voter, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub source: DomainId,
    pub destination: DomainId,
    pub deposit_nonce: u64,
    pub resource_id: ResourceId,
    /// Destination handler that will execute the proposal.
    pub handler_address: Address,
    /// Call data handed to the handler on execution.
    pub data: Vec<u8>,
}

impl Proposal {
    /// `keccak256(handler_address ++ data)`, the key the bridge stores votes under.
    pub fn data_hash(&self) -> H256 {
        let mut preimage =
            Vec::with_capacity(self.handler_address.as_bytes().len() + self.data.len());
        preimage.extend_from_slice(self.handler_address.as_bytes());
        preimage.extend_from_slice(&self.data);
        H256::from(keccak256(preimage))
    }

    /// `(deposit_nonce << 8) | source`, the nonce the bridge tracks votes by.
    pub fn destination_nonce(&self) -> u128 {
        (u128::from(self.deposit_nonce) << 8) | u128::from(self.source.into_inner())
    }
}

/// A `ProposalEvent` emitted by the destination bridge when a proposal
/// changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalEvent {
    pub origin_domain: DomainId,
    pub deposit_nonce: u64,
    pub status: ProposalStatus,
    pub data_hash: H256,
}

impl ProposalEvent {
    /// Whether this event is about the given proposal.
    pub fn concerns(&self, proposal: &Proposal) -> bool {
        self.origin_domain == proposal.source
            && self.deposit_nonce == proposal.deposit_nonce
    }
}
