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

use ethereum_types::Address;
use serde::{Deserialize, Serialize};

use crate::{BlockNumber, DomainId, ResourceId};

/// The kind of transfer a [`Message`] carries. It fixes the layout of the
/// message payload.
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
pub enum TransferType {
    /// ERC20 like transfer. Payload: `[amount, recipient]`.
    #[display(fmt = "fungible")]
    Fungible,
    /// ERC721 like transfer. Payload: `[token_id, recipient, metadata]`.
    #[display(fmt = "non-fungible")]
    NonFungible,
    /// Arbitrary call. Payload: `[metadata]`.
    #[display(fmt = "generic")]
    Generic,
}

/// A `Deposit` log decoded from a source chain bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDepositEvent {
    pub destination_domain: DomainId,
    pub resource_id: ResourceId,
    pub deposit_nonce: u64,
    /// The handler contract that processed the deposit on the source chain.
    pub sender_handler_address: Address,
    pub data: Vec<u8>,
    pub handler_response: Vec<u8>,
    /// Block the log was included in.
    pub block_number: BlockNumber,
}

/// Canonical cross-chain message.
///
/// Created by a source chain listener and never mutated afterwards. Its
/// identity is `(source, destination, deposit_nonce)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub source: DomainId,
    pub destination: DomainId,
    pub deposit_nonce: u64,
    pub resource_id: ResourceId,
    #[serde(rename = "type")]
    pub kind: TransferType,
    pub payload: Vec<Vec<u8>>,
}

impl Message {
    pub fn new(
        source: DomainId,
        destination: DomainId,
        deposit_nonce: u64,
        resource_id: ResourceId,
        kind: TransferType,
        payload: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            source,
            destination,
            deposit_nonce,
            resource_id,
            kind,
            payload,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} message {} -> {} nonce {} resource {}",
            self.kind,
            self.source,
            self.destination,
            self.deposit_nonce,
            self.resource_id
        )
    }
}
