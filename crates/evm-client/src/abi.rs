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

use bridge_relayer_types::{
    Address, DomainId, Proposal, ProposalEvent, ProposalStatus, ResourceId,
    H256, U256,
};
use bridge_relayer_utils::{Error, Result};
use ethers::abi::Abi;
use ethers::contract::BaseContract;
use ethers::types::{Bytes, Log};

/// The part of the bridge contract the relayer talks to.
const BRIDGE_ABI: &str = r#"[
  {
    "type": "event",
    "name": "Deposit",
    "anonymous": false,
    "inputs": [
      { "name": "destinationDomainID", "type": "uint8", "indexed": false },
      { "name": "resourceID", "type": "bytes32", "indexed": false },
      { "name": "depositNonce", "type": "uint64", "indexed": false },
      { "name": "user", "type": "address", "indexed": true },
      { "name": "data", "type": "bytes", "indexed": false },
      { "name": "handlerResponse", "type": "bytes", "indexed": false }
    ]
  },
  {
    "type": "event",
    "name": "ProposalEvent",
    "anonymous": false,
    "inputs": [
      { "name": "originDomainID", "type": "uint8", "indexed": false },
      { "name": "depositNonce", "type": "uint64", "indexed": false },
      { "name": "status", "type": "uint8", "indexed": false },
      { "name": "dataHash", "type": "bytes32", "indexed": false }
    ]
  },
  {
    "type": "function",
    "name": "voteProposal",
    "stateMutability": "nonpayable",
    "inputs": [
      { "name": "domainID", "type": "uint8" },
      { "name": "depositNonce", "type": "uint64" },
      { "name": "resourceID", "type": "bytes32" },
      { "name": "data", "type": "bytes" }
    ],
    "outputs": []
  },
  {
    "type": "function",
    "name": "getProposal",
    "stateMutability": "view",
    "inputs": [
      { "name": "originDomainID", "type": "uint8" },
      { "name": "depositNonce", "type": "uint64" },
      { "name": "dataHash", "type": "bytes32" }
    ],
    "outputs": [
      {
        "name": "",
        "type": "tuple",
        "components": [
          { "name": "_status", "type": "uint8" },
          { "name": "_yesVotes", "type": "uint200" },
          { "name": "_yesVotesTotal", "type": "uint8" },
          { "name": "_proposedBlock", "type": "uint40" }
        ]
      }
    ]
  },
  {
    "type": "function",
    "name": "_hasVotedOnProposal",
    "stateMutability": "view",
    "inputs": [
      { "name": "destNonce", "type": "uint72" },
      { "name": "dataHash", "type": "bytes32" },
      { "name": "relayer", "type": "address" }
    ],
    "outputs": [{ "name": "", "type": "bool" }]
  },
  {
    "type": "function",
    "name": "_resourceIDToHandlerAddress",
    "stateMutability": "view",
    "inputs": [{ "name": "resourceID", "type": "bytes32" }],
    "outputs": [{ "name": "", "type": "address" }]
  }
]"#;

/// A decoded `Deposit` log, before its handler address is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLog {
    pub destination_domain: DomainId,
    pub resource_id: ResourceId,
    pub deposit_nonce: u64,
    pub data: Vec<u8>,
    pub handler_response: Vec<u8>,
}

/// Encoder and decoder of the bridge contract calls and events.
#[derive(Debug, Clone)]
pub struct BridgeAbi {
    contract: BaseContract,
    deposit_topic: H256,
    proposal_event_topic: H256,
}

fn abi_error(e: impl std::fmt::Display) -> Error {
    Error::Abi(e.to_string())
}

impl BridgeAbi {
    pub fn new() -> Result<Self> {
        let abi: Abi = serde_json::from_str(BRIDGE_ABI)?;
        let deposit_topic = abi.event("Deposit").map_err(abi_error)?.signature();
        let proposal_event_topic =
            abi.event("ProposalEvent").map_err(abi_error)?.signature();
        Ok(Self {
            contract: BaseContract::from(abi),
            deposit_topic,
            proposal_event_topic,
        })
    }

    pub fn deposit_topic(&self) -> H256 {
        self.deposit_topic
    }

    pub fn proposal_event_topic(&self) -> H256 {
        self.proposal_event_topic
    }

    pub fn decode_deposit(&self, log: &Log) -> Result<DepositLog> {
        let (destination, resource_id, deposit_nonce, _user, data, response): (
            u8,
            [u8; 32],
            u64,
            Address,
            Bytes,
            Bytes,
        ) = self
            .contract
            .decode_event("Deposit", log.topics.clone(), log.data.clone())
            .map_err(abi_error)?;
        Ok(DepositLog {
            destination_domain: DomainId::new(destination),
            resource_id: ResourceId::new(resource_id),
            deposit_nonce,
            data: data.to_vec(),
            handler_response: response.to_vec(),
        })
    }

    pub fn decode_proposal_event(&self, log: &Log) -> Result<ProposalEvent> {
        let (origin, deposit_nonce, status, data_hash): (u8, u64, u8, [u8; 32]) =
            self.contract
                .decode_event(
                    "ProposalEvent",
                    log.topics.clone(),
                    log.data.clone(),
                )
                .map_err(abi_error)?;
        Ok(ProposalEvent {
            origin_domain: DomainId::new(origin),
            deposit_nonce,
            status: proposal_status(status)?,
            data_hash: H256::from(data_hash),
        })
    }

    pub fn encode_vote(&self, proposal: &Proposal) -> Result<Bytes> {
        self.contract
            .encode(
                "voteProposal",
                (
                    proposal.source.into_inner(),
                    proposal.deposit_nonce,
                    proposal.resource_id.to_bytes(),
                    Bytes::from(proposal.data.clone()),
                ),
            )
            .map_err(abi_error)
    }

    pub fn encode_get_proposal(&self, proposal: &Proposal) -> Result<Bytes> {
        self.contract
            .encode(
                "getProposal",
                (
                    proposal.source.into_inner(),
                    proposal.deposit_nonce,
                    proposal.data_hash().to_fixed_bytes(),
                ),
            )
            .map_err(abi_error)
    }

    pub fn decode_proposal_status(&self, output: &Bytes) -> Result<ProposalStatus> {
        let (status, _yes_votes, _yes_votes_total, _proposed_block): (
            u8,
            U256,
            u8,
            u64,
        ) = self
            .contract
            .decode_output("getProposal", output)
            .map_err(abi_error)?;
        proposal_status(status)
    }

    pub fn encode_has_voted(
        &self,
        proposal: &Proposal,
        relayer: Address,
    ) -> Result<Bytes> {
        self.contract
            .encode(
                "_hasVotedOnProposal",
                (
                    U256::from(proposal.destination_nonce()),
                    proposal.data_hash().to_fixed_bytes(),
                    relayer,
                ),
            )
            .map_err(abi_error)
    }

    pub fn decode_has_voted(&self, output: &Bytes) -> Result<bool> {
        self.contract
            .decode_output("_hasVotedOnProposal", output)
            .map_err(abi_error)
    }

    pub fn encode_handler_address(&self, resource_id: ResourceId) -> Result<Bytes> {
        self.contract
            .encode("_resourceIDToHandlerAddress", resource_id.to_bytes())
            .map_err(abi_error)
    }

    pub fn decode_handler_address(&self, output: &Bytes) -> Result<Address> {
        self.contract
            .decode_output("_resourceIDToHandlerAddress", output)
            .map_err(abi_error)
    }
}

fn proposal_status(status: u8) -> Result<ProposalStatus> {
    ProposalStatus::try_from(status)
        .map_err(|s| Error::Abi(format!("unknown proposal status {s}")))
}
