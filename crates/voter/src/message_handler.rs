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

use std::collections::HashMap;

use bridge_relayer_types::{Address, Message, Proposal, TransferType, U256};
use bridge_relayer_utils::{Error, Result};

const WORD: usize = 32;

/// Which transfer kind each destination handler contract executes.
///
/// Built once from the chain configuration and used by the voter to check
/// that a message fits the handler its resource is bound to.
#[derive(Debug, Clone, Default)]
pub struct MessageHandlerRegistry {
    handlers: HashMap<Address, TransferType>,
}

impl MessageHandlerRegistry {
    /// Registers `address` as a handler of `kind`, replacing any previous kind.
    pub fn register(&mut self, address: Address, kind: TransferType) {
        self.handlers.insert(address, kind);
    }

    /// The kind of transfers `address` executes, if it is a known handler.
    pub fn kind_of(&self, address: &Address) -> Option<TransferType> {
        self.handlers.get(address).copied()
    }

    /// Validates `message` against the handler at `handler_address` and
    /// builds the proposal the destination bridge will execute.
    ///
    /// Every error returned here is permanent: the message can never be
    /// voted on by this relayer.
    pub fn build_proposal(
        &self,
        message: &Message,
        handler_address: Address,
    ) -> Result<Proposal> {
        let kind = self.kind_of(&handler_address).ok_or_else(|| {
            Error::InvalidMessage(format!(
                "no message handler registered at {handler_address:?} for resource {}",
                message.resource_id
            ))
        })?;
        if kind != message.kind {
            return Err(Error::InvalidMessage(format!(
                "{} message routed to a {kind} handler at {handler_address:?}",
                message.kind
            )));
        }
        let data = proposal_calldata(kind, &message.payload)?;
        Ok(Proposal {
            source: message.source,
            destination: message.destination,
            deposit_nonce: message.deposit_nonce,
            resource_id: message.resource_id,
            handler_address,
            data,
        })
    }
}

impl FromIterator<(Address, TransferType)> for MessageHandlerRegistry {
    fn from_iter<T: IntoIterator<Item = (Address, TransferType)>>(
        iter: T,
    ) -> Self {
        let mut registry = Self::default();
        for (address, kind) in iter {
            registry.register(address, kind);
        }
        registry
    }
}

/// Encodes a message payload as the calldata the destination handler expects.
///
/// * fungible: `pad32(amount) | pad32(len(recipient)) | recipient`
/// * non-fungible: `pad32(token_id) | pad32(len(recipient)) | recipient |
///   pad32(len(metadata)) | metadata`
/// * generic: `pad32(len(metadata)) | metadata`
pub fn proposal_calldata(
    kind: TransferType,
    payload: &[Vec<u8>],
) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match (kind, payload) {
        (TransferType::Fungible, [amount, recipient]) => {
            data.extend(pad32(amount, "amount")?);
            push_sized(&mut data, recipient);
        }
        (TransferType::NonFungible, [token_id, recipient, metadata]) => {
            data.extend(pad32(token_id, "token id")?);
            push_sized(&mut data, recipient);
            push_sized(&mut data, metadata);
        }
        (TransferType::Generic, [metadata]) => {
            push_sized(&mut data, metadata);
        }
        (kind, payload) => {
            return Err(Error::InvalidMessage(format!(
                "{kind} payload has {} parts",
                payload.len()
            )))
        }
    }
    Ok(data)
}

/// Left pads a big-endian number to a 32 byte word.
fn pad32(value: &[u8], what: &str) -> Result<[u8; WORD]> {
    if value.len() > WORD {
        return Err(Error::InvalidMessage(format!(
            "{what} is {} bytes, does not fit a word",
            value.len()
        )));
    }
    let mut word = [0u8; WORD];
    word[WORD - value.len()..].copy_from_slice(value);
    Ok(word)
}

fn push_sized(data: &mut Vec<u8>, chunk: &[u8]) {
    let mut len = [0u8; WORD];
    U256::from(chunk.len()).to_big_endian(&mut len);
    data.extend_from_slice(&len);
    data.extend_from_slice(chunk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_relayer_types::{DomainId, ResourceId};

    const ERC20: Address = Address::repeat_byte(0x20);
    const ERC721: Address = Address::repeat_byte(0x72);

    fn registry() -> MessageHandlerRegistry {
        [
            (ERC20, TransferType::Fungible),
            (ERC721, TransferType::NonFungible),
        ]
        .into_iter()
        .collect()
    }

    fn message(kind: TransferType, payload: Vec<Vec<u8>>) -> Message {
        Message::new(
            DomainId::new(1),
            DomainId::new(2),
            9,
            ResourceId::new([1u8; 32]),
            kind,
            payload,
        )
    }

    #[test]
    fn fungible_calldata_layout() {
        let data = proposal_calldata(
            TransferType::Fungible,
            &[vec![0x01, 0x00], vec![0xcc; 20]],
        )
        .unwrap();
        assert_eq!(data.len(), 32 + 32 + 20);
        assert_eq!(&data[30..32], &[0x01, 0x00]);
        assert!(data[..30].iter().all(|b| *b == 0));
        assert_eq!(data[63], 20);
        assert_eq!(&data[64..], &[0xcc; 20]);
    }

    #[test]
    fn non_fungible_calldata_layout() {
        let data = proposal_calldata(
            TransferType::NonFungible,
            &[vec![7], vec![0xcc; 20], b"uri".to_vec()],
        )
        .unwrap();
        assert_eq!(data.len(), 32 + 32 + 20 + 32 + 3);
        assert_eq!(data[31], 7);
        assert_eq!(data[63], 20);
        assert_eq!(data[84 + 31], 3);
        assert_eq!(&data[116..], b"uri");
    }

    #[test]
    fn generic_calldata_layout() {
        let data =
            proposal_calldata(TransferType::Generic, &[vec![1, 2]]).unwrap();
        assert_eq!(data.len(), 34);
        assert_eq!(data[31], 2);
        assert_eq!(&data[32..], &[1, 2]);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(proposal_calldata(TransferType::Fungible, &[vec![1]]).is_err());
        assert!(proposal_calldata(
            TransferType::Fungible,
            &[vec![1; 33], vec![0; 20]]
        )
        .is_err());
    }

    #[test]
    fn builds_proposal_for_matching_handler() {
        let msg = message(TransferType::Fungible, vec![vec![5], vec![0xcc; 20]]);
        let proposal = registry().build_proposal(&msg, ERC20).unwrap();
        assert_eq!(proposal.handler_address, ERC20);
        assert_eq!(proposal.source, DomainId::new(1));
        assert_eq!(proposal.deposit_nonce, 9);
        assert_eq!(proposal.data.len(), 84);
    }

    #[test]
    fn rejects_unknown_or_mismatching_handler() {
        let msg = message(TransferType::Fungible, vec![vec![5], vec![0xcc; 20]]);
        let err = registry()
            .build_proposal(&msg, Address::repeat_byte(0x01))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        let err = registry().build_proposal(&msg, ERC721).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }
}
