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

//! Decoders for the calldata a bridge handler emits in its `Deposit` log.
//!
//! Lengths embedded in the calldata are 32 byte big-endian words; every one
//! of them is checked against the buffer before it is used.

use bridge_relayer_types::TransferType;
use bridge_relayer_utils::{Error, Result};
use ethereum_types::U256;

const WORD: usize = 32;

/// Minimum calldata length of a fungible deposit: amount, recipient length
/// and a 20 byte recipient.
pub const FUNGIBLE_MIN_LEN: usize = 84;
/// Minimum calldata length of a non-fungible deposit: token id and
/// recipient length.
pub const NON_FUNGIBLE_MIN_LEN: usize = 64;
/// Minimum calldata length of a generic deposit: the metadata length.
pub const GENERIC_MIN_LEN: usize = 32;

/// Decodes `data` according to `kind` into a message payload.
pub fn decode(kind: TransferType, data: &[u8]) -> Result<Vec<Vec<u8>>> {
    match kind {
        TransferType::Fungible => decode_fungible(data),
        TransferType::NonFungible => decode_non_fungible(data),
        TransferType::Generic => decode_generic(data),
    }
}

/// `amount(32) | recipient_len(32) | recipient` into `[amount, recipient]`.
pub fn decode_fungible(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    ensure_len(data, FUNGIBLE_MIN_LEN, "fungible")?;
    let amount = data[..WORD].to_vec();
    let (recipient, _) = sized_chunk(data, WORD, "recipient")?;
    Ok(vec![amount, recipient.to_vec()])
}

/// `token_id(32) | recipient_len(32) | recipient | metadata_len(32) | metadata`
/// into `[token_id, recipient, metadata]`.
///
/// The metadata part is optional, an absent one decodes to an empty vector.
pub fn decode_non_fungible(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    ensure_len(data, NON_FUNGIBLE_MIN_LEN, "non-fungible")?;
    let token_id = data[..WORD].to_vec();
    let (recipient, next) = sized_chunk(data, WORD, "recipient")?;
    let metadata = if next < data.len() {
        sized_chunk(data, next, "metadata")?.0.to_vec()
    } else {
        Vec::new()
    };
    Ok(vec![token_id, recipient.to_vec(), metadata])
}

/// `metadata_len(32) | metadata` into `[metadata]`.
pub fn decode_generic(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    ensure_len(data, GENERIC_MIN_LEN, "generic")?;
    let (metadata, _) = sized_chunk(data, 0, "metadata")?;
    Ok(vec![metadata.to_vec()])
}

fn ensure_len(data: &[u8], min: usize, what: &str) -> Result<()> {
    if data.len() < min {
        return Err(Error::InvalidDepositData(format!(
            "{what} calldata is {} bytes, expected at least {min}",
            data.len()
        )));
    }
    Ok(())
}

/// Reads the length word at `offset` and the chunk that follows it.
/// Returns the chunk and the offset right after it.
fn sized_chunk<'a>(
    data: &'a [u8],
    offset: usize,
    what: &str,
) -> Result<(&'a [u8], usize)> {
    let word = data.get(offset..offset + WORD).ok_or_else(|| {
        Error::InvalidDepositData(format!("missing {what} length"))
    })?;
    let len = U256::from_big_endian(word);
    let start = offset + WORD;
    let end = usize::try_from(len)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            Error::InvalidDepositData(format!(
                "{what} length {len} overflows calldata of {} bytes",
                data.len()
            ))
        })?;
    Ok((&data[start..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(n: u64) -> Vec<u8> {
        let mut buf = [0u8; 32];
        U256::from(n).to_big_endian(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn fungible_deposit() {
        let recipient = [0xabu8; 20];
        let data = [word(1_000), word(20), recipient.to_vec()].concat();
        let payload = decode(TransferType::Fungible, &data).unwrap();
        assert_eq!(payload, vec![word(1_000), recipient.to_vec()]);
    }

    #[test]
    fn fungible_deposit_too_short() {
        let data = [word(1_000), word(20), vec![0xab; 19]].concat();
        assert_eq!(data.len(), 83);
        assert!(matches!(
            decode_fungible(&data),
            Err(Error::InvalidDepositData(_))
        ));
    }

    #[test]
    fn fungible_recipient_length_out_of_bounds() {
        let data = [word(1), word(64), vec![0xab; 20]].concat();
        assert!(decode_fungible(&data).is_err());
        let data = [word(1), vec![0xff; 32], vec![0xab; 20]].concat();
        assert!(decode_fungible(&data).is_err());
    }

    #[test]
    fn non_fungible_with_and_without_metadata() {
        let recipient = vec![0x11u8; 20];
        let metadata = b"ipfs://token".to_vec();
        let data = [
            word(42),
            word(20),
            recipient.clone(),
            word(metadata.len() as u64),
            metadata.clone(),
        ]
        .concat();
        let payload = decode(TransferType::NonFungible, &data).unwrap();
        assert_eq!(payload, vec![word(42), recipient.clone(), metadata]);

        let data = [word(42), word(20), recipient.clone()].concat();
        let payload = decode_non_fungible(&data).unwrap();
        assert_eq!(payload, vec![word(42), recipient, vec![]]);
    }

    #[test]
    fn non_fungible_too_short() {
        assert!(decode_non_fungible(&word(42)).is_err());
    }

    #[test]
    fn generic_deposit() {
        let data = [word(3), vec![1, 2, 3]].concat();
        let payload = decode(TransferType::Generic, &data).unwrap();
        assert_eq!(payload, vec![vec![1, 2, 3]]);

        let payload = decode_generic(&word(0)).unwrap();
        assert_eq!(payload, vec![Vec::<u8>::new()]);

        assert!(decode_generic(&[0u8; 31]).is_err());
    }
}
