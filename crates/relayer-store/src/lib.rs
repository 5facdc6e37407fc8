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

//! Block cursor storage.
//!
//! Each source chain persists the next block it has to scan under its own
//! key, so chains never contend on the same entry.

use std::fmt::{Debug, Display};

use bridge_relayer_types::{BlockNumber, DomainId};
use bridge_relayer_utils::Result;

pub mod mem;
#[cfg(feature = "sled")]
pub mod sled;

#[cfg(feature = "sled")]
pub use self::sled::SledStore;
pub use mem::InMemoryStore;

/// Key of a persisted block cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockStoreKey {
    pub domain_id: DomainId,
}

impl BlockStoreKey {
    pub const fn new(domain_id: DomainId) -> Self {
        Self { domain_id }
    }

    /// Returns the bytes of the key, `block:{domain_id}`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl Display for BlockStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block:{}", self.domain_id)
    }
}

impl From<DomainId> for BlockStoreKey {
    fn from(domain_id: DomainId) -> Self {
        Self { domain_id }
    }
}

impl From<u8> for BlockStoreKey {
    fn from(domain_id: u8) -> Self {
        Self {
            domain_id: DomainId::new(domain_id),
        }
    }
}

/// Where a listener should begin scanning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartBlockOptions {
    /// `start-block` from the chain configuration.
    pub configured: Option<BlockNumber>,
    /// Ignore everything and start from the current head.
    pub latest: bool,
    /// Ignore the persisted cursor and start from `configured`.
    pub fresh_start: bool,
}

/// A store of per domain block cursors.
pub trait BlockStore: Clone + Send + Sync {
    /// Persists `block_number` as the cursor of `key`, replacing any previous value.
    ///
    /// Must be crash safe: after a crash a subsequent [`BlockStore::load_block`]
    /// returns either the old or the new value.
    fn store_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        block_number: BlockNumber,
        key: K,
    ) -> Result<()>;

    /// Returns the last persisted cursor of `key`, or `None` if nothing was
    /// ever stored.
    fn load_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<BlockNumber>>;

    /// Decides the first block to scan for `key`.
    ///
    /// `None` means "start at the current head".
    fn start_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
        opts: StartBlockOptions,
    ) -> Result<Option<BlockNumber>> {
        if opts.latest {
            return Ok(None);
        }
        if opts.fresh_start {
            return Ok(opts.configured);
        }
        let stored = self.load_block(key)?;
        Ok(match (stored, opts.configured) {
            (Some(stored), Some(configured)) => Some(stored.max(configured)),
            (stored, configured) => stored.or(configured),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = BlockStoreKey::from(DomainId::new(7));
        assert_eq!(key.to_bytes(), b"block:7".to_vec());
    }

    #[test]
    fn start_block_prefers_latest_then_fresh_then_max() {
        let store = InMemoryStore::default();
        let key = DomainId::new(1);
        let opts = |configured, latest, fresh_start| StartBlockOptions {
            configured,
            latest,
            fresh_start,
        };

        assert_eq!(store.start_block(key, opts(Some(5), false, false)).unwrap(), Some(5));
        assert_eq!(store.start_block(key, opts(None, false, false)).unwrap(), None);

        store.store_block(40, key).unwrap();
        assert_eq!(store.start_block(key, opts(Some(5), false, false)).unwrap(), Some(40));
        assert_eq!(store.start_block(key, opts(Some(50), false, false)).unwrap(), Some(50));
        assert_eq!(store.start_block(key, opts(None, false, false)).unwrap(), Some(40));
        assert_eq!(store.start_block(key, opts(Some(5), false, true)).unwrap(), Some(5));
        assert_eq!(store.start_block(key, opts(Some(5), true, true)).unwrap(), None);
    }
}
