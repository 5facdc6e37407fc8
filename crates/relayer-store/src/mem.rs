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
use std::fmt::Debug;
use std::sync::Arc;

use bridge_relayer_types::BlockNumber;
use parking_lot::RwLock;

use super::{BlockStore, BlockStoreKey};

/// A [`BlockStore`] that lives in memory. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    blocks: Arc<RwLock<HashMap<BlockStoreKey, BlockNumber>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl BlockStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn store_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        block_number: BlockNumber,
        key: K,
    ) -> crate::Result<()> {
        self.blocks.write().insert(key.into(), block_number);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn load_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<BlockNumber>> {
        Ok(self.blocks.read().get(&key.into()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::default();
        let other = store.clone();
        store.store_block(12, 3u8).unwrap();
        assert_eq!(other.load_block(3u8).unwrap(), Some(12));
    }
}
