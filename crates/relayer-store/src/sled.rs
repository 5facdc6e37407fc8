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

use std::fmt::Debug;
use std::path::Path;

use bridge_relayer_types::BlockNumber;
use bridge_relayer_utils::Error;

use super::{BlockStore, BlockStoreKey};

#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> crate::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }
}

impl BlockStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn store_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        block_number: BlockNumber,
        key: K,
    ) -> crate::Result<()> {
        let key: BlockStoreKey = key.into();
        // A single key insert is atomic in sled; flushing makes it durable.
        self.db.insert(key.to_bytes(), &block_number.to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn load_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
    ) -> crate::Result<Option<BlockNumber>> {
        let key: BlockStoreKey = key.into();
        match self.db.get(key.to_bytes())? {
            Some(v) => {
                let bytes: [u8; 8] = v[..].try_into().map_err(|_| {
                    Error::Generic("corrupted block cursor in store")
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}
