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

use bridge_relayer_types::{Address, TransferType};

/// Which transfer kind each source chain handler contract emits.
///
/// Built once from the chain configuration; addresses that are not
/// registered are simply not handled.
#[derive(Debug, Clone, Default)]
pub struct DepositHandlerRegistry {
    handlers: HashMap<Address, TransferType>,
}

impl DepositHandlerRegistry {
    /// Registers `address` as a handler of `kind`, replacing any previous kind.
    pub fn register(&mut self, address: Address, kind: TransferType) {
        self.handlers.insert(address, kind);
    }

    /// The kind of deposits `address` emits, if it is a known handler.
    pub fn kind_of(&self, address: &Address) -> Option<TransferType> {
        self.handlers.get(address).copied()
    }
}

impl FromIterator<(Address, TransferType)> for DepositHandlerRegistry {
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
