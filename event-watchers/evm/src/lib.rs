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

//! Source side handlers for EVM bridge contracts: the `Deposit` log
//! decoders, the registry mapping handler contracts to transfer kinds, and
//! the [`EventHandler`](bridge_event_watcher_traits::EventHandler) that
//! ties them together.
#![warn(missing_docs)]

pub mod decoder;

mod deposit_handler;
pub use deposit_handler::DepositEventHandler;

mod registry;
pub use registry::DepositHandlerRegistry;

mod source;
pub use source::DepositEventSource;
