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

//! The source side of the relayer: a confirmation delayed block walker
//! ([`EventListener`]) driving pluggable [`EventHandler`]s that turn chain
//! logs into canonical [`Message`](bridge_relayer_types::Message)s.
#![warn(missing_docs)]

mod client;
pub use client::ChainClient;

mod event_handler;
pub use event_handler::{EventHandler, EventHandlerWithRetry};

mod listener;
pub use listener::{EventListener, ListenerConfig};
