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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Bridge Relayer Crate 🕸️
//!
//! A crate for relaying deposits between the chains of a federated bridge.
//!
//! ## Overview
//!
//! Every chain of the federation runs the same bridge contract. Users deposit
//! on a *source* chain; the bridge emits a `Deposit` event naming the
//! *destination* chain. A relayer observes those events, turns each of them
//! into a canonical [`Message`] and votes for it on the destination bridge.
//! Once enough independent relayers voted, the destination bridge executes
//! the proposal.
//!
//! A relayer is one of many and may crash at any time, so the pipeline is
//! built to deliver every confirmed deposit at least once and to vote on it
//! at most once:
//!
//!   1. A listener per chain scans confirmed block ranges and persists its
//!      cursor only after the range was handed over.
//!   2. The [`Relayer`] router hands every message to the voter of its
//!      destination chain.
//!   3. A voter per chain reads the proposal status and its own vote before
//!      voting, so a replayed range never produces a second vote.
//!
//! [`Message`]: bridge_relayer_types::Message

/// Binding of a listener, a voter and a block cursor.
pub mod chain;
/// Routing of messages between chains.
pub mod relayer;
/// Building the chains from the configuration.
pub mod service;

pub use chain::{Chain, RelayedChain};
pub use relayer::Relayer;
