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

//! The destination side of the relayer: turns [`Message`]s into proposals
//! for a bridge contract and votes on them, once.
//!
//! [`Message`]: bridge_relayer_types::Message
#![warn(missing_docs)]

mod bridge;
pub use bridge::{BridgeClient, ProposalEventStream, TransactOptions};

mod gas;
pub use gas::{GasPricer, StaticGasPricer};

mod message_handler;
pub use message_handler::{proposal_calldata, MessageHandlerRegistry};

mod voter;
pub use voter::{SkipReason, VoteOutcome, Voter, VoterSettings};
