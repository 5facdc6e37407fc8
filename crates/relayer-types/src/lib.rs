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

//! Types shared by every part of the bridge relayer: chain identities,
//! the canonical cross-chain [`Message`], and the destination side
//! [`Proposal`] view.

pub mod batch;
pub mod domain;
pub mod message;
pub mod private_key;
pub mod proposal;
pub mod rpc_url;

pub use batch::{Ack, Batch};
pub use domain::{DomainId, ResourceId};
pub use ethereum_types::{Address, H256, U256};
pub use message::{Message, RawDepositEvent, TransferType};
pub use proposal::{Proposal, ProposalEvent, ProposalStatus};

/// A block height on a source or destination chain.
pub type BlockNumber = u64;
