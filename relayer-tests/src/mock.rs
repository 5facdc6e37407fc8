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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bridge_event_watcher_traits::ChainClient;
use bridge_ew_evm::DepositEventSource;
use bridge_relayer_types::{
    Address, BlockNumber, DomainId, Proposal, ProposalEvent, ProposalStatus,
    RawDepositEvent, ResourceId, H256,
};
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::{BridgeClient, ProposalEventStream, TransactOptions};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A range handed to [`DepositEventSource::fetch_deposits`], with the head
/// the chain reported last before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    pub start: BlockNumber,
    pub end: BlockNumber,
    pub head: BlockNumber,
}

#[derive(Debug, Default)]
struct ChainState {
    head: BlockNumber,
    mined_per_poll: u64,
    failing_polls: usize,
    polls: usize,
    deposits: Vec<RawDepositEvent>,
    scans: Vec<Scan>,
}

/// The source side of a chain: its head and the `Deposit` logs of its
/// bridge. Clones share the same chain.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn with_head(head: BlockNumber) -> Self {
        let chain = Self::default();
        chain.state.lock().head = head;
        chain
    }

    pub fn head(&self) -> BlockNumber {
        self.state.lock().head
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.state.lock().head = head;
    }

    /// Every successful head poll mines `blocks` new blocks first.
    pub fn mine_per_poll(&self, blocks: u64) {
        self.state.lock().mined_per_poll = blocks;
    }

    /// The next `count` head polls fail with a connection error.
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().failing_polls = count;
    }

    /// How many times the head was asked for, failures included.
    pub fn polls(&self) -> usize {
        self.state.lock().polls
    }

    pub fn add_deposit(&self, deposit: RawDepositEvent) {
        self.state.lock().deposits.push(deposit);
    }

    pub fn scans(&self) -> Vec<Scan> {
        self.state.lock().scans.clone()
    }
}

#[async_trait::async_trait]
impl ChainClient for MockChain {
    async fn latest_block(&self) -> Result<BlockNumber> {
        let mut state = self.state.lock();
        state.polls += 1;
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(Error::Rpc("connection refused".into()));
        }
        state.head += state.mined_per_poll;
        Ok(state.head)
    }
}

#[async_trait::async_trait]
impl DepositEventSource for MockChain {
    async fn fetch_deposits(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<Vec<RawDepositEvent>> {
        let mut state = self.state.lock();
        let head = state.head;
        state.scans.push(Scan { start, end, head });
        let mut deposits: Vec<_> = state
            .deposits
            .iter()
            .filter(|d| (start..=end).contains(&d.block_number))
            .cloned()
            .collect();
        deposits.sort_by_key(|d| (d.block_number, d.deposit_nonce));
        Ok(deposits)
    }
}

type ProposalKey = (DomainId, u64, H256);

fn key_of(proposal: &Proposal) -> ProposalKey {
    (proposal.source, proposal.deposit_nonce, proposal.data_hash())
}

#[derive(Debug)]
struct BridgeState {
    handlers: HashMap<ResourceId, Address>,
    statuses: HashMap<ProposalKey, ProposalStatus>,
    voted: HashSet<ProposalKey>,
    votes: Vec<Proposal>,
    subscribers: Vec<mpsc::UnboundedSender<ProposalEvent>>,
    subscription_available: bool,
    vote_delay: Duration,
}

/// The destination side of a chain: a bridge contract with a single
/// relayer account and a vote threshold of one. Clones share the same
/// contract.
///
/// A second vote from the account fails like a node rejecting a reused
/// nonce.
#[derive(Debug, Clone)]
pub struct MockBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BridgeState {
                handlers: HashMap::new(),
                statuses: HashMap::new(),
                voted: HashSet::new(),
                votes: Vec::new(),
                subscribers: Vec::new(),
                subscription_available: true,
                vote_delay: Duration::ZERO,
            })),
        }
    }

    /// Makes every subscription attempt fail, like a node without a
    /// websocket endpoint.
    pub fn disable_subscription(&self) {
        self.state.lock().subscription_available = false;
    }

    /// Makes every vote take `delay` before it reaches the contract, like a
    /// congested node. [`Duration::ZERO`] restores instant votes.
    pub fn set_vote_delay(&self, delay: Duration) {
        self.state.lock().vote_delay = delay;
    }

    pub fn register_handler(&self, resource_id: ResourceId, handler: Address) {
        self.state.lock().handlers.insert(resource_id, handler);
    }

    pub fn set_status(&self, proposal: &Proposal, status: ProposalStatus) {
        self.state.lock().statuses.insert(key_of(proposal), status);
    }

    /// The proposals successfully voted on, in submission order.
    pub fn votes(&self) -> Vec<Proposal> {
        self.state.lock().votes.clone()
    }

    pub fn subscribers(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

#[async_trait::async_trait]
impl BridgeClient for MockBridge {
    async fn handler_address(&self, resource_id: ResourceId) -> Result<Address> {
        let state = self.state.lock();
        Ok(state.handlers.get(&resource_id).copied().unwrap_or_default())
    }

    async fn proposal_status(&self, proposal: &Proposal) -> Result<ProposalStatus> {
        let state = self.state.lock();
        Ok(state
            .statuses
            .get(&key_of(proposal))
            .copied()
            .unwrap_or(ProposalStatus::Inactive))
    }

    async fn has_voted(&self, proposal: &Proposal) -> Result<bool> {
        Ok(self.state.lock().voted.contains(&key_of(proposal)))
    }

    async fn vote(
        &self,
        proposal: &Proposal,
        _options: TransactOptions,
    ) -> Result<H256> {
        let delay = self.state.lock().vote_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        let key = key_of(proposal);
        if !state.voted.insert(key) {
            return Err(Error::Transaction("nonce too low".into()));
        }
        state.votes.push(proposal.clone());
        state.statuses.insert(key, ProposalStatus::Passed);
        let event = ProposalEvent {
            origin_domain: proposal.source,
            deposit_nonce: proposal.deposit_nonce,
            status: ProposalStatus::Passed,
            data_hash: key.2,
        };
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        Ok(H256::from_low_u64_be(state.votes.len() as u64))
    }

    async fn subscribe_proposal_events(&self) -> Result<ProposalEventStream> {
        let mut state = self.state.lock();
        if !state.subscription_available {
            return Err(Error::SubscriptionUnavailable(
                "no websocket endpoint".into(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }
}
