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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_event_watcher_traits::{EventListener, ListenerConfig};
use bridge_ew_evm::{DepositEventHandler, DepositHandlerRegistry};
use bridge_relayer::{Chain, RelayedChain, Relayer};
use bridge_relayer_store::{
    BlockStore, BlockStoreKey, InMemoryStore, StartBlockOptions,
};
use bridge_relayer_types::{
    Address, BlockNumber, DomainId, RawDepositEvent, ResourceId, TransferType,
    U256,
};
use bridge_relayer_utils::metric::Metrics;
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::{
    MessageHandlerRegistry, StaticGasPricer, Voter, VoterSettings,
};
use tokio_util::sync::CancellationToken;

use crate::mock::{MockBridge, MockChain};

/// The resource every test deposit moves.
pub const RESOURCE: ResourceId = ResourceId::new([0x07; 32]);

pub const BLOCK_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const BLOCK_CONFIRMATIONS: u64 = 5;
pub const BLOCK_INTERVAL: u64 = 10;

/// The generic handler, deployed at the same address on every chain.
pub fn generic_handler() -> Address {
    Address::repeat_byte(0x33)
}

/// Calldata of a generic deposit: `len(metadata) | metadata`.
pub fn generic_calldata(metadata: &[u8]) -> Vec<u8> {
    let mut len = [0u8; 32];
    U256::from(metadata.len()).to_big_endian(&mut len);
    let mut data = len.to_vec();
    data.extend_from_slice(metadata);
    data
}

/// A generic deposit made through [`generic_handler`].
pub fn generic_deposit(
    destination: u8,
    nonce: u64,
    block: BlockNumber,
    metadata: &[u8],
) -> RawDepositEvent {
    RawDepositEvent {
        destination_domain: DomainId::new(destination),
        resource_id: RESOURCE,
        deposit_nonce: nonce,
        sender_handler_address: generic_handler(),
        data: generic_calldata(metadata),
        handler_response: Vec::new(),
        block_number: block,
    }
}

pub fn listener_config(domain_id: DomainId) -> ListenerConfig {
    ListenerConfig {
        domain_id,
        block_retry_interval: BLOCK_RETRY_INTERVAL,
        block_confirmations: BLOCK_CONFIRMATIONS,
        block_interval: BLOCK_INTERVAL,
    }
}

pub fn voter_settings() -> VoterSettings {
    VoterSettings {
        gas_limit: 1_000_000,
        max_retries: 3,
        initial_retry_interval: Duration::from_millis(100),
        max_retry_interval: Duration::from_secs(1),
        follow_up_timeout: Duration::from_secs(30),
    }
}

/// One chain of a test federation: a [`MockChain`] for the source side and
/// a [`MockBridge`] for the destination side.
#[derive(Debug, Clone)]
pub struct TestChain {
    pub domain_id: DomainId,
    pub chain: MockChain,
    pub bridge: MockBridge,
    pub start: StartBlockOptions,
}

impl TestChain {
    /// A chain at `head` whose bridge routes [`RESOURCE`] to the generic
    /// handler. Its listener starts at the head unless told otherwise.
    pub fn new(domain_id: u8, head: BlockNumber) -> Self {
        let bridge = MockBridge::new();
        bridge.register_handler(RESOURCE, generic_handler());
        Self {
            domain_id: DomainId::new(domain_id),
            chain: MockChain::with_head(head),
            bridge,
            start: StartBlockOptions::default(),
        }
    }

    pub fn starting_at(mut self, block: BlockNumber) -> Self {
        self.start.configured = Some(block);
        self
    }

    pub fn listener<S: BlockStore>(
        &self,
        store: S,
        metrics: Arc<Metrics>,
    ) -> EventListener<MockChain, S> {
        self.listener_with(store, metrics, listener_config(self.domain_id))
    }

    pub fn listener_with<S: BlockStore>(
        &self,
        store: S,
        metrics: Arc<Metrics>,
        config: ListenerConfig,
    ) -> EventListener<MockChain, S> {
        let registry: DepositHandlerRegistry =
            [(generic_handler(), TransferType::Generic)].into_iter().collect();
        let handler = DepositEventHandler::builder()
            .domain_id(self.domain_id)
            .source(self.chain.clone())
            .registry(registry)
            .metrics(metrics.clone())
            .build();
        EventListener::new(
            self.chain.clone(),
            vec![Box::new(handler)],
            store,
            config,
            metrics,
        )
    }

    /// The voter of this chain. It is subscribed to the proposal events of
    /// the bridge, unless the bridge refuses subscriptions.
    pub async fn voter(
        &self,
        metrics: Arc<Metrics>,
        cancel: &CancellationToken,
    ) -> Voter<MockBridge, StaticGasPricer> {
        let registry: MessageHandlerRegistry =
            [(generic_handler(), TransferType::Generic)].into_iter().collect();
        let mut voter = Voter::builder()
            .domain_id(self.domain_id)
            .bridge(self.bridge.clone())
            .gas_pricer(StaticGasPricer::new(1_000_000_000u64))
            .registry(registry)
            .settings(voter_settings())
            .metrics(metrics)
            .build();
        if let Err(e) = voter.enable_subscription(cancel).await {
            tracing::warn!(error = %e, "voting in polling mode");
        }
        voter
    }

    /// The listener and the voter of this chain, bound to `store`.
    pub async fn build<S: BlockStore + 'static>(
        &self,
        store: S,
        metrics: Arc<Metrics>,
        cancel: &CancellationToken,
    ) -> Arc<dyn RelayedChain> {
        let listener = self.listener(store.clone(), metrics.clone());
        let voter = self.voter(metrics, cancel).await;
        Arc::new(Chain::new(listener, voter, store, self.start))
    }
}

/// Builds every chain on `store` and the router running them.
pub async fn relayer<S: BlockStore + 'static>(
    chains: &[&TestChain],
    store: S,
    metrics: Arc<Metrics>,
    cancel: &CancellationToken,
) -> Relayer {
    let mut relayed = Vec::with_capacity(chains.len());
    for chain in chains {
        relayed.push(chain.build(store.clone(), metrics.clone(), cancel).await);
    }
    Relayer::new(relayed, 16, metrics)
}

/// Polls `condition` every 100ms of tokio time, panics after a minute.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..600 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

/// The persisted cursor of `domain_id`, zero if there is none.
pub fn cursor<S: BlockStore>(store: &S, domain_id: u8) -> BlockNumber {
    store
        .load_block(domain_id)
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// A store that never gets to write, like a relayer that crashes right
/// before every commit.
#[derive(Debug, Clone, Default)]
pub struct ForgetfulStore(pub InMemoryStore);

impl BlockStore for ForgetfulStore {
    fn store_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        _block_number: BlockNumber,
        _key: K,
    ) -> Result<()> {
        Err(Error::Generic("process crashed before the commit"))
    }

    fn load_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<BlockNumber>> {
        self.0.load_block(key)
    }
}

/// A store that crashes the relayer on its `crash_at`-th write, either
/// right before or right after the write reaches the inner store.
#[derive(Debug, Clone)]
pub struct CrashingStore {
    inner: InMemoryStore,
    writes: Arc<AtomicUsize>,
    crash_at: usize,
    lose_write: bool,
    crash: CancellationToken,
}

impl CrashingStore {
    pub fn new(
        inner: InMemoryStore,
        crash_at: usize,
        lose_write: bool,
        crash: CancellationToken,
    ) -> Self {
        Self {
            inner,
            writes: Arc::new(AtomicUsize::new(0)),
            crash_at,
            lose_write,
            crash,
        }
    }
}

impl BlockStore for CrashingStore {
    fn store_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        block_number: BlockNumber,
        key: K,
    ) -> Result<()> {
        let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if write >= self.crash_at {
            self.crash.cancel();
            if self.lose_write {
                return Err(Error::Generic("process crashed before the commit"));
            }
        }
        self.inner.store_block(block_number, key)
    }

    fn load_block<K: Into<BlockStoreKey> + Debug>(
        &self,
        key: K,
    ) -> Result<Option<BlockNumber>> {
        self.inner.load_block(key)
    }
}
