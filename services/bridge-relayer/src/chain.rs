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

use bridge_event_watcher_traits::{ChainClient, EventListener};
use bridge_relayer_store::{BlockStore, StartBlockOptions};
use bridge_relayer_types::{Batch, DomainId};
use bridge_relayer_utils::Result;
use bridge_relayer_voter::{BridgeClient, GasPricer, Voter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A chain the relayer reads deposits from and votes on.
///
/// The router runs [`RelayedChain::poll_events`] and
/// [`RelayedChain::write`] as two independent tasks.
#[async_trait::async_trait]
pub trait RelayedChain: Send + Sync {
    /// The domain of the chain.
    fn domain_id(&self) -> DomainId;

    /// Scans the chain for deposits and sends them to `sink` in batches,
    /// until `cancel` fires. The cursor only moves past a batch once it is
    /// acknowledged.
    async fn poll_events(
        &self,
        sink: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Votes on every message received on `messages` and acknowledges each
    /// fully processed batch, until `cancel` fires.
    async fn write(
        &self,
        messages: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// The default [`RelayedChain`]: an [`EventListener`] for the source side,
/// a [`Voter`] for the destination side, and the block cursor of the chain.
pub struct Chain<C, S, B, G> {
    listener: EventListener<C, S>,
    voter: Voter<B, G>,
    store: S,
    start: StartBlockOptions,
}

impl<C, S, B, G> Chain<C, S, B, G> {
    /// Binds `listener` and `voter` together. `store` must be the store the
    /// listener persists its cursor to.
    pub fn new(
        listener: EventListener<C, S>,
        voter: Voter<B, G>,
        store: S,
        start: StartBlockOptions,
    ) -> Self {
        Self {
            listener,
            voter,
            store,
            start,
        }
    }
}

#[async_trait::async_trait]
impl<C, S, B, G> RelayedChain for Chain<C, S, B, G>
where
    C: ChainClient + 'static,
    S: BlockStore + 'static,
    B: BridgeClient + 'static,
    G: GasPricer + 'static,
{
    fn domain_id(&self) -> DomainId {
        self.listener.config().domain_id
    }

    async fn poll_events(
        &self,
        sink: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let domain_id = self.domain_id();
        // a store that cannot be read is fatal, there is no safe place to start.
        let start = self.store.start_block(domain_id, self.start)?;
        match start {
            Some(block) => {
                tracing::info!(%domain_id, "Starting listener at block {block}")
            }
            None => tracing::info!(%domain_id, "Starting listener at the head"),
        }
        self.listener.listen(start, sink, cancel).await
    }

    async fn write(
        &self,
        messages: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.voter.run(messages, cancel).await
    }
}
