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
use std::sync::Arc;

use bridge_relayer_types::{Batch, DomainId, Message};
use bridge_relayer_utils::metric::Metrics;
use bridge_relayer_utils::{probe, Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::RelayedChain;

type VoterInputs = HashMap<DomainId, mpsc::Sender<Batch>>;

/// Runs every chain and routes the messages of their listeners to the voter
/// of the destination chain.
pub struct Relayer {
    chains: Vec<Arc<dyn RelayedChain>>,
    channel_capacity: usize,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Relayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let domains: Vec<_> = self.chains.iter().map(|c| c.domain_id()).collect();
        f.debug_struct("Relayer")
            .field("chains", &domains)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl Relayer {
    /// Creates a router over `chains`. Every channel it creates holds at
    /// most `channel_capacity` batches.
    pub fn new(
        chains: Vec<Arc<dyn RelayedChain>>,
        channel_capacity: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            chains,
            channel_capacity: channel_capacity.max(1),
            metrics,
        }
    }

    /// Starts the listener and the voter of every chain and routes messages
    /// until `cancel` fires or a task fails.
    ///
    /// The first fatal error cancels every other task and is returned once
    /// they all stopped.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let (listener_tx, mut listener_rx) =
            mpsc::channel::<Batch>(self.channel_capacity);
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<Error>();
        let mut voters = VoterInputs::new();
        let mut tasks = JoinSet::new();

        for chain in &self.chains {
            let domain_id = chain.domain_id();
            let (voter_tx, voter_rx) = mpsc::channel(self.channel_capacity);
            if voters.insert(domain_id, voter_tx).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "domain id {domain_id} is used by more than one chain"
                )));
            }

            let (task_chain, errors, task_cancel) =
                (chain.clone(), error_tx.clone(), cancel.clone());
            tasks.spawn(async move {
                if let Err(e) = task_chain.write(voter_rx, task_cancel).await {
                    tracing::error!(%domain_id, error = %e, "Voter stopped");
                    let _ = errors.send(e);
                }
            });

            let (task_chain, errors, task_cancel, sink) = (
                chain.clone(),
                error_tx.clone(),
                cancel.clone(),
                listener_tx.clone(),
            );
            tasks.spawn(async move {
                if let Err(e) = task_chain.poll_events(sink, task_cancel).await
                {
                    tracing::error!(%domain_id, error = %e, "Listener stopped");
                    let _ = errors.send(e);
                }
            });
        }
        // only the listeners hold the sending side now.
        drop(listener_tx);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            chains = self.chains.len(),
            started = true,
        );

        let mut listeners_done = false;
        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                Some(e) = error_rx.recv() => break Err(e),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        break Err(Error::TaskStoppedAbnormally(e.to_string()));
                    }
                }
                batch = listener_rx.recv(), if !listeners_done => match batch {
                    Some(batch) => {
                        if let Err(e) = self.route(batch, &voters, &cancel).await {
                            break Err(e);
                        }
                    }
                    None => listeners_done = true,
                },
            }
        };

        cancel.cancel();
        drop(voters);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task stopped abnormally");
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true,
        );
        result
    }

    /// Hands every message of `batch` to its destination voter, keeping the
    /// batch order per destination. Every part shares the ack of `batch`,
    /// so the listener hears back only once all destinations are done.
    async fn route(
        &self,
        mut batch: Batch,
        voters: &VoterInputs,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut routed: HashMap<DomainId, Vec<Message>> = HashMap::new();
        for message in std::mem::take(&mut batch.messages) {
            if message.destination == message.source {
                tracing::error!(%message, "Message destined to its own source, dropping it");
                self.metrics.messages_dropped.inc();
                continue;
            }
            if !voters.contains_key(&message.destination) {
                tracing::error!(%message, "No chain for destination, dropping message");
                self.metrics.messages_dropped.inc();
                continue;
            }
            routed.entry(message.destination).or_default().push(message);
        }

        for (destination, messages) in routed {
            let Some(voter) = voters.get(&destination) else {
                continue;
            };
            let count = messages.len();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = voter.send(batch.part(messages)) => {
                    sent.map_err(|_| Error::ChannelClosed("voter input"))?;
                }
            }
            self.metrics.messages_routed.inc_by(count as f64);
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Route,
                %destination,
                count,
            );
        }
        batch.ack.done();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use bridge_relayer_types::{ResourceId, TransferType};
    use tokio::sync::Mutex;

    use super::*;

    /// Sends one scripted batch, waits for its ack, then idles until
    /// cancelled. Everything its voter receives is forwarded to `inbox`.
    struct FakeChain {
        domain_id: DomainId,
        outbox: Mutex<Option<Vec<Message>>>,
        acked: AtomicBool,
        inbox: mpsc::UnboundedSender<Message>,
        broken_listener: bool,
    }

    impl FakeChain {
        fn new(
            domain_id: u8,
            outbox: Vec<Message>,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
            let (inbox, received) = mpsc::unbounded_channel();
            let chain = Self {
                domain_id: DomainId::new(domain_id),
                outbox: Mutex::new(Some(outbox)),
                acked: AtomicBool::new(false),
                inbox,
                broken_listener: false,
            };
            (Arc::new(chain), received)
        }

        fn broken(domain_id: u8) -> Arc<Self> {
            let (inbox, _) = mpsc::unbounded_channel();
            Arc::new(Self {
                domain_id: DomainId::new(domain_id),
                outbox: Mutex::new(None),
                acked: AtomicBool::new(false),
                inbox,
                broken_listener: true,
            })
        }
    }

    #[async_trait::async_trait]
    impl RelayedChain for FakeChain {
        fn domain_id(&self) -> DomainId {
            self.domain_id
        }

        async fn poll_events(
            &self,
            sink: mpsc::Sender<Batch>,
            cancel: CancellationToken,
        ) -> Result<()> {
            if self.broken_listener {
                return Err(Error::Rpc("connection refused".into()));
            }
            if let Some(messages) = self.outbox.lock().await.take() {
                let (batch, processed) = Batch::new(messages);
                sink.send(batch)
                    .await
                    .map_err(|_| Error::ChannelClosed("listener output"))?;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    acked = processed => {
                        self.acked.store(acked.is_ok(), Ordering::SeqCst);
                    }
                }
            }
            cancel.cancelled().await;
            Ok(())
        }

        async fn write(
            &self,
            mut messages: mpsc::Receiver<Batch>,
            cancel: CancellationToken,
        ) -> Result<()> {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    batch = messages.recv() => match batch {
                        Some(batch) => {
                            for message in &batch.messages {
                                let _ = self.inbox.send(message.clone());
                            }
                            batch.ack.done();
                        }
                        None => return Err(Error::ChannelClosed("voter input")),
                    },
                }
            }
        }
    }

    fn message(source: u8, destination: u8, nonce: u64) -> Message {
        Message::new(
            DomainId::new(source),
            DomainId::new(destination),
            nonce,
            ResourceId::default(),
            TransferType::Generic,
            vec![vec![0xab]],
        )
    }

    async fn next(received: &mut mpsc::UnboundedReceiver<Message>) -> Message {
        tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("message in time")
            .expect("inbox open")
    }

    async fn wait_for_ack(chain: &FakeChain) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !chain.acked.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("batch acknowledged in time")
    }

    #[tokio::test]
    async fn routes_messages_to_their_destination_voter() {
        let (one, mut one_received) = FakeChain::new(
            1,
            vec![message(1, 2, 1), message(1, 3, 2), message(1, 2, 3)],
        );
        let (two, mut two_received) = FakeChain::new(2, vec![]);
        let (three, mut three_received) =
            FakeChain::new(3, vec![message(3, 1, 7)]);
        let metrics = Arc::new(Metrics::new().unwrap());
        let relayer = Relayer::new(
            vec![one.clone(), two, three.clone()],
            4,
            metrics.clone(),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relayer.start(cancel.clone()));

        assert_eq!(next(&mut two_received).await.deposit_nonce, 1);
        assert_eq!(next(&mut two_received).await.deposit_nonce, 3);
        assert_eq!(next(&mut three_received).await.deposit_nonce, 2);
        assert_eq!(next(&mut one_received).await, message(3, 1, 7));
        // split over two voters, acknowledged once both are done.
        wait_for_ack(&one).await;
        wait_for_ack(&three).await;

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(metrics.messages_routed.get() as u64, 4);
        assert_eq!(metrics.messages_dropped.get() as u64, 0);
    }

    #[tokio::test]
    async fn unroutable_messages_are_dropped() {
        let (one, mut one_received) = FakeChain::new(
            1,
            vec![message(1, 1, 1), message(1, 9, 2), message(1, 2, 3)],
        );
        let (two, mut two_received) = FakeChain::new(2, vec![]);
        let metrics = Arc::new(Metrics::new().unwrap());
        let relayer = Relayer::new(vec![one.clone(), two], 4, metrics.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relayer.start(cancel.clone()));

        assert_eq!(next(&mut two_received).await.deposit_nonce, 3);
        wait_for_ack(&one).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(one_received.try_recv().is_err());
        assert!(two_received.try_recv().is_err());
        assert_eq!(metrics.messages_routed.get() as u64, 1);
        assert_eq!(metrics.messages_dropped.get() as u64, 2);
    }

    #[tokio::test]
    async fn fully_dropped_batches_are_acknowledged() {
        let (one, _one_received) =
            FakeChain::new(1, vec![message(1, 1, 1), message(1, 9, 2)]);
        let relayer = Relayer::new(
            vec![one.clone()],
            4,
            Arc::new(Metrics::new().unwrap()),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relayer.start(cancel.clone()));

        wait_for_ack(&one).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn first_fatal_error_stops_every_chain() {
        let (one, _one_received) = FakeChain::new(1, vec![]);
        let relayer = Relayer::new(
            vec![one, FakeChain::broken(2)],
            4,
            Arc::new(Metrics::new().unwrap()),
        );
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            relayer.start(cancel.clone()),
        )
        .await
        .expect("relayer stops on its own");

        assert!(matches!(result, Err(Error::Rpc(_))));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn duplicate_domains_are_rejected() {
        let (a, _) = FakeChain::new(1, vec![]);
        let (b, _) = FakeChain::new(1, vec![]);
        let relayer =
            Relayer::new(vec![a, b], 4, Arc::new(Metrics::new().unwrap()));
        let result = relayer.start(CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
