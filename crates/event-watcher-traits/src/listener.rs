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

use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_store::BlockStore;
use bridge_relayer_types::{Batch, BlockNumber, DomainId, Message};
use bridge_relayer_utils::{metric::Metrics, probe, retry, Error};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{ChainClient, EventHandler, EventHandlerWithRetry};

/// How many times a handler gets to retry a transient failure in place,
/// before the whole range is given up and retried on the next tick.
const HANDLER_MAX_RETRY_COUNT: usize = 3;
const HANDLER_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Timing and confirmation parameters of a listener.
#[derive(Debug, Clone, Copy)]
pub struct ListenerConfig {
    /// The domain whose logs are scanned. Stamped on every message.
    pub domain_id: DomainId,
    /// Pause between polls when the head is unavailable or not deep enough.
    pub block_retry_interval: Duration,
    /// How deep the last block of a range must be before it is scanned.
    pub block_confirmations: u64,
    /// Width of a scanned range, at least 1.
    pub block_interval: u64,
}

/// The steps of the scan loop. Every `await` of the loop happens inside
/// exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Check for cancellation.
    Tick,
    /// Ask the chain for its head.
    FetchHead,
    /// Make sure `start..start + interval` is buried deep enough under `head`.
    CheckConfirm { head: BlockNumber },
    /// Run every handler over `start..end`, deliver the batch and wait
    /// until the voters are done with it.
    Handle { end: BlockNumber },
    /// Persist `end` as the cursor.
    Persist { end: BlockNumber },
    /// Move the window forward.
    Advance { end: BlockNumber },
}

/// Result of a sleep or a send that races the cancellation token.
enum Interrupted {
    No,
    Cancelled,
}

/// Confirmation delayed block walker of one source chain.
///
/// Scans `[start, start + block_interval)` windows once they are buried
/// under `block_confirmations` blocks, hands each window to every
/// [`EventHandler`], sends the resulting batch downstream and only once
/// every voter acknowledged it persists the next block to scan. A crash or
/// a shutdown at any point therefore replays at most the last window; it
/// never skips one.
pub struct EventListener<C, S> {
    client: C,
    handlers: Vec<Box<dyn EventHandler>>,
    store: S,
    config: ListenerConfig,
    metrics: Arc<Metrics>,
}

impl<C, S> std::fmt::Debug for EventListener<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<C, S> EventListener<C, S>
where
    C: ChainClient,
    S: BlockStore,
{
    /// Creates a new listener. `config.block_interval` of zero is treated as one.
    pub fn new(
        client: C,
        handlers: Vec<Box<dyn EventHandler>>,
        store: S,
        mut config: ListenerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        config.block_interval = config.block_interval.max(1);
        Self {
            client,
            handlers,
            store,
            config,
            metrics,
        }
    }

    /// The listener configuration.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Runs the scan loop until `cancel` fires.
    ///
    /// `start` is the first block to scan, `None` starts at the head seen on
    /// the first successful poll. Batches are sent on `sink` one at a time,
    /// and the cursor only moves past a batch once its [`Batch::ack`] is
    /// done. A batch dropped unacknowledged is scanned again. Returns an
    /// error only if `sink` is closed while the listener is still running.
    #[tracing::instrument(
        skip_all,
        fields(domain_id = %self.config.domain_id),
    )]
    pub async fn listen(
        &self,
        start: Option<BlockNumber>,
        sink: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> bridge_relayer_utils::Result<()> {
        let domain_id = self.config.domain_id;
        let mut start = start;
        let mut step = Step::Tick;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            %domain_id,
            started = true,
            start = ?start,
        );
        loop {
            step = match step {
                Step::Tick => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    Step::FetchHead
                }
                Step::FetchHead => match self.client.latest_block().await {
                    Ok(head) => Step::CheckConfirm { head },
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Unable to get latest block, retrying in {:?}",
                            self.config.block_retry_interval,
                        );
                        self.metrics.listener_back_off.inc();
                        match self.sleep(&cancel).await {
                            Interrupted::No => Step::Tick,
                            Interrupted::Cancelled => break,
                        }
                    }
                },
                Step::CheckConfirm { head } => {
                    let from = *start.get_or_insert(head);
                    let end = from.saturating_add(self.config.block_interval);
                    // head - end < confirmations, without underflow.
                    if head < end.saturating_add(self.config.block_confirmations)
                    {
                        tracing::trace!(
                            head,
                            end,
                            "waiting for {} confirmations",
                            self.config.block_confirmations,
                        );
                        match self.sleep(&cancel).await {
                            Interrupted::No => Step::Tick,
                            Interrupted::Cancelled => break,
                        }
                    } else {
                        Step::Handle { end }
                    }
                }
                Step::Handle { end } => {
                    let from = end - self.config.block_interval;
                    match self.handle_range(from, end - 1).await {
                        Ok(messages) if messages.is_empty() => {
                            Step::Persist { end }
                        }
                        Ok(messages) => {
                            let count = messages.len();
                            let (batch, processed) = Batch::new(messages);
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => break,
                                sent = sink.send(batch) => {
                                    if sent.is_err() {
                                        return Err(Error::ChannelClosed(
                                            "listener output",
                                        ));
                                    }
                                }
                            }
                            self.metrics.deposits_observed.inc_by(count as f64);
                            tracing::debug!(
                                count,
                                "Sent messages from blocks {from}..{end}",
                            );
                            // an unacknowledged batch must never be committed.
                            let acked = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => break,
                                acked = processed => acked.is_ok(),
                            };
                            if acked {
                                Step::Persist { end }
                            } else {
                                tracing::warn!(
                                    "Messages from blocks {from}..{end} were not fully processed, scanning them again",
                                );
                                match self.sleep(&cancel).await {
                                    Interrupted::No => Step::Tick,
                                    Interrupted::Cancelled => break,
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Unable to handle events of blocks {from}..{end}, will retry",
                            );
                            match self.sleep(&cancel).await {
                                Interrupted::No => Step::Tick,
                                Interrupted::Cancelled => break,
                            }
                        }
                    }
                }
                Step::Persist { end } => {
                    // Not a critical operation: a failed write only means a
                    // replay of this range after a restart.
                    if let Err(e) = self.store.store_block(end, domain_id) {
                        tracing::error!(
                            block = end,
                            error = %e,
                            "Failed to write latest block to blockstore",
                        );
                    } else {
                        self.metrics
                            .set_last_processed_block(domain_id.into(), end);
                    }
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::Sync,
                        %domain_id,
                        block = end,
                    );
                    Step::Advance { end }
                }
                Step::Advance { end } => {
                    start = Some(end);
                    Step::Tick
                }
            };
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            %domain_id,
            stopped = true,
        );
        Ok(())
    }

    /// Runs all handlers over `start..=end`. Fails if any of them failed,
    /// in which case nothing of the range is delivered.
    async fn handle_range(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> bridge_relayer_utils::Result<Vec<Message>> {
        let tasks = self.handlers.iter().map(|handler| {
            let backoff = retry::ConstantWithMaxRetryCount::new(
                HANDLER_RETRY_INTERVAL,
                HANDLER_MAX_RETRY_COUNT,
            );
            handler.handle_events_with_retry(start, end, backoff)
        });
        let results = futures::future::join_all(tasks).await;
        let mut batch = Vec::new();
        let mut first_error = None;
        for (handler, result) in self.handlers.iter().zip(results) {
            match result {
                Ok(messages) => batch.extend(messages),
                Err(e) => {
                    tracing::error!(
                        handler = handler.tag(),
                        error = %e,
                        "Handler failed on blocks {start}..={end}",
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(batch),
        }
    }

    async fn sleep(&self, cancel: &CancellationToken) -> Interrupted {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Interrupted::Cancelled,
            _ = tokio::time::sleep(self.config.block_retry_interval) => Interrupted::No,
        }
    }
}
