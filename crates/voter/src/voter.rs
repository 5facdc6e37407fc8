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
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_types::{
    Address, Batch, DomainId, Message, Proposal, ProposalEvent, ProposalStatus,
    ResourceId, H256,
};
use bridge_relayer_utils::metric::Metrics;
use bridge_relayer_utils::retry::ExponentialWithMaxRetryCount;
use bridge_relayer_utils::{probe, Error, ErrorClass, Result};
use futures::{StreamExt, TryFutureExt};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{BridgeClient, GasPricer, MessageHandlerRegistry, TransactOptions};

/// Buffer of the proposal event fan-out. Slow follow-ups lag, they never
/// block the subscription.
const PROPOSAL_EVENTS_CAPACITY: usize = 256;

/// Gas and retry settings of a voter.
#[derive(Debug, Clone, Copy)]
pub struct VoterSettings {
    /// Gas limit of every vote transaction.
    pub gas_limit: u64,
    /// How many times a transient RPC failure is retried before the message
    /// is given up.
    pub max_retries: usize,
    /// First pause of the exponential retry backoff.
    pub initial_retry_interval: Duration,
    /// Upper bound of a single retry pause.
    pub max_retry_interval: Duration,
    /// How long a subscription voter waits for the proposal to settle after
    /// voting.
    pub follow_up_timeout: Duration,
}

/// Why a message was not voted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    /// The proposal was already executed or cancelled.
    #[display(fmt = "proposal is {}", _0)]
    Finalized(ProposalStatus),
    /// This relayer already has a vote on the proposal.
    #[display(fmt = "already voted")]
    AlreadyVoted,
    /// The chain rejected the vote as a nonce or replacement conflict,
    /// another instance with the same key got there first.
    #[display(fmt = "vote submitted by another instance")]
    SubmittedElsewhere,
}

/// What the voter did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// A vote transaction was submitted.
    Voted(H256),
    /// Nothing was submitted, see the reason.
    Skipped(SkipReason),
}

/// Votes on the proposals of one destination chain.
///
/// A voter is either *polling*, relying only on the status and vote reads
/// made before every submission, or *subscribed* to the `ProposalEvent`s of
/// the bridge, in which case every vote is followed until the proposal
/// settles or `follow_up_timeout` elapses.
#[derive(typed_builder::TypedBuilder)]
pub struct Voter<B, G> {
    /// The destination domain.
    #[builder(setter(into))]
    domain_id: DomainId,
    bridge: B,
    gas_pricer: G,
    #[builder(setter(into))]
    registry: Arc<MessageHandlerRegistry>,
    settings: VoterSettings,
    metrics: Arc<Metrics>,
    #[builder(default, setter(skip))]
    handlers: RwLock<HashMap<ResourceId, Address>>,
    #[builder(default, setter(skip))]
    events: Option<broadcast::Sender<ProposalEvent>>,
}

impl<B, G> Voter<B, G>
where
    B: BridgeClient,
    G: GasPricer,
{
    /// Turns this voter into a subscribed one.
    ///
    /// On error the voter stays a polling voter and remains usable.
    pub async fn enable_subscription(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stream = self.bridge.subscribe_proposal_events().await?;
        let (tx, _) = broadcast::channel(PROPOSAL_EVENTS_CAPACITY);
        let fanout = tx.clone();
        let cancel = cancel.clone();
        let domain_id = self.domain_id;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = stream.next() => match event {
                        // no follow-up waiting is fine.
                        Some(event) => { let _ = fanout.send(event); }
                        None => {
                            tracing::warn!(
                                %domain_id,
                                "proposal event subscription ended",
                            );
                            break;
                        }
                    },
                }
            }
        });
        self.events = Some(tx);
        Ok(())
    }

    /// Whether votes are followed through a subscription.
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Votes on every message received on `messages` until `cancel` fires.
    ///
    /// Failures of single messages are logged and the message dropped.
    /// A batch is acknowledged once each of its messages went through the
    /// pipeline; a batch interrupted by `cancel` is left unacknowledged so
    /// its range gets scanned again. The only error is `messages` closing
    /// while not cancelled.
    #[tracing::instrument(skip_all, fields(domain_id = %self.domain_id))]
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            domain_id = %self.domain_id,
            voter = true,
            subscribed = self.is_subscribed(),
        );
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = messages.recv() => batch,
            };
            let Some(batch) = batch else {
                if cancel.is_cancelled() {
                    break;
                }
                return Err(Error::ChannelClosed("voter input"));
            };
            for message in &batch.messages {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.process(message, &cancel).await;
            }
            if cancel.is_cancelled() {
                return Ok(());
            }
            batch.ack.done();
        }
        Ok(())
    }

    async fn process(&self, message: &Message, cancel: &CancellationToken) {
        match self.vote(message, cancel).await {
            Ok(VoteOutcome::Voted(tx_hash)) => {
                self.metrics.votes_submitted.inc();
                tracing::info!(%message, ?tx_hash, "Voted on proposal");
            }
            Ok(VoteOutcome::Skipped(reason)) => {
                self.metrics.votes_skipped.inc();
                tracing::debug!(%message, %reason, "Skipped proposal");
            }
            Err(Error::Cancelled) => {
                tracing::debug!(%message, "Vote abandoned on shutdown");
            }
            Err(e @ Error::InvalidMessage(_)) => {
                self.metrics.messages_dropped.inc();
                tracing::error!(%message, error = %e, "Dropping invalid message");
            }
            Err(e) => {
                self.metrics.vote_failures.inc();
                tracing::error!(%message, error = %e, "Failed to vote, dropping message");
            }
        }
    }

    /// Runs one message through the voting pipeline.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired during an RPC call or
    /// its retries.
    #[tracing::instrument(skip_all, fields(message = %message))]
    pub async fn vote(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<VoteOutcome> {
        let handler = self.handler_address(message.resource_id, cancel).await?;
        let proposal = self.registry.build_proposal(message, handler)?;

        let status = self
            .with_retry("proposal status", cancel, || {
                self.bridge.proposal_status(&proposal)
            })
            .await?;
        if status.is_terminal() {
            return Ok(VoteOutcome::Skipped(SkipReason::Finalized(status)));
        }
        let voted = self
            .with_retry("has voted", cancel, || self.bridge.has_voted(&proposal))
            .await?;
        if voted {
            return Ok(VoteOutcome::Skipped(SkipReason::AlreadyVoted));
        }

        // subscribe before submitting, the event may come right after.
        let follow_up = self.events.as_ref().map(|tx| tx.subscribe());
        let submitted = self
            .with_retry("vote", cancel, || async {
                let gas_price = self.gas_pricer.gas_price().await?;
                let options = TransactOptions {
                    gas_limit: self.settings.gas_limit,
                    gas_price,
                };
                self.bridge.vote(&proposal, options).await
            })
            .await;
        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(e) if e.classify() == ErrorClass::NonceConflict => {
                tracing::debug!(error = %e, "vote conflicts with a pending transaction");
                return Ok(VoteOutcome::Skipped(SkipReason::SubmittedElsewhere));
            }
            Err(e) => return Err(e),
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Vote,
            domain_id = %self.domain_id,
            source = %proposal.source,
            nonce = proposal.deposit_nonce,
            ?tx_hash,
        );
        if let Some(events) = follow_up {
            tokio::spawn(follow_up_proposal(
                proposal,
                events,
                self.settings.follow_up_timeout,
                cancel.clone(),
            ));
        }
        Ok(VoteOutcome::Voted(tx_hash))
    }

    async fn handler_address(
        &self,
        resource_id: ResourceId,
        cancel: &CancellationToken,
    ) -> Result<Address> {
        let cached = self.handlers.read().get(&resource_id).copied();
        if let Some(address) = cached {
            return Ok(address);
        }
        let address = self
            .with_retry("handler address", cancel, || {
                self.bridge.handler_address(resource_id)
            })
            .await?;
        if address.is_zero() {
            return Err(Error::InvalidMessage(format!(
                "resource {resource_id} has no handler on domain {}",
                self.domain_id
            )));
        }
        self.handlers.write().insert(resource_id, address);
        Ok(address)
    }

    /// Retries transient failures of `task` with exponential backoff.
    /// Gives up with [`Error::Cancelled`] as soon as `cancel` fires.
    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        cancel: &CancellationToken,
        mut task: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ExponentialWithMaxRetryCount::new(
            self.settings.initial_retry_interval,
            self.settings.max_retry_interval,
            self.settings.max_retries,
        );
        let domain_id = self.domain_id;
        let wrapped_task = || {
            task().map_err(|e| match e.classify() {
                ErrorClass::Transient => {
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Retry,
                        %domain_id,
                        op,
                        error = %e,
                    );
                    backoff::Error::transient(e)
                }
                _ => backoff::Error::permanent(e),
            })
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = backoff::future::retry(backoff, wrapped_task) => result,
        }
    }
}

/// Waits for `proposal` to pass, execute or be cancelled. Only ever logs.
async fn follow_up_proposal(
    proposal: Proposal,
    mut events: broadcast::Receiver<ProposalEvent>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let settled = async {
        loop {
            match events.recv().await {
                Ok(event)
                    if event.concerns(&proposal) && event.status.is_settled() =>
                {
                    return Some(event.status)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "proposal follow-up lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        outcome = tokio::time::timeout(timeout, settled) => match outcome {
            Ok(Some(status)) => tracing::info!(
                source = %proposal.source,
                nonce = proposal.deposit_nonce,
                %status,
                "Proposal settled",
            ),
            Ok(None) => tracing::warn!(
                source = %proposal.source,
                nonce = proposal.deposit_nonce,
                "Proposal event subscription closed before the proposal settled",
            ),
            Err(_) => tracing::warn!(
                source = %proposal.source,
                nonce = proposal.deposit_nonce,
                "Proposal did not settle within {timeout:?}, not resubmitting",
            ),
        },
    }
}
