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

use bridge_relayer_types::{Address, DomainId};
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::ProposalEventStream;
use ethers::prelude::{Middleware, Provider, Ws};
use ethers::types::Filter;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::BridgeAbi;

/// Subscribes to the `ProposalEvent` logs of `bridge` over `url`.
///
/// The websocket provider lives in a background task that forwards the
/// decoded events; it stops when the returned stream is dropped and the
/// next event arrives, or when the connection closes. Returns once the
/// subscription is established.
pub(crate) async fn proposal_events(
    domain_id: DomainId,
    url: url::Url,
    bridge: Address,
    abi: BridgeAbi,
) -> Result<ProposalEventStream> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let filter = Filter::new()
        .address(bridge)
        .topic0(abi.proposal_event_topic());
    tokio::spawn(async move {
        let provider = match Provider::<Ws>::connect(url.as_str()).await {
            Ok(provider) => provider,
            Err(e) => {
                let _ = ready_tx
                    .send(Err(Error::SubscriptionUnavailable(e.to_string())));
                return;
            }
        };
        let mut logs = match provider.subscribe_logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                let _ = ready_tx
                    .send(Err(Error::SubscriptionUnavailable(e.to_string())));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));
        tracing::debug!(%domain_id, "Subscribed to proposal events");
        while let Some(log) = logs.next().await {
            match abi.decode_proposal_event(&log) {
                Ok(event) => {
                    if events_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(%domain_id, error = %e, "Undecodable proposal event");
                }
            }
        }
        tracing::debug!(%domain_id, "Proposal event subscription stopped");
    });
    ready_rx.await.map_err(|_| {
        Error::SubscriptionUnavailable("subscription task stopped".into())
    })??;
    let stream = futures::stream::unfold(events_rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    Ok(Box::pin(stream))
}
