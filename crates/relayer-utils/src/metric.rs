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

use prometheus::core::{AtomicF64, GenericCounter};
use prometheus::{opts, Encoder, IntGauge, IntGaugeVec, Registry, TextEncoder};

/// Relayer metrics.
///
/// Every instance owns its own [`Registry`], so more than one relayer can
/// live in the same process (as the integration tests do).
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Deposit events decoded into messages by the listeners.
    pub deposits_observed: GenericCounter<AtomicF64>,
    /// Messages handed to a destination voter by the router.
    pub messages_routed: GenericCounter<AtomicF64>,
    /// Messages dropped before a vote: undecodable, unroutable or invalid.
    pub messages_dropped: GenericCounter<AtomicF64>,
    /// Vote transactions accepted by a destination chain.
    pub votes_submitted: GenericCounter<AtomicF64>,
    /// Messages the voter skipped (already voted, executed, invalid, ...).
    pub votes_skipped: GenericCounter<AtomicF64>,
    /// Messages the voter gave up on after exhausting its retries.
    pub vote_failures: GenericCounter<AtomicF64>,
    /// How many times a listener backed off because the head could not be fetched.
    pub listener_back_off: GenericCounter<AtomicF64>,
    /// Last block persisted by each listener, labelled by domain id.
    pub last_processed_block: IntGaugeVec,
    /// Size of the block store on disk, in bytes.
    pub store_size: IntGauge,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bridge_relayer".into()), None)?;
        let counter = |name: &str, help: &str| {
            let c = GenericCounter::<AtomicF64>::with_opts(opts!(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok::<_, prometheus::Error>(c)
        };

        let deposits_observed = counter(
            "deposits_observed",
            "The total number of deposit events turned into messages",
        )?;
        let messages_routed = counter(
            "messages_routed",
            "The total number of messages routed to a destination voter",
        )?;
        let messages_dropped = counter(
            "messages_dropped",
            "The total number of messages dropped before a vote",
        )?;
        let votes_submitted = counter(
            "votes_submitted",
            "The total number of vote transactions submitted",
        )?;
        let votes_skipped = counter(
            "votes_skipped",
            "The total number of messages skipped by the voter",
        )?;
        let vote_failures = counter(
            "vote_failures",
            "The total number of messages the voter failed to vote on",
        )?;
        let listener_back_off = counter(
            "listener_back_off",
            "specifies how many times a listener backed off fetching the head",
        )?;
        let last_processed_block = IntGaugeVec::new(
            opts!(
                "last_processed_block",
                "The last block height persisted by a listener"
            ),
            &["domain_id"],
        )?;
        registry.register(Box::new(last_processed_block.clone()))?;
        let store_size = IntGauge::with_opts(opts!(
            "store_size_bytes",
            "The size of the block store on disk"
        ))?;
        registry.register(Box::new(store_size.clone()))?;

        Ok(Self {
            registry,
            deposits_observed,
            messages_routed,
            messages_dropped,
            votes_submitted,
            votes_skipped,
            vote_failures,
            listener_back_off,
            last_processed_block,
            store_size,
        })
    }

    /// Records the last persisted block of a domain.
    pub fn set_last_processed_block(&self, domain_id: u8, block: u64) {
        self.last_processed_block
            .with_label_values(&[&domain_id.to_string()])
            .set(i64::try_from(block).unwrap_or(i64::MAX));
    }

    /// Gathers the whole relayer metrics in the prometheus text format.
    pub fn gather(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
