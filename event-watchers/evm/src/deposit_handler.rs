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

use bridge_event_watcher_traits::EventHandler;
use bridge_relayer_types::{BlockNumber, DomainId, Message};
use bridge_relayer_utils::metric::Metrics;

use crate::{decoder, DepositEventSource, DepositHandlerRegistry};

/// Turns the `Deposit` logs of a bridge contract into [`Message`]s.
///
/// Deposits made through a handler that is not in the registry are ignored.
/// Deposits whose calldata does not decode are logged and dropped.
#[derive(typed_builder::TypedBuilder)]
pub struct DepositEventHandler<E> {
    /// The domain this handler watches, stamped as the message source.
    #[builder(setter(into))]
    domain_id: DomainId,
    source: E,
    #[builder(setter(into))]
    registry: Arc<DepositHandlerRegistry>,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl<E> EventHandler for DepositEventHandler<E>
where
    E: DepositEventSource,
{
    fn tag(&self) -> &'static str {
        "Deposit Event Handler"
    }

    #[tracing::instrument(skip(self), fields(domain_id = %self.domain_id))]
    async fn handle_events(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> bridge_relayer_utils::Result<Vec<Message>> {
        let deposits = self.source.fetch_deposits(start, end).await?;
        let mut messages = Vec::with_capacity(deposits.len());
        for deposit in deposits {
            let Some(kind) =
                self.registry.kind_of(&deposit.sender_handler_address)
            else {
                tracing::trace!(
                    handler = ?deposit.sender_handler_address,
                    nonce = deposit.deposit_nonce,
                    "ignoring deposit of an unregistered handler",
                );
                continue;
            };
            let payload = match decoder::decode(kind, &deposit.data) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        nonce = deposit.deposit_nonce,
                        block = deposit.block_number,
                        %kind,
                        "failed to decode deposit, dropping it",
                    );
                    self.metrics.messages_dropped.inc();
                    continue;
                }
            };
            let message = Message::new(
                self.domain_id,
                deposit.destination_domain,
                deposit.deposit_nonce,
                deposit.resource_id,
                kind,
                payload,
            );
            tracing::debug!(
                block = deposit.block_number,
                %message,
                "Resolved deposit",
            );
            messages.push(message);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_relayer_types::{
        Address, RawDepositEvent, ResourceId, TransferType,
    };
    use bridge_relayer_utils::Error;
    use parking_lot::Mutex;

    const ERC20: Address = Address::repeat_byte(0x20);
    const GENERIC: Address = Address::repeat_byte(0x99);

    #[derive(Default)]
    struct FakeSource {
        deposits: Vec<RawDepositEvent>,
        fail: bool,
        calls: Mutex<Vec<(BlockNumber, BlockNumber)>>,
    }

    #[async_trait::async_trait]
    impl DepositEventSource for FakeSource {
        async fn fetch_deposits(
            &self,
            start: BlockNumber,
            end: BlockNumber,
        ) -> bridge_relayer_utils::Result<Vec<RawDepositEvent>> {
            self.calls.lock().push((start, end));
            if self.fail {
                return Err(Error::Rpc("connection reset by peer".into()));
            }
            Ok(self
                .deposits
                .iter()
                .filter(|d| (start..=end).contains(&d.block_number))
                .cloned()
                .collect())
        }
    }

    fn deposit(
        nonce: u64,
        handler: Address,
        data: Vec<u8>,
        block_number: BlockNumber,
    ) -> RawDepositEvent {
        RawDepositEvent {
            destination_domain: DomainId::new(2),
            resource_id: ResourceId::new([7u8; 32]),
            deposit_nonce: nonce,
            sender_handler_address: handler,
            data,
            handler_response: Vec::new(),
            block_number,
        }
    }

    fn erc20_data() -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[31] = 100;
        data[63] = 20;
        data.extend_from_slice(&[0xaa; 20]);
        data
    }

    fn handler(source: FakeSource) -> DepositEventHandler<FakeSource> {
        let registry: DepositHandlerRegistry = [
            (ERC20, TransferType::Fungible),
            (GENERIC, TransferType::Generic),
        ]
        .into_iter()
        .collect();
        DepositEventHandler::builder()
            .domain_id(DomainId::new(1))
            .source(source)
            .registry(registry)
            .metrics(Arc::new(Metrics::new().unwrap()))
            .build()
    }

    #[tokio::test]
    async fn stamps_source_and_keeps_log_order() {
        let mut generic = vec![0u8; 32];
        generic[31] = 2;
        generic.extend_from_slice(&[5, 6]);
        let source = FakeSource {
            deposits: vec![
                deposit(3, ERC20, erc20_data(), 37),
                deposit(4, GENERIC, generic, 38),
                deposit(5, ERC20, erc20_data(), 41),
            ],
            ..Default::default()
        };
        let handler = handler(source);
        let messages = handler.handle_events(30, 39).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.source == DomainId::new(1)));
        assert_eq!(messages[0].deposit_nonce, 3);
        assert_eq!(messages[0].kind, TransferType::Fungible);
        assert_eq!(messages[0].payload[1], vec![0xaa; 20]);
        assert_eq!(messages[1].deposit_nonce, 4);
        assert_eq!(messages[1].payload, vec![vec![5, 6]]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn skips_unknown_handlers_and_bad_calldata() {
        let source = FakeSource {
            deposits: vec![
                deposit(1, Address::repeat_byte(0x01), erc20_data(), 10),
                deposit(2, ERC20, vec![0u8; 83], 10),
                deposit(3, ERC20, erc20_data(), 10),
            ],
            ..Default::default()
        };
        let handler = handler(source);
        let messages = handler.handle_events(10, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].deposit_nonce, 3);
        assert_eq!(handler.metrics.messages_dropped.get() as u64, 1);
        assert!(logs_contain("failed to decode deposit"));
    }

    #[tokio::test]
    async fn source_errors_fail_the_range() {
        let source = FakeSource {
            fail: true,
            ..Default::default()
        };
        let handler = handler(source);
        let err = handler.handle_events(0, 9).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(handler.source.calls.lock().clone(), vec![(0, 9)]);
    }
}
