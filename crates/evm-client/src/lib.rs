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

//! The ethers implementation of the chain facing traits of the relayer:
//! [`ChainClient`] and [`DepositEventSource`] for the source side,
//! [`BridgeClient`] and [`GasPricer`] for the destination side.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_event_watcher_traits::ChainClient;
use bridge_ew_evm::DepositEventSource;
use bridge_relayer_types::{
    Address, BlockNumber, DomainId, Proposal, ProposalStatus, RawDepositEvent,
    ResourceId, H256,
};
use bridge_relayer_utils::{Error, Result};
use bridge_relayer_voter::{BridgeClient, ProposalEventStream, TransactOptions};
use ethers::prelude::{Middleware, TransactionRequest};
use ethers::types::{Bytes, Filter};
use parking_lot::RwLock;

mod abi;
pub use abi::{BridgeAbi, DepositLog};

mod gas;
pub use gas::ProviderGasPricer;

mod subscription;

/// Client of one bridge contract deployment.
///
/// Reads go through `client`; votes are sent through it too, so `client`
/// must sign for `relayer` (a `SignerMiddleware` in production).
#[derive(typed_builder::TypedBuilder)]
pub struct EvmClient<M> {
    #[builder(setter(into))]
    domain_id: DomainId,
    client: Arc<M>,
    /// The bridge contract address.
    bridge: Address,
    /// The account votes are sent from.
    relayer: Address,
    /// Enables [`BridgeClient::subscribe_proposal_events`].
    #[builder(default)]
    ws_endpoint: Option<url::Url>,
    abi: BridgeAbi,
    #[builder(default, setter(skip))]
    handlers: RwLock<HashMap<ResourceId, Address>>,
}

fn rpc_error(e: impl std::fmt::Display) -> Error {
    Error::Rpc(e.to_string())
}

impl<M> EvmClient<M>
where
    M: Middleware + 'static,
{
    /// The domain this client talks to.
    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    #[tracing::instrument(skip(self), fields(domain_id = %self.domain_id))]
    async fn call(&self, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::new().to(self.bridge).data(data);
        self.client.call(&tx.into(), None).await.map_err(rpc_error)
    }

    /// Resolves the handler of `resource_id`, once per resource.
    async fn resolve_handler(&self, resource_id: ResourceId) -> Result<Address> {
        let cached = self.handlers.read().get(&resource_id).copied();
        if let Some(address) = cached {
            return Ok(address);
        }
        let output = self
            .call(self.abi.encode_handler_address(resource_id)?)
            .await?;
        let address = self.abi.decode_handler_address(&output)?;
        // the zero address is not cached, the resource may be registered later.
        if !address.is_zero() {
            self.handlers.write().insert(resource_id, address);
        }
        Ok(address)
    }
}

#[async_trait::async_trait]
impl<M> ChainClient for EvmClient<M>
where
    M: Middleware + 'static,
{
    async fn latest_block(&self) -> Result<BlockNumber> {
        let head = self.client.get_block_number().await.map_err(rpc_error)?;
        Ok(head.as_u64())
    }
}

#[async_trait::async_trait]
impl<M> DepositEventSource for EvmClient<M>
where
    M: Middleware + 'static,
{
    #[tracing::instrument(skip(self), fields(domain_id = %self.domain_id))]
    async fn fetch_deposits(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<Vec<RawDepositEvent>> {
        let filter = Filter::new()
            .address(self.bridge)
            .topic0(self.abi.deposit_topic())
            .from_block(start)
            .to_block(end);
        let logs = self.client.get_logs(&filter).await.map_err(rpc_error)?;
        tracing::trace!("Found #{} deposit logs", logs.len());
        let mut deposits = Vec::with_capacity(logs.len());
        for log in logs {
            let block_number =
                log.block_number.map(|b| b.as_u64()).unwrap_or_default();
            let deposit = match self.abi.decode_deposit(&log) {
                Ok(deposit) => deposit,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        tx_hash = ?log.transaction_hash,
                        "Undecodable deposit log, skipping",
                    );
                    continue;
                }
            };
            let sender_handler_address =
                self.resolve_handler(deposit.resource_id).await?;
            deposits.push(RawDepositEvent {
                destination_domain: deposit.destination_domain,
                resource_id: deposit.resource_id,
                deposit_nonce: deposit.deposit_nonce,
                sender_handler_address,
                data: deposit.data,
                handler_response: deposit.handler_response,
                block_number,
            });
        }
        Ok(deposits)
    }
}

#[async_trait::async_trait]
impl<M> BridgeClient for EvmClient<M>
where
    M: Middleware + 'static,
{
    async fn handler_address(&self, resource_id: ResourceId) -> Result<Address> {
        self.resolve_handler(resource_id).await
    }

    async fn proposal_status(&self, proposal: &Proposal) -> Result<ProposalStatus> {
        let output = self.call(self.abi.encode_get_proposal(proposal)?).await?;
        self.abi.decode_proposal_status(&output)
    }

    async fn has_voted(&self, proposal: &Proposal) -> Result<bool> {
        let output = self
            .call(self.abi.encode_has_voted(proposal, self.relayer)?)
            .await?;
        self.abi.decode_has_voted(&output)
    }

    #[tracing::instrument(
        skip_all,
        fields(
            domain_id = %self.domain_id,
            source = %proposal.source,
            nonce = proposal.deposit_nonce,
        ),
    )]
    async fn vote(
        &self,
        proposal: &Proposal,
        options: TransactOptions,
    ) -> Result<H256> {
        let tx = TransactionRequest::new()
            .from(self.relayer)
            .to(self.bridge)
            .data(self.abi.encode_vote(proposal)?)
            .gas(options.gas_limit)
            .gas_price(options.gas_price);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| Error::Transaction(e.to_string()))?;
        let tx_hash = pending.tx_hash();
        tracing::debug!(?tx_hash, "Vote transaction submitted");
        Ok(tx_hash)
    }

    async fn subscribe_proposal_events(&self) -> Result<ProposalEventStream> {
        let url = self.ws_endpoint.clone().ok_or_else(|| {
            Error::SubscriptionUnavailable(format!(
                "no ws-endpoint configured for domain {}",
                self.domain_id
            ))
        })?;
        subscription::proposal_events(
            self.domain_id,
            url,
            self.bridge,
            self.abi.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::providers::{MockProvider, Provider};
    use ethers::types::{Log, U64};

    const BRIDGE: Address = Address::repeat_byte(0xbb);
    const HANDLER: Address = Address::repeat_byte(0x20);

    fn client() -> (EvmClient<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let client = EvmClient::builder()
            .domain_id(DomainId::new(1))
            .client(Arc::new(provider))
            .bridge(BRIDGE)
            .relayer(Address::repeat_byte(0x99))
            .abi(BridgeAbi::new().unwrap())
            .build();
        (client, mock)
    }

    fn address_output(address: Address) -> Bytes {
        encode(&[Token::Address(address)]).into()
    }

    fn deposit_log(abi: &BridgeAbi, nonce: u64, block: u64) -> Log {
        let data = encode(&[
            Token::Uint(2u8.into()),
            Token::FixedBytes(vec![0x42; 32]),
            Token::Uint(nonce.into()),
            Token::Bytes(vec![0; 32]),
            Token::Bytes(vec![]),
        ]);
        Log {
            address: BRIDGE,
            topics: vec![abi.deposit_topic(), H256::zero()],
            data: data.into(),
            block_number: Some(U64::from(block)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reads_the_head() {
        let (client, mock) = client();
        mock.push::<U64, _>(U64::from(1_234)).unwrap();
        assert_eq!(client.latest_block().await.unwrap(), 1_234);
    }

    #[tokio::test]
    async fn fetches_deposits_and_caches_handlers() {
        let (client, mock) = client();
        let abi = BridgeAbi::new().unwrap();
        // responses are served last in, first out.
        mock.push::<Bytes, _>(address_output(HANDLER)).unwrap();
        let mut garbage = deposit_log(&abi, 9, 11);
        garbage.data = Bytes::from(vec![1, 2, 3]);
        mock.push::<Vec<Log>, _>(vec![
            deposit_log(&abi, 7, 10),
            garbage,
            deposit_log(&abi, 8, 12),
        ])
        .unwrap();

        let deposits = client.fetch_deposits(10, 19).await.unwrap();
        assert_eq!(deposits.len(), 2);
        assert_eq!(deposits[0].deposit_nonce, 7);
        assert_eq!(deposits[0].block_number, 10);
        assert_eq!(deposits[1].deposit_nonce, 8);
        assert!(deposits.iter().all(|d| d.sender_handler_address == HANDLER));
        assert_eq!(deposits[0].destination_domain, DomainId::new(2));
        // a single eth_call, the second deposit hit the cache.
        assert_eq!(
            client.handlers.read().get(&ResourceId::new([0x42; 32])),
            Some(&HANDLER)
        );
    }

    #[tokio::test]
    async fn reads_status_and_votes() {
        let (client, mock) = client();
        let proposal = Proposal {
            source: DomainId::new(1),
            destination: DomainId::new(2),
            deposit_nonce: 3,
            resource_id: ResourceId::new([0x42; 32]),
            handler_address: HANDLER,
            data: vec![1],
        };
        let status: Bytes = encode(&[Token::Tuple(vec![
            Token::Uint(4u8.into()),
            Token::Uint(0u8.into()),
            Token::Uint(0u8.into()),
            Token::Uint(0u8.into()),
        ])])
        .into();
        mock.push::<Bytes, _>(status).unwrap();
        assert_eq!(
            client.proposal_status(&proposal).await.unwrap(),
            ProposalStatus::Cancelled
        );

        let voted: Bytes = encode(&[Token::Bool(true)]).into();
        mock.push::<Bytes, _>(voted).unwrap();
        assert!(client.has_voted(&proposal).await.unwrap());
    }

    #[tokio::test]
    async fn subscription_needs_a_websocket_endpoint() {
        let (client, _mock) = client();
        let err = client.subscribe_proposal_events().await.err().unwrap();
        assert!(matches!(err, Error::SubscriptionUnavailable(_)));
    }

    #[tokio::test]
    async fn rpc_failures_surface_as_rpc_errors() {
        let (client, _mock) = client();
        // nothing pushed: the mock fails the request.
        let err = client.latest_block().await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
    }
}
