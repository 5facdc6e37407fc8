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

//! End to end runs of a relayer over in memory chains: deposits go in on a
//! source chain and come out as votes on the destination bridge.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_store::{BlockStore, InMemoryStore};
use bridge_relayer_tests::utils::{
    cursor, generic_calldata, generic_deposit, generic_handler, relayer,
    wait_until, ForgetfulStore, TestChain, BLOCK_RETRY_INTERVAL, RESOURCE,
};
use bridge_relayer_types::{Address, DomainId};
use bridge_relayer_utils::metric::Metrics;
use tokio_util::sync::CancellationToken;

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn single_deposit_is_voted_on_its_destination() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    source.chain.add_deposit(generic_deposit(2, 1, 37, b"hello"));

    let store = InMemoryStore::default();
    let metrics = metrics();
    let cancel = CancellationToken::new();
    let relayer =
        relayer(&[&source, &destination], store.clone(), metrics.clone(), &cancel)
            .await;
    let handle = tokio::spawn(relayer.start(cancel.clone()));

    wait_until("a vote on chain 2", || destination.bridge.votes().len() == 1)
        .await;
    wait_until("the cursor of chain 1 to pass block 40", || {
        cursor(&store, 1) >= 40
    })
    .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let votes = destination.bridge.votes();
    assert_eq!(votes.len(), 1);
    let proposal = &votes[0];
    assert_eq!(proposal.source, DomainId::new(1));
    assert_eq!(proposal.destination, DomainId::new(2));
    assert_eq!(proposal.deposit_nonce, 1);
    assert_eq!(proposal.resource_id, RESOURCE);
    assert_eq!(proposal.handler_address, generic_handler());
    // the generic decoder and validator rebuild the deposit calldata.
    assert_eq!(proposal.data, generic_calldata(b"hello"));
    assert!(source.bridge.votes().is_empty());
    assert_eq!(metrics.votes_submitted.get() as u64, 1);
    assert!(logs_contain("Voted on proposal"));
}

#[tokio::test(start_paused = true)]
async fn crash_between_vote_and_commit_replays_without_a_second_vote() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    source.chain.add_deposit(generic_deposit(2, 1, 37, b"hello"));
    let durable = InMemoryStore::default();
    durable.store_block(30, 1u8).unwrap();

    // first life: the vote goes out, the cursor never reaches the disk.
    let cancel = CancellationToken::new();
    let first = relayer(
        &[&source, &destination],
        ForgetfulStore(durable.clone()),
        metrics(),
        &cancel,
    )
    .await;
    let handle = tokio::spawn(first.start(cancel.clone()));
    wait_until("the first vote", || destination.bridge.votes().len() == 1)
        .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(cursor(&durable, 1), 30);

    // second life: blocks 30..40 are scanned again.
    let scans_before = source.chain.scans().len();
    let metrics = metrics();
    let cancel = CancellationToken::new();
    let second =
        relayer(&[&source, &destination], durable.clone(), metrics.clone(), &cancel)
            .await;
    let handle = tokio::spawn(second.start(cancel.clone()));
    wait_until("the replayed deposit to be skipped", || {
        metrics.votes_skipped.get() as u64 == 1
    })
    .await;
    wait_until("the cursor to pass block 40", || cursor(&durable, 1) > 40).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(source.chain.scans()[scans_before].start, 30);
    assert_eq!(destination.bridge.votes().len(), 1);
    assert_eq!(metrics.votes_submitted.get() as u64, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_with_a_voting_backlog_loses_no_deposit() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    let deposits = [(1, 31), (2, 41), (3, 51), (4, 61), (5, 71), (6, 81)];
    for (nonce, block) in deposits {
        source.chain.add_deposit(generic_deposit(2, nonce, block, b"x"));
    }
    destination.bridge.set_vote_delay(Duration::from_secs(10));
    let store = InMemoryStore::default();

    // first life: shut down while the voter is still far behind.
    let cancel = CancellationToken::new();
    let first =
        relayer(&[&source, &destination], store.clone(), metrics(), &cancel)
            .await;
    let handle = tokio::spawn(first.start(cancel.clone()));
    wait_until("the first vote", || !destination.bridge.votes().is_empty())
        .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let voted: HashSet<u64> = destination
        .bridge
        .votes()
        .iter()
        .map(|p| p.deposit_nonce)
        .collect();
    assert!(voted.len() < deposits.len());
    let committed = cursor(&store, 1);
    for (nonce, block) in deposits {
        assert!(
            block >= committed || voted.contains(&nonce),
            "deposit {nonce} at block {block} is behind cursor {committed} without a vote",
        );
    }

    // second life: the backlog is scanned again and voted.
    destination.bridge.set_vote_delay(Duration::ZERO);
    let cancel = CancellationToken::new();
    let second =
        relayer(&[&source, &destination], store.clone(), metrics(), &cancel)
            .await;
    let handle = tokio::spawn(second.start(cancel.clone()));
    wait_until("every deposit to be voted", || {
        destination.bridge.votes().len() == deposits.len()
    })
    .await;
    wait_until("the cursor to pass block 90", || cursor(&store, 1) >= 90).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let votes = destination.bridge.votes();
    let unique: HashSet<u64> = votes.iter().map(|p| p.deposit_nonce).collect();
    assert_eq!(votes.len(), deposits.len());
    assert_eq!(unique, (1..=6).collect());
}

#[tokio::test(start_paused = true)]
async fn deposits_reach_their_own_destinations() {
    let source = TestChain::new(1, 100).starting_at(45);
    let two = TestChain::new(2, 100);
    let three = TestChain::new(3, 100);
    source.chain.add_deposit(generic_deposit(2, 1, 50, b"to two"));
    source.chain.add_deposit(generic_deposit(3, 2, 51, b"to three"));

    let store = InMemoryStore::default();
    let metrics = metrics();
    let cancel = CancellationToken::new();
    let relayer =
        relayer(&[&source, &two, &three], store, metrics.clone(), &cancel).await;
    let handle = tokio::spawn(relayer.start(cancel.clone()));

    wait_until("a vote on each destination", || {
        two.bridge.votes().len() == 1 && three.bridge.votes().len() == 1
    })
    .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let to_two = &two.bridge.votes()[0];
    assert_eq!((to_two.source, to_two.deposit_nonce), (DomainId::new(1), 1));
    let to_three = &three.bridge.votes()[0];
    assert_eq!((to_three.source, to_three.deposit_nonce), (DomainId::new(1), 2));
    assert_eq!(metrics.messages_routed.get() as u64, 2);
}

#[tokio::test(start_paused = true)]
async fn deposits_of_unknown_handlers_are_ignored() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    let mut deposit = generic_deposit(2, 1, 37, b"hello");
    deposit.sender_handler_address = Address::repeat_byte(0x99);
    source.chain.add_deposit(deposit);

    let store = InMemoryStore::default();
    let metrics = metrics();
    let cancel = CancellationToken::new();
    let relayer =
        relayer(&[&source, &destination], store.clone(), metrics.clone(), &cancel)
            .await;
    let handle = tokio::spawn(relayer.start(cancel.clone()));

    // windows of 10 blocks, 5 confirmations under a head of 100.
    wait_until("the cursor to reach block 90", || cursor(&store, 1) == 90).await;
    assert!(!handle.is_finished());
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(destination.bridge.votes().is_empty());
    assert_eq!(metrics.deposits_observed.get() as u64, 0);
    assert_eq!(metrics.messages_routed.get() as u64, 0);
}

#[tokio::test(start_paused = true)]
async fn head_fetch_failures_delay_but_lose_nothing() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    source.chain.add_deposit(generic_deposit(2, 1, 37, b"hello"));
    source.chain.fail_next_polls(5);

    let store = InMemoryStore::default();
    let metrics = metrics();
    let cancel = CancellationToken::new();
    let relayer =
        relayer(&[&source, &destination], store.clone(), metrics.clone(), &cancel)
            .await;
    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(relayer.start(cancel.clone()));

    wait_until("a vote on chain 2", || destination.bridge.votes().len() == 1)
        .await;
    assert!(started.elapsed() >= BLOCK_RETRY_INTERVAL * 5);
    wait_until("the cursor to pass block 40", || cursor(&store, 1) >= 40).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(metrics.listener_back_off.get() as u64, 5);
    assert_eq!(destination.bridge.votes()[0].deposit_nonce, 1);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn failed_subscription_falls_back_to_polling() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    destination.bridge.disable_subscription();
    source.chain.add_deposit(generic_deposit(2, 1, 37, b"hello"));

    let cancel = CancellationToken::new();
    let voter = destination.voter(metrics(), &cancel).await;
    assert!(!voter.is_subscribed());
    assert!(logs_contain("voting in polling mode"));

    let store = InMemoryStore::default();
    let relayer =
        relayer(&[&source, &destination], store.clone(), metrics(), &cancel).await;
    let handle = tokio::spawn(relayer.start(cancel.clone()));
    wait_until("a vote on chain 2", || destination.bridge.votes().len() == 1)
        .await;
    wait_until("the cursor to pass block 40", || cursor(&store, 1) >= 40).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(destination.bridge.votes().len(), 1);
    assert_eq!(destination.bridge.subscribers(), 0);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn subscribed_voter_follows_its_vote() {
    let source = TestChain::new(1, 100).starting_at(30);
    let destination = TestChain::new(2, 100);
    source.chain.add_deposit(generic_deposit(2, 1, 37, b"hello"));

    let store = InMemoryStore::default();
    let cancel = CancellationToken::new();
    let relayer =
        relayer(&[&source, &destination], store, metrics(), &cancel).await;
    assert_eq!(destination.bridge.subscribers(), 1);
    let handle = tokio::spawn(relayer.start(cancel.clone()));

    wait_until("a vote on chain 2", || destination.bridge.votes().len() == 1)
        .await;
    wait_until("the follow-up to see the proposal pass", || {
        logs_contain("Proposal settled")
    })
    .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(destination.bridge.votes().len(), 1);
}
