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

//! A batch of messages in flight between a listener and the voters, and
//! the acknowledgement that tells the listener its range may be committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::Message;

/// Messages scanned from one block range of a source chain.
///
/// The batch may be split on its way to the voters; every part carries a
/// clone of the same [`Ack`].
#[derive(Debug)]
pub struct Batch {
    /// The messages of the range.
    pub messages: Vec<Message>,
    /// Completion handle of the range.
    pub ack: Ack,
}

impl Batch {
    /// Wraps `messages` into a batch. The returned receiver resolves with
    /// `Ok(())` once every clone of the ack was marked done, and with an
    /// error as soon as the last clone is gone and any of them was dropped
    /// without being marked done.
    pub fn new(messages: Vec<Message>) -> (Self, oneshot::Receiver<()>) {
        let (ack, processed) = Ack::new();
        (Self { messages, ack }, processed)
    }

    /// A batch of `messages` sharing the ack of `self`.
    pub fn part(&self, messages: Vec<Message>) -> Self {
        Self {
            messages,
            ack: self.ack.clone(),
        }
    }
}

/// Shared completion handle of a [`Batch`].
///
/// Dropping a handle without calling [`Ack::done`] aborts the whole batch.
#[derive(Debug)]
pub struct Ack {
    state: Arc<AckState>,
    done: bool,
}

#[derive(Debug)]
struct AckState {
    tx: Option<oneshot::Sender<()>>,
    aborted: AtomicBool,
}

impl Ack {
    fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let state = AckState {
            tx: Some(tx),
            aborted: AtomicBool::new(false),
        };
        let ack = Self {
            state: Arc::new(state),
            done: false,
        };
        (ack, rx)
    }

    /// Marks this part of the batch as fully processed.
    pub fn done(mut self) {
        self.done = true;
    }
}

impl Clone for Ack {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            done: false,
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if !self.done {
            self.state.aborted.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for AckState {
    fn drop(&mut self) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_once_every_part_is_done() {
        let (batch, mut processed) = Batch::new(Vec::new());
        let a = batch.part(Vec::new());
        let b = batch.part(Vec::new());
        batch.ack.done();
        a.ack.done();
        assert!(processed.try_recv().is_err());
        b.ack.done();
        assert_eq!(processed.try_recv(), Ok(()));
    }

    #[test]
    fn one_dropped_part_aborts_the_batch() {
        let (batch, mut processed) = Batch::new(Vec::new());
        let part = batch.part(Vec::new());
        drop(part);
        batch.ack.done();
        assert_eq!(
            processed.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        );
    }
}
