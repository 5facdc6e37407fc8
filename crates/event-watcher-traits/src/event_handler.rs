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

use bridge_relayer_types::{BlockNumber, Message};
use futures::TryFutureExt;

/// Turns the logs of a block range into messages.
///
/// Handlers do not send anything themselves. The listener collects what
/// every handler returns for a range and delivers the batch once all of them
/// succeeded, which keeps handlers free of channels and easy to test.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// A Helper tag used to identify the handler in the logs.
    fn tag(&self) -> &'static str;

    /// Returns the messages for every relevant log in `start..=end`, in log
    /// order.
    ///
    /// Logs that cannot be decoded are not errors: they are logged and
    /// skipped, because the chain will never return anything different for
    /// them. Errors are reserved for failures worth retrying the range for.
    async fn handle_events(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> bridge_relayer_utils::Result<Vec<Message>>;
}

/// Retry support for [`EventHandler`]s.
#[async_trait::async_trait]
pub trait EventHandlerWithRetry: EventHandler {
    /// Same as [`EventHandler::handle_events`], but transient errors are
    /// retried according to `backoff`. Permanent errors are returned
    /// immediately.
    ///
    /// **Note**: this method is automatically implemented for all the event handlers.
    async fn handle_events_with_retry(
        &self,
        start: BlockNumber,
        end: BlockNumber,
        backoff: impl backoff::backoff::Backoff + Send + Sync + 'static,
    ) -> bridge_relayer_utils::Result<Vec<Message>> {
        let wrapped_task = || {
            self.handle_events(start, end).map_err(|e| {
                if e.is_transient() {
                    tracing::debug!(
                        handler = self.tag(),
                        error = %e,
                        "retrying range {start}..={end}",
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        };
        backoff::future::retry(backoff, wrapped_task).await
    }
}

impl<T> EventHandlerWithRetry for T where T: EventHandler + ?Sized {}
