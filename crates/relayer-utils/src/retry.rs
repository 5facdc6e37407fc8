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

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Constant backoff with a maximum number of retries.
#[derive(Debug)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new Constant backoff with `interval` and `max_retry_count`.
    /// `interval` is the duration to wait between retries, and `max_retry_count` is the maximum
    /// number of retries, after which we return `None` to indicate that we should stop retrying.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Exponential backoff (with jitter) that gives up after `max_retry_count` retries
/// instead of after an elapsed time.
#[derive(Debug)]
pub struct ExponentialWithMaxRetryCount {
    inner: ExponentialBackoff,
    max_retry_count: usize,
    count: usize,
}

impl ExponentialWithMaxRetryCount {
    /// Creates a new backoff starting at `initial_interval`, doubling up to
    /// `max_interval`, for at most `max_retry_count` retries.
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_retry_count: usize,
    ) -> Self {
        let inner = ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            inner,
            max_retry_count,
            count: 0,
        }
    }

    /// Number of retries handed out so far.
    pub fn retries(&self) -> usize {
        self.count
    }
}

impl Backoff for ExponentialWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count >= self.max_retry_count {
            return None;
        }
        self.count += 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.count = 0;
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_stops_after_max_retries() {
        let mut backoff =
            ConstantWithMaxRetryCount::new(Duration::from_millis(10), 2);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), None);
        backoff.reset();
        assert!(backoff.next_backoff().is_some());
    }

    #[test]
    fn exponential_backoff_grows_and_is_bounded() {
        let mut backoff = ExponentialWithMaxRetryCount::new(
            Duration::from_millis(100),
            Duration::from_millis(350),
            4,
        );
        let delays: Vec<_> =
            std::iter::from_fn(|| backoff.next_backoff()).collect();
        assert_eq!(delays.len(), 4);
        assert_eq!(backoff.retries(), 4);
        // 10% jitter around 100ms, then capped near 350ms.
        assert!(delays[0] >= Duration::from_millis(90));
        assert!(delays[0] <= Duration::from_millis(111));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(386)));
        assert!(delays[3] >= Duration::from_millis(315));
    }
}
