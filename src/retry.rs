// Copyright 2024 XGov Relayer Contributors
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

//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;

/// The default number of backoffs before giving up.
pub const DEFAULT_MAX_RETRIES: usize = 5;
/// The default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);

/// Doubling with Max Retry Count is a backoff policy that waits
/// `initial_delay * 2^attempt` between attempts, until it exceeds the
/// maximum retry count.
///
/// No jitter is added; the backoff is strictly deterministic doubling so
/// the retry envelope is reproducible. With `max_retry_count` retries an
/// operation is attempted `max_retry_count + 1` times in total.
#[derive(Debug, Clone)]
pub struct DoublingWithMaxRetryCount {
    initial_delay: Duration,
    max_retry_count: usize,
    count: usize,
}

impl DoublingWithMaxRetryCount {
    /// Creates a new doubling backoff with `initial_delay` and
    /// `max_retry_count`. `initial_delay` is the duration to wait before
    /// the first retry, doubled on every subsequent retry, and
    /// `max_retry_count` is the maximum number of retries, after which we
    /// return `None` to indicate that we should stop retrying.
    pub fn new(initial_delay: Duration, max_retry_count: usize) -> Self {
        Self {
            initial_delay,
            max_retry_count,
            count: 0,
        }
    }
}

impl Default for DoublingWithMaxRetryCount {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_RETRIES)
    }
}

impl Backoff for DoublingWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            let delay = self.initial_delay * (1u32 << self.count);
            self.count += 1;
            delay
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}
