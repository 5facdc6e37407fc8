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

//! Default values of optional configuration keys.

pub const fn enabled() -> bool {
    true
}
pub const fn channel_capacity() -> usize {
    16
}
pub const fn gas_limit() -> u64 {
    2_000_000
}
pub const fn gas_multiplier() -> f64 {
    1.0
}
/// Seconds.
pub const fn block_retry_interval() -> u64 {
    5
}
pub const fn block_confirmations() -> u64 {
    10
}
pub const fn block_interval() -> u64 {
    5
}
pub const fn max_retries() -> usize {
    5
}
/// Milliseconds.
pub const fn initial_retry_interval() -> u64 {
    500
}
/// Milliseconds.
pub const fn max_retry_interval() -> u64 {
    30_000
}
/// Seconds.
pub const fn follow_up_timeout() -> u64 {
    300
}
