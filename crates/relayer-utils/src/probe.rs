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

//! Probes are structured `tracing` events emitted on a dedicated target so
//! that tests and operators can follow the relayer state without parsing
//! human readable log lines.
//!
//! ```ignore
//! tracing::event!(
//!     target: bridge_relayer_utils::probe::TARGET,
//!     tracing::Level::DEBUG,
//!     kind = %bridge_relayer_utils::probe::Kind::Sync,
//!     domain_id = 1,
//!     block = 42,
//! );
//! ```

use derive_more::Display;

/// Target for logger
pub const TARGET: &str = "bridge_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Relayer Sync state on a specific chain.
    #[display(fmt = "sync")]
    Sync,
    /// Messages routed between chains.
    #[display(fmt = "route")]
    Route,
    /// Votes submitted or skipped by a voter.
    #[display(fmt = "vote")]
    Vote,
    /// When the relayer will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
