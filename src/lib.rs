// Copyright (c) 2026 Keelson
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Keelson - master-aware client for Paxos-replicated key/value clusters.
//!
//! This crate provides:
//! - The binary wire codec with incremental, transport-agnostic response
//!   parsers
//! - The complete request catalogue, typed end to end
//! - Transactional sequences (all-or-nothing scripts executed on the master)
//! - A connection orchestrator that locates the current master, validates
//!   its claim, and retries through leader re-elections within a bounded
//!   budget

/// Connection orchestrator, configuration, transport seams.
pub mod client;
/// Read-freshness guarantees.
pub mod consistency;
/// Error taxonomy.
pub mod errors;
/// Wire codec, framing, and the request catalogue.
pub mod protocol;
/// Transactional sequence language.
pub mod sequence;

pub use client::config::{ClusterConfig, NodeId, NodeLocation, TlsClientCert};
pub use client::connection::{Connector, TcpConnector, Transport};
pub use client::Client;
pub use consistency::Consistency;
pub use errors::{Error, Result};
pub use protocol::wire::StatValue;
pub use sequence::{Sequence, Step};
