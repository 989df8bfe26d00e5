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

//! Client error taxonomy.
//!
//! Server-reported failures arrive on the wire as a nonzero response code
//! followed by a message string; [`Error::from_code`] demultiplexes them into
//! typed variants that keep the server message verbatim. The remaining
//! variants are raised client-side (connection handling, argument checks,
//! codec violations).

use crate::protocol::wire::WireError;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Wire code for an unknown generic failure.
pub const CODE_UNKNOWN_FAILURE: u32 = 0x00ff;
/// Wire code: command lacked the protocol magic.
pub const CODE_NO_MAGIC: u32 = 0x0001;
/// Wire code: too many unavailable nodes.
pub const CODE_TOO_MANY_DEAD_NODES: u32 = 0x0002;
/// Wire code: no hello was sent on this connection.
pub const CODE_NO_HELLO: u32 = 0x0003;
/// Wire code: the contacted node is not the master.
pub const CODE_NOT_MASTER: u32 = 0x0004;
/// Wire code: key not found.
pub const CODE_NOT_FOUND: u32 = 0x0005;
/// Wire code: cluster id mismatch.
pub const CODE_WRONG_CLUSTER: u32 = 0x0006;
/// Wire code: assertion failed.
pub const CODE_ASSERTION_FAILED: u32 = 0x0007;
/// Wire code: node is read-only.
pub const CODE_READ_ONLY: u32 = 0x0008;
/// Wire code: request outside the interval handled by the node.
pub const CODE_OUTSIDE_INTERVAL: u32 = 0x0009;
/// Wire code: node is going down.
pub const CODE_GOING_DOWN: u32 = 0x0010;
/// Wire code: unsupported operation.
pub const CODE_NOT_SUPPORTED: u32 = 0x0020;
/// Wire code: node lost mastership mid-operation.
pub const CODE_NO_LONGER_MASTER: u32 = 0x0021;
/// Wire code: bad input.
pub const CODE_BAD_INPUT: u32 = 0x0026;
/// Wire code: inconsistent read.
pub const CODE_INCONSISTENT_READ: u32 = 0x0080;
/// Wire code: connection limit reached.
pub const CODE_MAX_CONNECTIONS: u32 = 0x00fe;

/// All failures a request can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Generic failure reported by the server.
    #[error("unknown failure: {0}")]
    UnknownFailure(String),
    /// Command was sent without the protocol magic mask.
    #[error("no magic: {0}")]
    NoMagic(String),
    /// Too many nodes are unavailable to process the request.
    #[error("too many dead nodes: {0}")]
    TooManyDeadNodes(String),
    /// No hello was sent on the connection before a command.
    #[error("no hello: {0}")]
    NoHello(String),
    /// The contacted node is not the master.
    #[error("not master: {0}")]
    NotMaster(String),
    /// Key not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Cluster id does not match the server-side cluster.
    #[error("wrong cluster: {0}")]
    WrongCluster(String),
    /// Assertion on a key/value did not hold.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    /// Node is read-only.
    #[error("read only: {0}")]
    ReadOnly(String),
    /// Request falls outside the interval handled by the node.
    #[error("outside interval: {0}")]
    OutsideInterval(String),
    /// Node is shutting down.
    #[error("going down: {0}")]
    GoingDown(String),
    /// Operation not supported by the server.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Node lost mastership; the operation may or may not have been applied.
    #[error("no longer master: {0}")]
    NoLongerMaster(String),
    /// Server rejected the request input.
    #[error("bad input: {0}")]
    BadInput(String),
    /// Read could not satisfy the requested consistency.
    #[error("inconsistent read: {0}")]
    InconsistentRead(String),
    /// Server connection limit reached.
    #[error("max connections: {0}")]
    MaxConnections(String),
    /// Server returned a code outside the known table.
    #[error("unknown error code {code:#06x}, server said: {message}")]
    Unknown {
        /// Raw response code.
        code: u32,
        /// Verbatim server message.
        message: String,
    },

    /// No connection could be established to the node.
    #[error("no connection available to node at '{0}'")]
    NotConnected(String),
    /// No node could be validated as the cluster master.
    #[error("could not determine the cluster master node")]
    NoMaster,
    /// A node id outside the configured cluster was targeted.
    #[error("unknown node identifier: {0}")]
    UnknownNode(String),
    /// An argument failed validation before anything hit the wire.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// The peer closed the connection before a single byte was read.
    #[error("could not read a single byte from the connection")]
    ReadNoBytes,
    /// The connection did not become readable within the timeout.
    #[error("connection not readable within the timeout")]
    NotReadable,
    /// A read was attempted on a connection that is no longer open.
    #[error("cannot receive on a closed connection")]
    ReadClosed,
    /// I/O failure while reading.
    #[error("error while receiving data: {0}")]
    Read(#[source] std::io::Error),
    /// I/O failure while sending.
    #[error("error while sending data: {0}")]
    Send(#[source] std::io::Error),
    /// The byte stream violated the wire protocol.
    #[error("wire protocol violation: {0}")]
    Wire(#[from] WireError),
}

impl Error {
    /// Map a nonzero response code and its server message to a typed error.
    pub fn from_code(code: u32, message: String) -> Self {
        match code {
            CODE_UNKNOWN_FAILURE => Error::UnknownFailure(message),
            CODE_NO_MAGIC => Error::NoMagic(message),
            CODE_TOO_MANY_DEAD_NODES => Error::TooManyDeadNodes(message),
            CODE_NO_HELLO => Error::NoHello(message),
            CODE_NOT_MASTER => Error::NotMaster(message),
            CODE_NOT_FOUND => Error::NotFound(message),
            CODE_WRONG_CLUSTER => Error::WrongCluster(message),
            CODE_ASSERTION_FAILED => Error::AssertionFailed(message),
            CODE_READ_ONLY => Error::ReadOnly(message),
            CODE_OUTSIDE_INTERVAL => Error::OutsideInterval(message),
            CODE_GOING_DOWN => Error::GoingDown(message),
            CODE_NOT_SUPPORTED => Error::NotSupported(message),
            CODE_NO_LONGER_MASTER => Error::NoLongerMaster(message),
            CODE_BAD_INPUT => Error::BadInput(message),
            CODE_INCONSISTENT_READ => Error::InconsistentRead(message),
            CODE_MAX_CONNECTIONS => Error::MaxConnections(message),
            _ => Error::Unknown { code, message },
        }
    }

    /// Whether this failure may mean cluster leadership changed.
    pub fn is_master_loss(&self) -> bool {
        matches!(
            self,
            Error::NotMaster(_)
                | Error::NoLongerMaster(_)
                | Error::NoMaster
                | Error::NotConnected(_)
                | Error::ReadNoBytes
        )
    }

    /// Whether the orchestrator's outer loop may transparently retry this
    /// failure after clearing its notion of the master.
    ///
    /// Covers leadership loss plus connection drops: a timed-out or failed
    /// read tears the connection down, and the request re-enters the outer
    /// loop until the no-master deadline expires.
    pub fn is_retryable(&self) -> bool {
        self.is_master_loss()
            || matches!(self, Error::NotReadable | Error::ReadClosed | Error::Read(_))
    }
}
