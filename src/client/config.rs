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

//! Cluster configuration: node locations, timeouts, retry budgets, TLS
//! material.

use crate::errors::Error;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier of one cluster node.
pub type NodeId = String;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TRY_COUNT: u32 = 1;
const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;
const DEFAULT_NO_MASTER_RETRY_SECS: u64 = 60;

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_try_count() -> u32 {
    DEFAULT_TRY_COUNT
}
fn default_backoff_base() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}
fn default_no_master_retry() -> u64 {
    DEFAULT_NO_MASTER_RETRY_SECS
}

/// Accept `"a, b"` as well as `["a", "b"]` for node addresses.
fn de_addresses<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::One(s) => s.split(',').map(|a| a.trim().to_string()).collect(),
        Raw::Many(v) => v,
    })
}

/// Where a node listens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLocation {
    /// Hostnames or IPs; the first is preferred, all are viable.
    #[serde(deserialize_with = "de_addresses")]
    pub addresses: Vec<String>,
    /// TCP port.
    pub port: u16,
}

impl NodeLocation {
    /// Location with a single address.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self { addresses: vec![address.into()], port }
    }
}

/// Client certificate and key paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsClientCert {
    /// Certificate path.
    pub cert: PathBuf,
    /// Private key path.
    pub key: PathBuf,
}

/// Everything the client needs to know about a cluster.
///
/// Created once per client and immutable afterwards. Loadable from TOML via
/// [`ClusterConfig::from_toml_str`]:
///
/// ```toml
/// cluster_id = "ricky"
/// [nodes.node_0]
/// addresses = ["127.0.0.1"]
/// port = 4000
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Must match the server-side cluster id.
    pub cluster_id: String,
    /// All cluster members.
    pub nodes: BTreeMap<NodeId, NodeLocation>,
    /// TCP connect (and read) timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Send attempts per node before giving up on it.
    #[serde(default = "default_try_count")]
    pub try_count: u32,
    /// Base for the randomised per-node backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Budget for retrying while no master can be found, in seconds.
    #[serde(default = "default_no_master_retry")]
    pub no_master_retry_secs: u64,
    /// Use TLS for node connections.
    #[serde(default)]
    pub tls: bool,
    /// CA certificate path; required when `tls_cert` is set.
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,
    /// Client certificate material; requires `tls_ca_cert`.
    #[serde(default)]
    pub tls_cert: Option<TlsClientCert>,
}

impl ClusterConfig {
    /// Configuration with default timeouts and no TLS.
    pub fn new(cluster_id: impl Into<String>, nodes: BTreeMap<NodeId, NodeLocation>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            nodes,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            try_count: DEFAULT_TRY_COUNT,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            no_master_retry_secs: DEFAULT_NO_MASTER_RETRY_SECS,
            tls: false,
            tls_ca_cert: None,
            tls_cert: None,
        }
    }

    /// Parse and validate a TOML rendition of the configuration.
    pub fn from_toml_str(input: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(input).map_err(|e| Error::InvalidArgument {
            name: "config",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the structural rules before any connection is attempted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidArgument {
                name: "nodes",
                reason: "at least one node is required".into(),
            });
        }
        for (node_id, location) in &self.nodes {
            if location.addresses.is_empty() {
                return Err(Error::InvalidArgument {
                    name: "nodes",
                    reason: format!("node '{node_id}' has no addresses"),
                });
            }
        }
        if self.tls_ca_cert.is_some() && !self.tls {
            return Err(Error::InvalidArgument {
                name: "tls_ca_cert",
                reason: "given while tls is disabled".into(),
            });
        }
        if self.tls_cert.is_some() && self.tls_ca_cert.is_none() {
            return Err(Error::InvalidArgument {
                name: "tls_cert",
                reason: "given without tls_ca_cert".into(),
            });
        }
        if let Some(ca) = &self.tls_ca_cert {
            check_file("tls_ca_cert", ca)?;
        }
        if let Some(cert) = &self.tls_cert {
            check_file("tls_cert", &cert.cert)?;
            check_file("tls_cert", &cert.key)?;
        }
        Ok(())
    }

    /// Location of a node, or `UnknownNode`.
    pub fn node_location(&self, node_id: &str) -> Result<&NodeLocation, Error> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))
    }

    /// TCP connect/read timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Randomised per-node backoff base.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    /// Retry budget while the master is unknown.
    pub fn no_master_retry(&self) -> Duration {
        Duration::from_secs(self.no_master_retry_secs)
    }
}

fn check_file(name: &'static str, path: &Path) -> Result<(), Error> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::InvalidArgument {
            name,
            reason: format!("not a file: {}", path.display()),
        })
    }
}
