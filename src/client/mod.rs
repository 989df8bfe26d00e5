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

//! The connection orchestrator.
//!
//! A [`Client`] owns a lazily-filled pool of node connections and the current
//! notion of which node is master. One mutex serialises everything: it is
//! taken before a request's bytes go out and released after its response is
//! fully parsed, so two callers can never interleave bytes on a connection.
//! Errors that may mean leadership changed clear the master and, within the
//! configured budget, are retried transparently.

/// Cluster configuration surface.
pub mod config;
/// Node connections and transport seams.
pub mod connection;

use crate::consistency::Consistency;
use crate::errors::{Error, Result};
use crate::protocol::messages;
use crate::protocol::wire::{Decoder, StatValue};
use crate::protocol::{Request, RequestOutput, ResponseDecoder};
use crate::sequence::Sequence;
use config::{ClusterConfig, NodeId};
use connection::{Connection, Connector, TcpConnector};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Linear backoff base of the outer no-master loop.
const MASTER_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Pool and leadership state, guarded by the per-client mutex.
struct Shared {
    connections: BTreeMap<NodeId, Connection>,
    master_id: Option<NodeId>,
}

impl Shared {
    fn drop_connections(&mut self) {
        for (_, mut conn) in std::mem::take(&mut self.connections) {
            conn.close();
        }
    }

    fn drop_node(&mut self, node_id: &str) {
        if let Some(mut conn) = self.connections.remove(node_id) {
            conn.close();
        }
    }
}

/// A client for one cluster.
///
/// Requests are FIFO per client; instantiate several clients for
/// parallelism. Every instance is fully independent.
pub struct Client {
    config: ClusterConfig,
    connector: Box<dyn Connector>,
    shared: Mutex<Shared>,
    consistency: std::sync::Mutex<Consistency>,
}

impl Client {
    /// Client over plain TCP.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Self::with_connector(config, Box::new(TcpConnector))
    }

    /// Client over a custom transport (TLS deployments, tests).
    pub fn with_connector(config: ClusterConfig, connector: Box<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            shared: Mutex::new(Shared { connections: BTreeMap::new(), master_id: None }),
            consistency: std::sync::Mutex::new(Consistency::Consistent),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    // -- lifecycle ----------------------------------------------------------

    /// Discover the master and open its connection.
    pub async fn connect(&self) -> Result<()> {
        let mut shared = self.shared.lock().await;
        self.determine_master(&mut shared).await?;
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn disconnect(&self) {
        self.drop_connections().await;
    }

    /// Close every pooled connection; the master notion is kept.
    pub async fn drop_connections(&self) {
        self.shared.lock().await.drop_connections();
    }

    /// Default consistency used by read operations.
    pub fn consistency(&self) -> Consistency {
        self.consistency.lock().map(|c| *c).unwrap_or_default()
    }

    /// Set the default consistency for subsequent reads.
    pub fn set_consistency(&self, c: Consistency) -> Result<()> {
        c.check()?;
        if let Ok(mut slot) = self.consistency.lock() {
            *slot = c;
        }
        Ok(())
    }

    /// Let subsequent reads be served from any replica, however stale.
    pub fn allow_dirty_reads(&self) {
        let _ = self.set_consistency(Consistency::Inconsistent);
    }

    /// Force subsequent reads through the master again.
    pub fn disallow_dirty_reads(&self) {
        let _ = self.set_consistency(Consistency::Consistent);
    }

    /// Fresh sequence builder.
    pub fn make_sequence(&self) -> Sequence {
        Sequence::new()
    }

    // -- dispatch core ------------------------------------------------------

    /// Send one request and parse its response.
    ///
    /// With an explicit `node_id` the request goes to that node directly and
    /// no master discovery happens; otherwise the master is located first.
    /// With `retry`, failures that may mean leadership changed are retried
    /// until the no-master budget runs out.
    pub async fn process<R: Request>(
        &self,
        request: &R,
        node_id: Option<&str>,
        retry: bool,
    ) -> Result<RequestOutput<R>> {
        self.process_inner(request, node_id, retry, false).await
    }

    async fn process_inner<R: Request>(
        &self,
        request: &R,
        node_id: Option<&str>,
        retry: bool,
        unbounded_read: bool,
    ) -> Result<RequestOutput<R>> {
        request.check()?;
        let bytes = request.serialize();

        // Held from pre-send to post-receive: requests are strictly FIFO.
        let mut shared = self.shared.lock().await;

        let deadline = Instant::now() + self.config.no_master_retry();
        let mut attempt: u32 = 0;
        loop {
            match self
                .attempt_once::<R::Payload>(&mut shared, &bytes, node_id, unbounded_read)
                .await
            {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    shared.master_id = None;
                    shared.drop_connections();

                    let pause = MASTER_RETRY_BACKOFF * attempt;
                    if retry && Instant::now() + pause <= deadline {
                        attempt += 1;
                        warn!(
                            error = %e,
                            backoff_ms = pause.as_millis() as u64,
                            "master not found, retrying"
                        );
                        tokio::time::sleep(pause).await;
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_once<D: Decoder + Default>(
        &self,
        shared: &mut Shared,
        bytes: &[u8],
        node_id: Option<&str>,
        unbounded_read: bool,
    ) -> Result<D::Item> {
        let target: NodeId = match node_id {
            Some(id) => {
                self.config.node_location(id)?;
                id.to_string()
            }
            None => self.determine_master(shared).await?,
        };

        self.send_to_node(shared, &target, bytes).await?;

        let conn = shared
            .connections
            .get_mut(&target)
            .ok_or_else(|| Error::NotConnected(target.clone()))?;
        if unbounded_read {
            conn.set_read_timeout(None);
        }
        let mut decoder = ResponseDecoder::<D>::default();
        match conn.receive(&mut decoder).await {
            Ok(reply) => {
                conn.set_read_timeout(Some(self.config.connect_timeout()));
                // A server-reported error leaves the connection usable,
                // except WrongCluster, which is fatal to the connection.
                if matches!(reply, Err(Error::WrongCluster(_))) {
                    shared.drop_node(&target);
                }
                reply
            }
            Err(e) => {
                // The response stream is in an unknown state; leadership may
                // have changed as well.
                shared.drop_node(&target);
                shared.master_id = None;
                Err(e)
            }
        }
    }

    /// Per-node send loop: up to `try_count` attempts with randomised,
    /// linearly growing backoff between them.
    async fn send_to_node(&self, shared: &mut Shared, node_id: &str, bytes: &[u8]) -> Result<()> {
        let tries = self.config.try_count.max(1);
        let mut last_err = None;

        for attempt in 0..tries {
            if attempt > 0 {
                let cap_ms = self.config.backoff_base().as_millis() as u64 * u64::from(attempt);
                let pause = Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms));
                tokio::time::sleep(pause).await;
            }

            match self.try_send(shared, node_id, bytes).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(node = node_id, error = %e, "message exchange with node failed");
                    shared.drop_node(node_id);
                    shared.master_id = None;
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::NotConnected(node_id.to_string())))
    }

    async fn try_send(&self, shared: &mut Shared, node_id: &str, bytes: &[u8]) -> Result<()> {
        if !shared.connections.contains_key(node_id) {
            let location = self.config.node_location(node_id)?;
            let conn = Connection::open(
                self.connector.as_ref(),
                location,
                self.config.cluster_id.as_bytes(),
                self.config.connect_timeout(),
            )
            .await?;
            debug!(node = node_id, peer = conn.peer(), "connection opened");
            shared.connections.insert(node_id.to_string(), conn);
        }
        let conn = shared
            .connections
            .get_mut(node_id)
            .ok_or_else(|| Error::NotConnected(node_id.to_string()))?;
        conn.send(bytes).await
    }

    // -- master discovery ---------------------------------------------------

    /// Locate and validate the master, reusing a cached answer when present.
    ///
    /// Nodes are queried in random order. A node's claim about *another* node
    /// is only accepted once that node also claims itself; a self-claim is
    /// accepted directly.
    async fn determine_master(&self, shared: &mut Shared) -> Result<NodeId> {
        if let Some(master) = shared.master_id.clone() {
            return Ok(master);
        }

        let mut candidates: Vec<NodeId> = self.config.nodes.keys().cloned().collect();
        candidates.shuffle(&mut rand::thread_rng());

        for node in candidates {
            let claimed = match self.who_master_on(shared, &node).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(node = %node, error = %e, "unable to query node to look up master");
                    continue;
                }
            };
            let Some(master) = claimed else { continue };

            if master == node {
                shared.master_id = Some(master.clone());
                return Ok(master);
            }

            match self.who_master_on(shared, &master).await {
                Ok(Some(own)) if own == master => {
                    shared.master_id = Some(master.clone());
                    return Ok(master);
                }
                Ok(_) => {
                    warn!(node = %node, claimed = %master, "node's master claim failed validation");
                }
                Err(e) => {
                    warn!(claimed = %master, error = %e, "unable to validate master");
                }
            }
        }

        warn!("unable to determine master node");
        Err(Error::NoMaster)
    }

    async fn who_master_on(&self, shared: &mut Shared, node_id: &str) -> Result<Option<NodeId>> {
        let bytes = messages::WhoMaster.serialize();
        self.send_to_node(shared, node_id, &bytes).await?;

        let conn = shared
            .connections
            .get_mut(node_id)
            .ok_or_else(|| Error::NotConnected(node_id.to_string()))?;
        let mut decoder =
            ResponseDecoder::<<messages::WhoMaster as Request>::Payload>::default();
        match conn.receive(&mut decoder).await {
            Ok(reply) => Ok(reply?.map(|raw| String::from_utf8_lossy(&raw).into_owned())),
            Err(e) => {
                shared.drop_node(node_id);
                Err(e)
            }
        }
    }

    // -- one method per message ---------------------------------------------

    /// Handshake with the master; returns the server's greeting.
    pub async fn hello(
        &self,
        client_id: impl Into<Vec<u8>>,
        cluster_id: impl Into<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let request =
            messages::Hello { client_id: client_id.into(), cluster_id: cluster_id.into() };
        self.process(&request, None, true).await
    }

    /// Discover (and validate) the current master's node id.
    pub async fn who_master(&self) -> Result<NodeId> {
        let mut shared = self.shared.lock().await;
        self.determine_master(&mut shared).await
    }

    /// Whether `key` is bound.
    pub async fn exists(&self, key: impl Into<Vec<u8>>) -> Result<bool> {
        let request = messages::Exists { consistency: self.consistency(), key: key.into() };
        self.process(&request, None, true).await
    }

    /// Value bound to `key`; `NotFound` when absent.
    pub async fn get(&self, key: impl Into<Vec<u8>>) -> Result<Vec<u8>> {
        let request = messages::Get { consistency: self.consistency(), key: key.into() };
        self.process(&request, None, true).await
    }

    /// Bind `key` to `value`.
    pub async fn set(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        let request = messages::Set { key: key.into(), value: value.into() };
        self.process(&request, None, true).await
    }

    /// Remove `key`; `NotFound` when absent.
    pub async fn delete(&self, key: impl Into<Vec<u8>>) -> Result<()> {
        let request = messages::Delete { key: key.into() };
        self.process(&request, None, true).await
    }

    /// Keys between `begin_key` and `end_key`, ascending.
    pub async fn range(
        &self,
        begin_key: Option<Vec<u8>>,
        begin_inclusive: bool,
        end_key: Option<Vec<u8>>,
        end_inclusive: bool,
        max_elements: i32,
    ) -> Result<Vec<Vec<u8>>> {
        let request = messages::Range {
            consistency: self.consistency(),
            begin_key,
            begin_inclusive,
            end_key,
            end_inclusive,
            max_elements,
        };
        self.process(&request, None, true).await
    }

    /// Key/value pairs between `begin_key` and `end_key`, ascending.
    pub async fn range_entries(
        &self,
        begin_key: Option<Vec<u8>>,
        begin_inclusive: bool,
        end_key: Option<Vec<u8>>,
        end_inclusive: bool,
        max_elements: i32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let request = messages::RangeEntries {
            consistency: self.consistency(),
            begin_key,
            begin_inclusive,
            end_key,
            end_inclusive,
            max_elements,
        };
        self.process(&request, None, true).await
    }

    /// Key/value pairs walked downwards from `begin_key`.
    pub async fn rev_range_entries(
        &self,
        begin_key: Option<Vec<u8>>,
        begin_inclusive: bool,
        end_key: Option<Vec<u8>>,
        end_inclusive: bool,
        max_elements: i32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let request = messages::RevRangeEntries {
            consistency: self.consistency(),
            begin_key,
            begin_inclusive,
            end_key,
            end_inclusive,
            max_elements,
        };
        self.process(&request, None, true).await
    }

    /// Keys starting with `prefix`.
    pub async fn prefix_keys(
        &self,
        prefix: impl Into<Vec<u8>>,
        max_elements: i32,
    ) -> Result<Vec<Vec<u8>>> {
        let request = messages::PrefixKeys {
            consistency: self.consistency(),
            prefix: prefix.into(),
            max_elements,
        };
        self.process(&request, None, true).await
    }

    /// Compare-and-swap; returns the pre-image.
    pub async fn test_and_set(
        &self,
        key: impl Into<Vec<u8>>,
        test_value: Option<Vec<u8>>,
        set_value: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let request = messages::TestAndSet { key: key.into(), test_value, set_value };
        self.process(&request, None, true).await
    }

    /// Values for `keys`; `NotFound` if any key is missing.
    pub async fn multi_get(&self, keys: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        let request = messages::MultiGet { consistency: self.consistency(), keys };
        self.process(&request, None, true).await
    }

    /// Values for `keys`, positionally; missing keys come back `None`.
    pub async fn multi_get_option(&self, keys: Vec<Vec<u8>>) -> Result<Vec<Option<Vec<u8>>>> {
        let request = messages::MultiGetOption { consistency: self.consistency(), keys };
        self.process(&request, None, true).await
    }

    /// Execute a sequence atomically on the master.
    pub async fn sequence(&self, sequence: &Sequence) -> Result<()> {
        let request = messages::Sequence { sequence: sequence.clone(), sync: false };
        self.process(&request, None, true).await
    }

    /// Like [`Client::sequence`], but durable before the acknowledgement.
    pub async fn synced_sequence(&self, sequence: &Sequence) -> Result<()> {
        let request = messages::Sequence { sequence: sequence.clone(), sync: true };
        self.process(&request, None, true).await
    }

    /// Whether the master believes progress is possible.
    ///
    /// Never retried; every failure, including transport trouble, surfaces
    /// as `false`.
    pub async fn expect_progress_possible(&self) -> bool {
        self.process(&messages::ExpectProgressPossible, None, false)
            .await
            .unwrap_or(false)
    }

    /// Master statistics tree.
    pub async fn statistics(&self) -> Result<StatValue> {
        self.process(&messages::Statistics, None, true).await
    }

    /// Invoke a named server-side function.
    pub async fn user_function(
        &self,
        function: impl Into<Vec<u8>>,
        argument: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let request = messages::UserFunction { function: function.into(), argument };
        self.process(&request, None, true).await
    }

    /// Idempotent set: no consensus round when the value already matches.
    pub async fn confirm(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        let request = messages::Confirm { key: key.into(), value: value.into() };
        self.process(&request, None, true).await
    }

    /// Fail with `AssertionFailed` unless `key` holds `value`.
    pub async fn assert_value(
        &self,
        key: impl Into<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> Result<()> {
        let request =
            messages::Assert { consistency: self.consistency(), key: key.into(), value };
        self.process(&request, None, true).await
    }

    /// Fail with `AssertionFailed` unless `key` exists.
    pub async fn assert_exists(&self, key: impl Into<Vec<u8>>) -> Result<()> {
        let request = messages::AssertExists { consistency: self.consistency(), key: key.into() };
        self.process(&request, None, true).await
    }

    /// Number of bindings in the store.
    pub async fn get_key_count(&self) -> Result<u64> {
        self.process(&messages::GetKeyCount, None, true).await
    }

    /// Server version of the master, or of `node_id` when given.
    pub async fn version(&self, node_id: Option<&str>) -> Result<(i32, i32, i32, Vec<u8>)> {
        self.process(&messages::Version, node_id, true).await
    }

    /// Drive a consensus round that changes nothing.
    pub async fn nop(&self) -> Result<()> {
        self.process(&messages::Nop, None, true).await
    }

    /// Troubleshooting state string of one node.
    pub async fn get_current_state(&self, node_id: &str) -> Result<Vec<u8>> {
        self.process(&messages::GetCurrentState, Some(node_id), true).await
    }

    /// The master's current transaction frontier.
    pub async fn get_txid(&self) -> Result<Consistency> {
        self.process(&messages::GetTxId, None, true).await
    }

    /// Write or delete a binding, returning the pre-image.
    pub async fn replace(
        &self,
        key: impl Into<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let request = messages::Replace { key: key.into(), value };
        self.process(&request, None, true).await
    }

    /// Remove every key starting with `prefix`; returns how many were bound.
    pub async fn delete_prefix(&self, prefix: impl Into<Vec<u8>>) -> Result<u32> {
        let request = messages::DeletePrefix { prefix: prefix.into() };
        self.process(&request, None, true).await
    }

    // -- node administration ------------------------------------------------

    /// Defragment one node's database.
    pub async fn optimize_db(&self, node_id: &str) -> Result<()> {
        self.process(&messages::OptimizeDb, Some(node_id), true).await
    }

    /// Rebuild one node's database file.
    pub async fn defrag_db(&self, node_id: &str) -> Result<()> {
        self.process(&messages::DefragDb, Some(node_id), true).await
    }

    /// Make one node abdicate mastership.
    pub async fn drop_master(&self, node_id: &str) -> Result<()> {
        self.process(&messages::DropMaster, Some(node_id), true).await
    }

    /// Collapse `count` tlogs on one node; returns per-tlog durations.
    ///
    /// Collapsing can take a long time, so the read deadline is disabled for
    /// this call.
    pub async fn collapse_tlogs(&self, node_id: &str, count: i32) -> Result<Vec<i64>> {
        let request = messages::CollapseTlogs { count };
        self.process_inner(&request, Some(node_id), true, true).await
    }

    /// Flush one node's store to disk.
    pub async fn flush_store(&self, node_id: &str) -> Result<()> {
        self.process(&messages::FlushStore, Some(node_id), true).await
    }
}
