// Copyright (c) 2026 Keelson
// Licensed under the Apache License, Version 2.0

//! In-process mock cluster speaking the real wire protocol over duplex
//! pipes, with scriptable leadership and fault injection.

#![forbid(unsafe_code)]
#![allow(dead_code)]

use futures::future::BoxFuture;
use keelson::client::config::{ClusterConfig, NodeLocation};
use keelson::client::connection::{Connector, Transport};
use keelson::protocol::wire::{
    put_bool, put_bytes, put_bytes_list, put_consistency, put_f64, put_i32, put_i64, put_u32,
    put_u64, put_option_bytes,
};
use keelson::protocol::{MASK, PROTOCOL_VERSION};
use keelson::Consistency;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Opt-in test logging: `RUST_LOG=keelson=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ERR_NO_MAGIC: u32 = 0x0001;
const ERR_NOT_MASTER: u32 = 0x0004;
const ERR_NOT_FOUND: u32 = 0x0005;
const ERR_WRONG_CLUSTER: u32 = 0x0006;
const ERR_ASSERTION_FAILED: u32 = 0x0007;
const ERR_BAD_INPUT: u32 = 0x0026;

type Store = BTreeMap<Vec<u8>, Vec<u8>>;

/// Shared cluster state, visible to every mock node.
pub struct ClusterState {
    cluster_id: String,
    node_ids: Vec<String>,
    store: Mutex<Store>,
    master: Mutex<String>,
    /// Per-node scripted `who_master` answers.
    who_master_overrides: Mutex<HashMap<String, Option<String>>>,
    /// Per-node count of commands to reject with `NotMaster` first.
    not_master_budget: Mutex<HashMap<String, u32>>,
    /// Switch leadership after this many further master commands.
    master_switch_after: Mutex<Option<(u32, String)>>,
    /// Per-node count of commands to leave unanswered (connection held open).
    stall: Mutex<HashMap<String, u32>>,
    down: Mutex<HashSet<String>>,
    progress_possible: Mutex<bool>,
}

/// Handle used by tests to build clients and script faults.
pub struct MockCluster {
    pub state: Arc<ClusterState>,
}

impl MockCluster {
    /// Cluster of `nodes` members named `node_0`…; `node_0` starts as master.
    pub fn new(cluster_id: &str, nodes: usize) -> Self {
        let node_ids: Vec<String> = (0..nodes).map(|i| format!("node_{i}")).collect();
        let state = ClusterState {
            cluster_id: cluster_id.to_string(),
            master: Mutex::new(node_ids[0].clone()),
            node_ids,
            store: Mutex::new(BTreeMap::new()),
            who_master_overrides: Mutex::new(HashMap::new()),
            not_master_budget: Mutex::new(HashMap::new()),
            master_switch_after: Mutex::new(None),
            stall: Mutex::new(HashMap::new()),
            down: Mutex::new(HashSet::new()),
            progress_possible: Mutex::new(true),
        };
        Self { state: Arc::new(state) }
    }

    /// Matching client configuration (short timeouts suit tests).
    pub fn config(&self) -> ClusterConfig {
        let nodes = self
            .state
            .node_ids
            .iter()
            .map(|id| (id.clone(), NodeLocation::new(format!("{id}.mock"), 4000)))
            .collect();
        let mut config = ClusterConfig::new(self.state.cluster_id.clone(), nodes);
        config.connect_timeout_secs = 5;
        config
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(MockConnector { state: self.state.clone() })
    }

    pub fn master(&self) -> String {
        self.state.master.lock().unwrap().clone()
    }

    pub fn set_master(&self, node_id: &str) {
        *self.state.master.lock().unwrap() = node_id.to_string();
    }

    /// Script a node's `who_master` answer.
    pub fn override_who_master(&self, node_id: &str, claim: Option<&str>) {
        self.state
            .who_master_overrides
            .lock()
            .unwrap()
            .insert(node_id.to_string(), claim.map(str::to_string));
    }

    /// Make a node reject its next `count` commands with `NotMaster`.
    pub fn inject_not_master(&self, node_id: &str, count: u32) {
        self.state
            .not_master_budget
            .lock()
            .unwrap()
            .insert(node_id.to_string(), count);
    }

    /// Hand leadership to `new_master` after `commands` further master
    /// commands have been served.
    pub fn switch_master_after(&self, commands: u32, new_master: &str) {
        *self.state.master_switch_after.lock().unwrap() =
            Some((commands, new_master.to_string()));
    }

    /// Leave a node's next `count` commands unanswered, connection open.
    pub fn stall_next_commands(&self, node_id: &str, count: u32) {
        self.state.stall.lock().unwrap().insert(node_id.to_string(), count);
    }

    pub fn set_down(&self, node_id: &str, down: bool) {
        let mut set = self.state.down.lock().unwrap();
        if down {
            set.insert(node_id.to_string());
        } else {
            set.remove(node_id);
        }
    }

    pub fn set_progress_possible(&self, possible: bool) {
        *self.state.progress_possible.lock().unwrap() = possible;
    }

    /// Peek straight into the replicated store.
    pub fn stored(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.store.lock().unwrap().get(key).cloned()
    }

    pub fn key_count(&self) -> usize {
        self.state.store.lock().unwrap().len()
    }
}

/// Connector yielding duplex pipes served by in-process node tasks.
pub struct MockConnector {
    state: Arc<ClusterState>,
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        location: &'a NodeLocation,
        _timeout: Duration,
    ) -> BoxFuture<'a, io::Result<Box<dyn Transport>>> {
        Box::pin(async move {
            let address = location.addresses.first().cloned().unwrap_or_default();
            let node_id = address.strip_suffix(".mock").unwrap_or(&address).to_string();
            if self.state.down.lock().unwrap().contains(&node_id) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "node down"));
            }
            let (client_end, server_end) = tokio::io::duplex(1 << 16);
            tokio::spawn(serve_node(node_id, self.state.clone(), server_end));
            Ok(Box::new(client_end) as Box<dyn Transport>)
        })
    }
}

async fn serve_node(node_id: String, state: Arc<ClusterState>, stream: DuplexStream) {
    // Sessions end silently on EOF or protocol trouble, like a server
    // dropping the socket.
    let _ = serve_session(&node_id, &state, stream).await;
}

async fn serve_session(
    node_id: &str,
    state: &ClusterState,
    mut stream: DuplexStream,
) -> io::Result<()> {
    let magic = read_u32(&mut stream).await?;
    let version = read_u32(&mut stream).await?;
    let cluster = read_bytes(&mut stream).await?;
    if magic != MASK || version != PROTOCOL_VERSION || cluster != state.cluster_id.as_bytes() {
        // A node that rejects the prologue closes the socket.
        return Ok(());
    }

    loop {
        let tag = match read_u32(&mut stream).await {
            Ok(tag) => tag,
            Err(_) => return Ok(()),
        };
        let reply = handle_command(node_id, state, tag, &mut stream).await?;
        stream.write_all(&reply).await?;
    }
}

// -- request side ----------------------------------------------------------

async fn read_u32(s: &mut DuplexStream) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    s.read_exact(&mut buf).await?;
    Ok(u32::from_le_bytes(buf))
}

async fn read_i32(s: &mut DuplexStream) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    s.read_exact(&mut buf).await?;
    Ok(i32::from_le_bytes(buf))
}

async fn read_i64(s: &mut DuplexStream) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    s.read_exact(&mut buf).await?;
    Ok(i64::from_le_bytes(buf))
}

async fn read_bool(s: &mut DuplexStream) -> io::Result<bool> {
    let mut buf = [0u8; 1];
    s.read_exact(&mut buf).await?;
    Ok(buf[0] != 0)
}

async fn read_bytes(s: &mut DuplexStream) -> io::Result<Vec<u8>> {
    let len = read_u32(s).await? as usize;
    let mut buf = vec![0u8; len];
    s.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn read_option_bytes(s: &mut DuplexStream) -> io::Result<Option<Vec<u8>>> {
    Ok(if read_bool(s).await? { Some(read_bytes(s).await?) } else { None })
}

async fn read_bytes_list(s: &mut DuplexStream) -> io::Result<Vec<Vec<u8>>> {
    let count = read_u32(s).await?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_bytes(s).await?);
    }
    Ok(items)
}

async fn read_consistency(s: &mut DuplexStream) -> io::Result<Consistency> {
    let mut tag = [0u8; 1];
    s.read_exact(&mut tag).await?;
    Ok(match tag[0] as i8 {
        0 => Consistency::Consistent,
        1 => Consistency::Inconsistent,
        _ => Consistency::AtLeast(read_i64(s).await?),
    })
}

// -- response side ---------------------------------------------------------

fn ok_reply(payload: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u32(&mut buf, 0);
    payload(&mut buf);
    buf
}

fn ok_unit() -> Vec<u8> {
    ok_reply(|_| {})
}

fn err_reply(code: u32, message: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u32(&mut buf, code);
    put_bytes(&mut buf, message.as_bytes());
    buf
}

fn stats_reply(node_id: &str) -> Vec<u8> {
    let mut fields: Vec<Vec<u8>> = Vec::new();
    let mut n_ops = Vec::new();
    put_i32(&mut n_ops, 2);
    put_bytes(&mut n_ops, b"n_ops");
    put_i64(&mut n_ops, 1234);
    fields.push(n_ops);
    let mut avg = Vec::new();
    put_i32(&mut avg, 3);
    put_bytes(&mut avg, b"avg_set_size");
    put_f64(&mut avg, 17.25);
    fields.push(avg);
    let mut name = Vec::new();
    put_i32(&mut name, 4);
    put_bytes(&mut name, b"node_id");
    put_bytes(&mut name, node_id.as_bytes());
    fields.push(name);

    let mut root = Vec::new();
    put_i32(&mut root, 5);
    put_bytes(&mut root, b"arakoon_stats");
    put_u32(&mut root, fields.len() as u32);
    for field in &fields {
        root.extend_from_slice(field);
    }

    ok_reply(|buf| put_bytes(buf, &root))
}

// -- command handling ------------------------------------------------------

/// `NotMaster` gate for store commands; returns the error reply when the
/// node must refuse.
fn gate_master(node_id: &str, state: &ClusterState, dirty_ok: bool) -> Option<Vec<u8>> {
    {
        let mut budgets = state.not_master_budget.lock().unwrap();
        if let Some(remaining) = budgets.get_mut(node_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Some(err_reply(ERR_NOT_MASTER, "injected"));
            }
        }
    }
    let master = state.master.lock().unwrap();
    if *master != node_id && !dirty_ok {
        return Some(err_reply(ERR_NOT_MASTER, "i am not the master"));
    }
    None
}

/// Account one served master command, switching leadership when scripted.
fn note_master_command(state: &ClusterState) {
    let mut switch = state.master_switch_after.lock().unwrap();
    if let Some((remaining, next)) = switch.as_mut() {
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            *state.master.lock().unwrap() = next.clone();
            *switch = None;
        }
    }
}

fn range_bound(key: Option<Vec<u8>>, inclusive: bool) -> Bound<Vec<u8>> {
    match key {
        None => Bound::Unbounded,
        Some(k) if inclusive => Bound::Included(k),
        Some(k) => Bound::Excluded(k),
    }
}

fn capped<I: Iterator>(iter: I, max: i32) -> impl Iterator<Item = I::Item> {
    let cap = if max < 0 { usize::MAX } else { max as usize };
    iter.take(cap)
}

async fn handle_command(
    node_id: &str,
    state: &ClusterState,
    tag: u32,
    s: &mut DuplexStream,
) -> io::Result<Vec<u8>> {
    if tag & 0xffff_0000 != MASK {
        return Ok(err_reply(ERR_NO_MAGIC, "no magic"));
    }

    // Simulated unresponsiveness: hold the connection open without
    // answering. Discovery stays live so only the command itself times out.
    if tag & 0xffff != 0x0002 {
        let stalled = {
            let mut stalls = state.stall.lock().unwrap();
            match stalls.get_mut(node_id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    Ok(match tag & 0xffff {
        // hello
        0x0001 => {
            let _client_id = read_bytes(s).await?;
            let cluster_id = read_bytes(s).await?;
            if cluster_id == state.cluster_id.as_bytes() {
                let greeting = format!("{node_id}/1.2.3");
                ok_reply(|buf| put_bytes(buf, greeting.as_bytes()))
            } else {
                err_reply(ERR_WRONG_CLUSTER, "cluster id mismatch")
            }
        }
        // who_master
        0x0002 => {
            let overrides = state.who_master_overrides.lock().unwrap();
            let claim = match overrides.get(node_id) {
                Some(scripted) => scripted.clone(),
                None => Some(state.master.lock().unwrap().clone()),
            };
            ok_reply(|buf| put_option_bytes(buf, claim.as_deref().map(str::as_bytes)))
        }
        // exists
        0x0007 => {
            let consistency = read_consistency(s).await?;
            let key = read_bytes(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let found = state.store.lock().unwrap().contains_key(&key);
                    note_master_command(state);
                    ok_reply(|buf| put_bool(buf, found))
                }
            }
        }
        // get
        0x0008 => {
            let consistency = read_consistency(s).await?;
            let key = read_bytes(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let value = state.store.lock().unwrap().get(&key).cloned();
                    note_master_command(state);
                    match value {
                        Some(value) => ok_reply(|buf| put_bytes(buf, &value)),
                        None => err_reply(ERR_NOT_FOUND, "key not found"),
                    }
                }
            }
        }
        // set
        0x0009 => {
            let key = read_bytes(s).await?;
            let value = read_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    state.store.lock().unwrap().insert(key, value);
                    note_master_command(state);
                    ok_unit()
                }
            }
        }
        // delete
        0x000a => {
            let key = read_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let removed = state.store.lock().unwrap().remove(&key);
                    note_master_command(state);
                    match removed {
                        Some(_) => ok_unit(),
                        None => err_reply(ERR_NOT_FOUND, "key not found"),
                    }
                }
            }
        }
        // range
        0x000b => {
            let consistency = read_consistency(s).await?;
            let begin = read_option_bytes(s).await?;
            let begin_inclusive = read_bool(s).await?;
            let end = read_option_bytes(s).await?;
            let end_inclusive = read_bool(s).await?;
            let max = read_i32(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let keys: Vec<Vec<u8>> = capped(
                        store
                            .range((
                                range_bound(begin, begin_inclusive),
                                range_bound(end, end_inclusive),
                            ))
                            .map(|(k, _)| k.clone()),
                        max,
                    )
                    .collect();
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_bytes_list(buf, &keys))
                }
            }
        }
        // prefix_keys
        0x000c => {
            let consistency = read_consistency(s).await?;
            let prefix = read_bytes(s).await?;
            let max = read_i32(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let keys: Vec<Vec<u8>> = capped(
                        store
                            .range((Bound::Included(prefix.clone()), Bound::Unbounded))
                            .take_while(|(k, _)| k.starts_with(&prefix))
                            .map(|(k, _)| k.clone()),
                        max,
                    )
                    .collect();
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_bytes_list(buf, &keys))
                }
            }
        }
        // test_and_set
        0x000d => {
            let key = read_bytes(s).await?;
            let test_value = read_option_bytes(s).await?;
            let set_value = read_option_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let mut store = state.store.lock().unwrap();
                    let pre = store.get(&key).cloned();
                    if pre == test_value {
                        match set_value {
                            Some(value) => {
                                store.insert(key, value);
                            }
                            None => {
                                store.remove(&key);
                            }
                        }
                    }
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_option_bytes(buf, pre.as_deref()))
                }
            }
        }
        // range_entries
        0x000f => {
            let consistency = read_consistency(s).await?;
            let begin = read_option_bytes(s).await?;
            let begin_inclusive = read_bool(s).await?;
            let end = read_option_bytes(s).await?;
            let end_inclusive = read_bool(s).await?;
            let max = read_i32(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let pairs: Vec<(Vec<u8>, Vec<u8>)> = capped(
                        store
                            .range((
                                range_bound(begin, begin_inclusive),
                                range_bound(end, end_inclusive),
                            ))
                            .map(|(k, v)| (k.clone(), v.clone())),
                        max,
                    )
                    .collect();
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| {
                        put_u32(buf, pairs.len() as u32);
                        for (k, v) in &pairs {
                            put_bytes(buf, k);
                            put_bytes(buf, v);
                        }
                    })
                }
            }
        }
        // sequence / synced_sequence
        0x0010 | 0x0024 => {
            let payload = read_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let mut store = state.store.lock().unwrap();
                    // All-or-nothing: apply to a scratch copy, commit on success.
                    let mut scratch = store.clone();
                    let mut input: &[u8] = &payload;
                    match apply_step(&mut input, &mut scratch) {
                        Ok(()) if input.is_empty() => {
                            *store = scratch;
                            drop(store);
                            note_master_command(state);
                            ok_unit()
                        }
                        Ok(()) => err_reply(ERR_BAD_INPUT, "trailing sequence bytes"),
                        Err(reply) => reply,
                    }
                }
            }
        }
        // multi_get
        0x0011 => {
            let consistency = read_consistency(s).await?;
            let keys = read_bytes_list(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let mut values = Vec::with_capacity(keys.len());
                    for key in &keys {
                        match store.get(key) {
                            Some(value) => values.push(value.clone()),
                            None => return Ok(err_reply(ERR_NOT_FOUND, "key not found")),
                        }
                    }
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_bytes_list(buf, &values))
                }
            }
        }
        // expect_progress_possible
        0x0012 => {
            let possible = *state.progress_possible.lock().unwrap();
            ok_reply(|buf| put_bool(buf, possible))
        }
        // statistics
        0x0013 => stats_reply(node_id),
        // collapse_tlogs
        0x0014 => {
            let count = read_i32(s).await?;
            ok_reply(|buf| {
                let n = count.max(0) as u32;
                put_u32(buf, n);
                for i in 0..n {
                    put_i64(buf, i64::from(i) + 100);
                }
            })
        }
        // user_function
        0x0015 => {
            let _function = read_bytes(s).await?;
            let argument = read_option_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    note_master_command(state);
                    ok_reply(|buf| put_option_bytes(buf, argument.as_deref()))
                }
            }
        }
        // assert
        0x0016 => {
            let consistency = read_consistency(s).await?;
            let key = read_bytes(s).await?;
            let value = read_option_bytes(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let actual = state.store.lock().unwrap().get(&key).cloned();
                    note_master_command(state);
                    if actual == value {
                        ok_unit()
                    } else {
                        err_reply(ERR_ASSERTION_FAILED, "assert did not hold")
                    }
                }
            }
        }
        // get_key_count
        0x001a => {
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let count = state.store.lock().unwrap().len() as u64;
                    note_master_command(state);
                    ok_reply(|buf| put_u64(buf, count))
                }
            }
        }
        // confirm
        0x001c => {
            let key = read_bytes(s).await?;
            let value = read_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let mut store = state.store.lock().unwrap();
                    if store.get(&key) != Some(&value) {
                        store.insert(key, value);
                    }
                    drop(store);
                    note_master_command(state);
                    ok_unit()
                }
            }
        }
        // rev_range_entries: begin is the upper bound, results descend
        0x0023 => {
            let consistency = read_consistency(s).await?;
            let begin = read_option_bytes(s).await?;
            let begin_inclusive = read_bool(s).await?;
            let end = read_option_bytes(s).await?;
            let end_inclusive = read_bool(s).await?;
            let max = read_i32(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let pairs: Vec<(Vec<u8>, Vec<u8>)> = capped(
                        store
                            .range((
                                range_bound(end, end_inclusive),
                                range_bound(begin, begin_inclusive),
                            ))
                            .rev()
                            .map(|(k, v)| (k.clone(), v.clone())),
                        max,
                    )
                    .collect();
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| {
                        put_u32(buf, pairs.len() as u32);
                        for (k, v) in &pairs {
                            put_bytes(buf, k);
                            put_bytes(buf, v);
                        }
                    })
                }
            }
        }
        // optimize_db
        0x0025 => ok_unit(),
        // defrag_db
        0x0026 => ok_unit(),
        // delete_prefix
        0x0027 => {
            let prefix = read_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let mut store = state.store.lock().unwrap();
                    let doomed: Vec<Vec<u8>> = store
                        .range((Bound::Included(prefix.clone()), Bound::Unbounded))
                        .take_while(|(k, _)| k.starts_with(&prefix))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in &doomed {
                        store.remove(key);
                    }
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_u32(buf, doomed.len() as u32))
                }
            }
        }
        // version
        0x0028 => ok_reply(|buf| {
            put_i32(buf, 1);
            put_i32(buf, 2);
            put_i32(buf, 3);
            put_bytes(buf, b"mock cluster");
        }),
        // assert_exists
        0x0029 => {
            let consistency = read_consistency(s).await?;
            let key = read_bytes(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let found = state.store.lock().unwrap().contains_key(&key);
                    note_master_command(state);
                    if found {
                        ok_unit()
                    } else {
                        err_reply(ERR_ASSERTION_FAILED, "key does not exist")
                    }
                }
            }
        }
        // drop_master
        0x0030 => ok_unit(),
        // multi_get_option
        0x0031 => {
            let consistency = read_consistency(s).await?;
            let keys = read_bytes_list(s).await?;
            let dirty = consistency == Consistency::Inconsistent;
            match gate_master(node_id, state, dirty) {
                Some(err) => err,
                None => {
                    let store = state.store.lock().unwrap();
                    let values: Vec<Option<Vec<u8>>> =
                        keys.iter().map(|key| store.get(key).cloned()).collect();
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| {
                        put_u32(buf, values.len() as u32);
                        for value in &values {
                            put_option_bytes(buf, value.as_deref());
                        }
                    })
                }
            }
        }
        // get_current_state
        0x0032 => {
            let role = if *state.master.lock().unwrap() == node_id { "master" } else { "slave" };
            ok_reply(|buf| put_bytes(buf, role.as_bytes()))
        }
        // replace
        0x0033 => {
            let key = read_bytes(s).await?;
            let value = read_option_bytes(s).await?;
            match gate_master(node_id, state, false) {
                Some(err) => err,
                None => {
                    let mut store = state.store.lock().unwrap();
                    let pre = match value {
                        Some(value) => store.insert(key, value),
                        None => store.remove(&key),
                    };
                    drop(store);
                    note_master_command(state);
                    ok_reply(|buf| put_option_bytes(buf, pre.as_deref()))
                }
            }
        }
        // nop
        0x0041 => match gate_master(node_id, state, false) {
            Some(err) => err,
            None => {
                note_master_command(state);
                ok_unit()
            }
        },
        // flush_store
        0x0042 => ok_unit(),
        // get_txid
        0x0043 => ok_reply(|buf| put_consistency(buf, Consistency::AtLeast(42))),
        _ => err_reply(ERR_BAD_INPUT, "unknown command"),
    })
}

// -- sequence payload ------------------------------------------------------

fn take_u32(input: &mut &[u8]) -> Result<u32, Vec<u8>> {
    if input.len() < 4 {
        return Err(err_reply(ERR_BAD_INPUT, "truncated sequence"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&input[..4]);
    *input = &input[4..];
    Ok(u32::from_le_bytes(buf))
}

fn take_bytes(input: &mut &[u8]) -> Result<Vec<u8>, Vec<u8>> {
    let len = take_u32(input)? as usize;
    if input.len() < len {
        return Err(err_reply(ERR_BAD_INPUT, "truncated sequence"));
    }
    let bytes = input[..len].to_vec();
    *input = &input[len..];
    Ok(bytes)
}

fn take_option_bytes(input: &mut &[u8]) -> Result<Option<Vec<u8>>, Vec<u8>> {
    if input.is_empty() {
        return Err(err_reply(ERR_BAD_INPUT, "truncated sequence"));
    }
    let present = input[0] != 0;
    *input = &input[1..];
    Ok(if present { Some(take_bytes(input)?) } else { None })
}

/// Apply one step (recursively for nested sequences) to the scratch store.
fn apply_step(input: &mut &[u8], store: &mut Store) -> Result<(), Vec<u8>> {
    match take_u32(input)? {
        1 => {
            let key = take_bytes(input)?;
            let value = take_bytes(input)?;
            store.insert(key, value);
            Ok(())
        }
        2 => {
            let key = take_bytes(input)?;
            match store.remove(&key) {
                Some(_) => Ok(()),
                None => Err(err_reply(ERR_NOT_FOUND, "key not found")),
            }
        }
        5 => {
            let count = take_u32(input)?;
            for _ in 0..count {
                apply_step(input, store)?;
            }
            Ok(())
        }
        8 => {
            let key = take_bytes(input)?;
            let value = take_option_bytes(input)?;
            if store.get(&key).cloned() == value {
                Ok(())
            } else {
                Err(err_reply(ERR_ASSERTION_FAILED, "assert did not hold"))
            }
        }
        14 => {
            let prefix = take_bytes(input)?;
            let doomed: Vec<Vec<u8>> = store
                .range((Bound::Included(prefix.clone()), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                store.remove(&key);
            }
            Ok(())
        }
        15 => {
            let key = take_bytes(input)?;
            if store.contains_key(&key) {
                Ok(())
            } else {
                Err(err_reply(ERR_ASSERTION_FAILED, "key does not exist"))
            }
        }
        16 => {
            let key = take_bytes(input)?;
            let value = take_option_bytes(input)?;
            match value {
                Some(value) => store.insert(key, value),
                None => store.remove(&key),
            };
            Ok(())
        }
        _ => Err(err_reply(ERR_BAD_INPUT, "unknown step tag")),
    }
}
