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

//! The complete request catalogue.
//!
//! One struct per command. Arguments are laid out in wire order by
//! `encode_args`; where a command takes a consistency marker it goes on the
//! wire first. Admin commands at the bottom are node-scoped: the orchestrator
//! routes them to an explicit node, never to the master.

use crate::consistency::Consistency;
use crate::errors::Error;
use crate::protocol::wire::{
    put_bool, put_bytes, put_bytes_list, put_consistency, put_i32, put_option_bytes,
    ArrayDecoder, BoolDecoder, BytesDecoder, ConsistencyDecoder, Decoder, I32Decoder,
    I64Decoder, ListDecoder, OptionDecoder, PairDecoder, StatisticsDecoder, Step,
    U32Decoder, U64Decoder, UnitDecoder, WireError,
};
use crate::protocol::{Request, MASK};
use crate::sequence;

/// Handshake: identify the client, verify the cluster id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    /// Free-form client identifier.
    pub client_id: Vec<u8>,
    /// Must match the server-side cluster id.
    pub cluster_id: Vec<u8>,
}

impl Request for Hello {
    type Payload = BytesDecoder;

    fn tag(&self) -> u32 {
        0x0001 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.client_id);
        put_bytes(buf, &self.cluster_id);
    }
}

/// Ask a node which node it believes is master.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WhoMaster;

impl Request for WhoMaster {
    type Payload = OptionDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x0002 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Whether a key is bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exists {
    /// Read freshness.
    pub consistency: Consistency,
    /// Key to test.
    pub key: Vec<u8>,
}

impl Request for Exists {
    type Payload = BoolDecoder;

    fn tag(&self) -> u32 {
        0x0007 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes(buf, &self.key);
    }
}

/// Read one value; fails `NotFound` when the key is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Get {
    /// Read freshness.
    pub consistency: Consistency,
    /// Key to read.
    pub key: Vec<u8>,
}

impl Request for Get {
    type Payload = BytesDecoder;

    fn tag(&self) -> u32 {
        0x0008 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes(buf, &self.key);
    }
}

/// Bind a key to a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Set {
    /// Key to set.
    pub key: Vec<u8>,
    /// Value to set.
    pub value: Vec<u8>,
}

impl Request for Set {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0009 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.key);
        put_bytes(buf, &self.value);
    }
}

/// Remove a key; fails `NotFound` when absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delete {
    /// Key to delete.
    pub key: Vec<u8>,
}

impl Request for Delete {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x000a | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.key);
    }
}

/// Keys in a half-open or closed range, ascending.
///
/// `None` bounds are unbounded; a negative `max_elements` returns every
/// match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    /// Read freshness.
    pub consistency: Consistency,
    /// Lower bound, or unbounded.
    pub begin_key: Option<Vec<u8>>,
    /// Whether the lower bound itself is included.
    pub begin_inclusive: bool,
    /// Upper bound, or unbounded.
    pub end_key: Option<Vec<u8>>,
    /// Whether the upper bound itself is included.
    pub end_inclusive: bool,
    /// Cap on the number of returned keys; negative means unbounded.
    pub max_elements: i32,
}

impl Request for Range {
    type Payload = ListDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x000b | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_option_bytes(buf, self.begin_key.as_deref());
        put_bool(buf, self.begin_inclusive);
        put_option_bytes(buf, self.end_key.as_deref());
        put_bool(buf, self.end_inclusive);
        put_i32(buf, self.max_elements);
    }
}

/// Keys matching a prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixKeys {
    /// Read freshness.
    pub consistency: Consistency,
    /// Prefix to match.
    pub prefix: Vec<u8>,
    /// Cap on the number of returned keys; negative means unbounded.
    pub max_elements: i32,
}

impl Request for PrefixKeys {
    type Payload = ListDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x000c | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes(buf, &self.prefix);
        put_i32(buf, self.max_elements);
    }
}

/// Compare-and-swap; returns the pre-image.
///
/// With `test_value == None` the key must be absent; with
/// `set_value == None` the key is deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestAndSet {
    /// Key to act on.
    pub key: Vec<u8>,
    /// Expected current value.
    pub test_value: Option<Vec<u8>>,
    /// New value to bind.
    pub set_value: Option<Vec<u8>>,
}

impl Request for TestAndSet {
    type Payload = OptionDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x000d | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.key);
        put_option_bytes(buf, self.test_value.as_deref());
        put_option_bytes(buf, self.set_value.as_deref());
    }
}

/// Key/value pairs in a range, ascending by key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeEntries {
    /// Read freshness.
    pub consistency: Consistency,
    /// Lower bound, or unbounded.
    pub begin_key: Option<Vec<u8>>,
    /// Whether the lower bound itself is included.
    pub begin_inclusive: bool,
    /// Upper bound, or unbounded.
    pub end_key: Option<Vec<u8>>,
    /// Whether the upper bound itself is included.
    pub end_inclusive: bool,
    /// Cap on the number of returned pairs; negative means unbounded.
    pub max_elements: i32,
}

impl Request for RangeEntries {
    type Payload = ListDecoder<PairDecoder<BytesDecoder, BytesDecoder>>;

    fn tag(&self) -> u32 {
        0x000f | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_option_bytes(buf, self.begin_key.as_deref());
        put_bool(buf, self.begin_inclusive);
        put_option_bytes(buf, self.end_key.as_deref());
        put_bool(buf, self.end_inclusive);
        put_i32(buf, self.max_elements);
    }
}

/// Execute a transactional sequence.
///
/// The step tree is serialised into a buffer which travels as a single wire
/// string. `sync` selects the `synced_sequence` tag, which additionally
/// fsyncs before acknowledging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    /// The step tree to execute.
    pub sequence: sequence::Sequence,
    /// Require durability before the acknowledgement.
    pub sync: bool,
}

impl Request for Sequence {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        if self.sync { 0x0024 | MASK } else { 0x0010 | MASK }
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.sequence.encode());
    }
}

/// Values for several keys; fails `NotFound` if any key is missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiGet {
    /// Read freshness.
    pub consistency: Consistency,
    /// Keys to look up.
    pub keys: Vec<Vec<u8>>,
}

impl Request for MultiGet {
    type Payload = ListDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x0011 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes_list(buf, &self.keys);
    }
}

/// Values for several keys, positionally; missing keys come back absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiGetOption {
    /// Read freshness.
    pub consistency: Consistency,
    /// Keys to look up.
    pub keys: Vec<Vec<u8>>,
}

impl Request for MultiGetOption {
    type Payload = ArrayDecoder<OptionDecoder<BytesDecoder>>;

    fn tag(&self) -> u32 {
        0x0031 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes_list(buf, &self.keys);
    }
}

/// Whether the contacted node believes progress is possible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpectProgressPossible;

impl Request for ExpectProgressPossible {
    type Payload = BoolDecoder;

    fn tag(&self) -> u32 {
        0x0012 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Server statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics;

impl Request for Statistics {
    type Payload = StatisticsDecoder;

    fn tag(&self) -> u32 {
        0x0013 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Invoke a named server-side function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserFunction {
    /// Function name.
    pub function: Vec<u8>,
    /// Optional argument.
    pub argument: Option<Vec<u8>>,
}

impl Request for UserFunction {
    type Payload = OptionDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x0015 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.function);
        put_option_bytes(buf, self.argument.as_deref());
    }
}

/// Fail with `AssertionFailed` unless the key holds the expected value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assert {
    /// Read freshness.
    pub consistency: Consistency,
    /// Key to check.
    pub key: Vec<u8>,
    /// Expected value, or `None` for "must be absent".
    pub value: Option<Vec<u8>>,
}

impl Request for Assert {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0016 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes(buf, &self.key);
        put_option_bytes(buf, self.value.as_deref());
    }
}

/// Total number of bindings in the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetKeyCount;

impl Request for GetKeyCount {
    type Payload = U64Decoder;

    fn tag(&self) -> u32 {
        0x001a | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Idempotent set: a no-op when the key already holds the value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirm {
    /// Key to set.
    pub key: Vec<u8>,
    /// Value to set.
    pub value: Vec<u8>,
}

impl Request for Confirm {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x001c | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.key);
        put_bytes(buf, &self.value);
    }
}

/// Key/value pairs walked in descending key order.
///
/// `begin_key` is the *upper* bound here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevRangeEntries {
    /// Read freshness.
    pub consistency: Consistency,
    /// Upper bound, or unbounded.
    pub begin_key: Option<Vec<u8>>,
    /// Whether the upper bound itself is included.
    pub begin_inclusive: bool,
    /// Lower bound, or unbounded.
    pub end_key: Option<Vec<u8>>,
    /// Whether the lower bound itself is included.
    pub end_inclusive: bool,
    /// Cap on the number of returned pairs; negative means unbounded.
    pub max_elements: i32,
}

impl Request for RevRangeEntries {
    type Payload = ListDecoder<PairDecoder<BytesDecoder, BytesDecoder>>;

    fn tag(&self) -> u32 {
        0x0023 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_option_bytes(buf, self.begin_key.as_deref());
        put_bool(buf, self.begin_inclusive);
        put_option_bytes(buf, self.end_key.as_deref());
        put_bool(buf, self.end_inclusive);
        put_i32(buf, self.max_elements);
    }
}

/// Remove every key with the given prefix; returns how many went away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletePrefix {
    /// Prefix of the keys to delete.
    pub prefix: Vec<u8>,
}

impl Request for DeletePrefix {
    type Payload = U32Decoder;

    fn tag(&self) -> u32 {
        0x0027 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.prefix);
    }
}

/// Server version: major, minor, patch, build info.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Version;

/// Decoder for the version quadruple.
#[derive(Default)]
pub struct VersionDecoder {
    inner: PairDecoder<I32Decoder, PairDecoder<I32Decoder, PairDecoder<I32Decoder, BytesDecoder>>>,
}

impl Decoder for VersionDecoder {
    type Item = (i32, i32, i32, Vec<u8>);

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Self::Item>, WireError> {
        Ok(match self.inner.step(input)? {
            Step::Need(n) => Step::Need(n),
            Step::Done((major, (minor, (patch, info)))) => Step::Done((major, minor, patch, info)),
        })
    }
}

impl Request for Version {
    type Payload = VersionDecoder;

    fn tag(&self) -> u32 {
        0x0028 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Fail with `AssertionFailed` unless the key exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertExists {
    /// Read freshness.
    pub consistency: Consistency,
    /// Key to check.
    pub key: Vec<u8>,
}

impl Request for AssertExists {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0029 | MASK
    }

    fn check(&self) -> Result<(), Error> {
        self.consistency.check()
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_consistency(buf, self.consistency);
        put_bytes(buf, &self.key);
    }
}

/// Human-readable node state, for troubleshooting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetCurrentState;

impl Request for GetCurrentState {
    type Payload = BytesDecoder;

    fn tag(&self) -> u32 {
        0x0032 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Write or delete a binding, returning the pre-image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replace {
    /// Key to replace.
    pub key: Vec<u8>,
    /// New value, or `None` to delete.
    pub value: Option<Vec<u8>>,
}

impl Request for Replace {
    type Payload = OptionDecoder<BytesDecoder>;

    fn tag(&self) -> u32 {
        0x0033 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, &self.key);
        put_option_bytes(buf, self.value.as_deref());
    }
}

/// A consensus round that changes nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Nop;

impl Request for Nop {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0041 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// The node's current transaction frontier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetTxId;

impl Request for GetTxId {
    type Payload = ConsistencyDecoder;

    fn tag(&self) -> u32 {
        0x0043 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

// ---------------------------------------------------------------------------
// Admin commands (node-scoped)
// ---------------------------------------------------------------------------

/// Collapse `count` transaction logs into the head database.
///
/// Long-running; the orchestrator disables its read deadline for this call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollapseTlogs {
    /// Number of tlogs to collapse.
    pub count: i32,
}

impl Request for CollapseTlogs {
    type Payload = ListDecoder<I64Decoder>;

    fn tag(&self) -> u32 {
        0x0014 | MASK
    }

    fn encode_args(&self, buf: &mut Vec<u8>) {
        put_i32(buf, self.count);
    }
}

/// Defragment the node's database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeDb;

impl Request for OptimizeDb {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0025 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Rebuild the node's database file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefragDb;

impl Request for DefragDb {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0026 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Make the targeted node abdicate mastership.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DropMaster;

impl Request for DropMaster {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0030 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

/// Flush the node's store to disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStore;

impl Request for FlushStore {
    type Payload = UnitDecoder;

    fn tag(&self) -> u32 {
        0x0042 | MASK
    }

    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}
