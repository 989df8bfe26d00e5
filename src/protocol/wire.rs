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

//! Wire codec: little-endian encode helpers and incremental decoders.
//!
//! Every response type is parsed by a pull-based state machine implementing
//! [`Decoder`]. A call to [`Decoder::step`] consumes whatever bytes are
//! available and either finishes with [`Step::Done`] or reports the minimum
//! number of further bytes it needs with [`Step::Need`]. This keeps the codec
//! independent of the transport: blocking sockets, async streams, and
//! in-memory buffers all drive the same machines.
//!
//! A decoder yields `Done` exactly once; stepping it afterwards is a caller
//! bug.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::mem;
use thiserror::Error;

use crate::consistency::Consistency;

/// Required name of the top-level statistics field.
pub const STATS_ROOT_FIELD: &str = "arakoon_stats";

/// Preallocation ceiling for wire-supplied lengths.
///
/// Lengths come from the network and must not size allocations directly.
const MAX_PREALLOC: usize = 64 * 1024;

/// Violations of the wire format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A boolean byte was neither `0x00` nor `0x01`.
    #[error("unexpected bool byte {0:#04x}")]
    BadBool(u8),
    /// Unknown consistency tag.
    #[error("unknown consistency tag {0}")]
    BadConsistencyTag(i8),
    /// Unknown named-field type tag.
    #[error("unknown named field type {0}")]
    BadFieldType(i32),
    /// A named-field name was not valid UTF-8.
    #[error("named field name is not valid utf-8")]
    BadFieldName,
    /// The statistics payload's top-level field had the wrong name.
    #[error("unexpected statistics root field '{0}'")]
    BadStatsRoot(String),
    /// A complete value was expected but the buffer ended early.
    #[error("buffer ended {0} bytes short of a complete value")]
    Truncated(usize),
    /// A complete value left unconsumed bytes behind.
    #[error("{0} trailing bytes after a complete value")]
    TrailingBytes(usize),
}

/// One turn of an incremental decoder.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// At least this many further bytes are required.
    Need(usize),
    /// The value is complete.
    Done(T),
}

/// A resumable parser for one wire value.
pub trait Decoder {
    /// The decoded value.
    type Item;

    /// Consume bytes from the front of `input`, advancing the slice.
    ///
    /// Returns [`Step::Need`] once `input` is exhausted mid-value.
    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Self::Item>, WireError>;
}

/// Run a fresh decoder over a complete buffer.
///
/// Fails with [`WireError::Truncated`] if the buffer ends early and
/// [`WireError::TrailingBytes`] if it does not end exactly at the value
/// boundary.
pub fn decode_all<D: Decoder + Default>(bytes: &[u8]) -> Result<D::Item, WireError> {
    let mut decoder = D::default();
    let mut input = bytes;
    match decoder.step(&mut input)? {
        Step::Need(n) => Err(WireError::Truncated(n)),
        Step::Done(value) if input.is_empty() => Ok(value),
        Step::Done(_) => Err(WireError::TrailingBytes(input.len())),
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Append a little-endian `u32`.
pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a little-endian `u64`.
pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a single signed byte.
pub fn put_i8(buf: &mut Vec<u8>, v: i8) {
    buf.push(v as u8);
}

/// Append a little-endian `i32`.
pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a little-endian `i64`.
pub fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append an IEEE-754 double, little-endian.
pub fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a boolean as one byte.
pub fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

/// Append a length-prefixed byte string.
pub fn put_bytes(buf: &mut Vec<u8>, v: &[u8]) {
    put_u32(buf, v.len() as u32);
    buf.extend_from_slice(v);
}

/// Append an optional length-prefixed byte string.
pub fn put_option_bytes(buf: &mut Vec<u8>, v: Option<&[u8]>) {
    match v {
        None => put_bool(buf, false),
        Some(bytes) => {
            put_bool(buf, true);
            put_bytes(buf, bytes);
        }
    }
}

/// Append a count-prefixed list of byte strings, order preserved.
pub fn put_bytes_list(buf: &mut Vec<u8>, items: &[Vec<u8>]) {
    put_u32(buf, items.len() as u32);
    for item in items {
        put_bytes(buf, item);
    }
}

/// Append a consistency marker.
pub fn put_consistency(buf: &mut Vec<u8>, c: Consistency) {
    match c {
        Consistency::Consistent => put_i8(buf, 0),
        Consistency::Inconsistent => put_i8(buf, 1),
        Consistency::AtLeast(i) => {
            put_i8(buf, 2);
            put_i64(buf, i);
        }
    }
}

/// Placeholder wire type asserting the exact key set of a range.
///
/// Registered in the codec but referenced by no catalogued message; kept
/// encode-only until a message adopts it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeAssertion {
    keys: Vec<Vec<u8>>,
}

impl RangeAssertion {
    /// Assert the range contains exactly `keys`.
    pub fn contains_exactly(keys: Vec<Vec<u8>>) -> Self {
        Self { keys }
    }

    /// Append the assertion's wire form.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_i32(buf, 1);
        put_i32(buf, self.keys.len() as i32);
        for key in &self.keys {
            put_bytes(buf, key);
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed-width decoders
// ---------------------------------------------------------------------------

/// Accumulates exactly `N` bytes across step calls.
#[derive(Debug)]
struct FixedBuf<const N: usize> {
    buf: [u8; N],
    filled: usize,
}

impl<const N: usize> Default for FixedBuf<N> {
    fn default() -> Self {
        Self { buf: [0; N], filled: 0 }
    }
}

impl<const N: usize> FixedBuf<N> {
    fn fill(&mut self, input: &mut &[u8]) -> Option<[u8; N]> {
        let take = (N - self.filled).min(input.len());
        self.buf[self.filled..self.filled + take].copy_from_slice(&input[..take]);
        self.filled += take;
        *input = &input[take..];
        (self.filled == N).then_some(self.buf)
    }

    fn missing(&self) -> usize {
        N - self.filled
    }
}

macro_rules! fixed_decoder {
    ($(#[$meta:meta])* $name:ident, $item:ty, $width:expr, |$bytes:ident| $convert:expr) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name(FixedBuf<$width>);

        impl Decoder for $name {
            type Item = $item;

            fn step(&mut self, input: &mut &[u8]) -> Result<Step<$item>, WireError> {
                Ok(match self.0.fill(input) {
                    Some($bytes) => Step::Done($convert),
                    None => Step::Need(self.0.missing()),
                })
            }
        }
    };
}

fixed_decoder!(
    /// Little-endian `u32` decoder.
    U32Decoder, u32, 4, |b| LittleEndian::read_u32(&b)
);
fixed_decoder!(
    /// Little-endian `u64` decoder.
    U64Decoder, u64, 8, |b| LittleEndian::read_u64(&b)
);
fixed_decoder!(
    /// Single signed byte decoder.
    I8Decoder, i8, 1, |b| b[0] as i8
);
fixed_decoder!(
    /// Little-endian `i32` decoder.
    I32Decoder, i32, 4, |b| LittleEndian::read_i32(&b)
);
fixed_decoder!(
    /// Little-endian `i64` decoder.
    I64Decoder, i64, 8, |b| LittleEndian::read_i64(&b)
);
fixed_decoder!(
    /// Little-endian IEEE-754 double decoder.
    F64Decoder, f64, 8, |b| LittleEndian::read_f64(&b)
);

/// Strict one-byte boolean decoder.
#[derive(Debug, Default)]
pub struct BoolDecoder(FixedBuf<1>);

impl Decoder for BoolDecoder {
    type Item = bool;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<bool>, WireError> {
        match self.0.fill(input) {
            None => Ok(Step::Need(self.0.missing())),
            Some([0x00]) => Ok(Step::Done(false)),
            Some([0x01]) => Ok(Step::Done(true)),
            Some([other]) => Err(WireError::BadBool(other)),
        }
    }
}

/// Decoder for the empty return value.
#[derive(Debug, Default)]
pub struct UnitDecoder;

impl Decoder for UnitDecoder {
    type Item = ();

    fn step(&mut self, _input: &mut &[u8]) -> Result<Step<()>, WireError> {
        Ok(Step::Done(()))
    }
}

// ---------------------------------------------------------------------------
// Variable-length decoders
// ---------------------------------------------------------------------------

/// Length-prefixed byte string decoder.
#[derive(Debug)]
pub struct BytesDecoder {
    state: BytesState,
}

#[derive(Debug)]
enum BytesState {
    Len(U32Decoder),
    Data { buf: Vec<u8>, want: usize },
}

impl Default for BytesDecoder {
    fn default() -> Self {
        Self { state: BytesState::Len(U32Decoder::default()) }
    }
}

impl Decoder for BytesDecoder {
    type Item = Vec<u8>;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Vec<u8>>, WireError> {
        loop {
            match &mut self.state {
                BytesState::Len(len) => match len.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(0) => return Ok(Step::Done(Vec::new())),
                    Step::Done(n) => {
                        let want = n as usize;
                        self.state = BytesState::Data {
                            buf: Vec::with_capacity(want.min(MAX_PREALLOC)),
                            want,
                        };
                    }
                },
                BytesState::Data { buf, want } => {
                    let take = (*want - buf.len()).min(input.len());
                    buf.extend_from_slice(&input[..take]);
                    *input = &input[take..];
                    if buf.len() == *want {
                        return Ok(Step::Done(mem::take(buf)));
                    }
                    return Ok(Step::Need(*want - buf.len()));
                }
            }
        }
    }
}

/// Optional-value decoder: a boolean flag, then the inner value if present.
#[derive(Debug)]
pub struct OptionDecoder<D: Decoder> {
    state: OptionState<D>,
}

#[derive(Debug)]
enum OptionState<D> {
    Flag(BoolDecoder),
    Inner(D),
}

impl<D: Decoder + Default> Default for OptionDecoder<D> {
    fn default() -> Self {
        Self { state: OptionState::Flag(BoolDecoder::default()) }
    }
}

impl<D: Decoder + Default> Decoder for OptionDecoder<D> {
    type Item = Option<D::Item>;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Option<D::Item>>, WireError> {
        loop {
            match &mut self.state {
                OptionState::Flag(flag) => match flag.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(false) => return Ok(Step::Done(None)),
                    Step::Done(true) => self.state = OptionState::Inner(D::default()),
                },
                OptionState::Inner(inner) => {
                    return Ok(match inner.step(input)? {
                        Step::Need(n) => Step::Need(n),
                        Step::Done(value) => Step::Done(Some(value)),
                    })
                }
            }
        }
    }
}

/// Count-prefixed sequence decoder; element order is preserved.
pub struct SeqDecoder<D: Decoder> {
    state: SeqState<D>,
}

/// List decoder: homogeneous elements in logical order.
pub type ListDecoder<D> = SeqDecoder<D>;
/// Array decoder: same framing as a list, positionally aligned with the
/// request it answers.
pub type ArrayDecoder<D> = SeqDecoder<D>;

enum SeqState<D: Decoder> {
    Count(U32Decoder),
    Elems { inner: D, out: Vec<D::Item>, remaining: u32 },
}

impl<D: Decoder + Default> Default for SeqDecoder<D> {
    fn default() -> Self {
        Self { state: SeqState::Count(U32Decoder::default()) }
    }
}

impl<D: Decoder + Default> Decoder for SeqDecoder<D> {
    type Item = Vec<D::Item>;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Vec<D::Item>>, WireError> {
        loop {
            match &mut self.state {
                SeqState::Count(count) => match count.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(0) => return Ok(Step::Done(Vec::new())),
                    Step::Done(n) => {
                        self.state = SeqState::Elems {
                            inner: D::default(),
                            out: Vec::with_capacity((n as usize).min(MAX_PREALLOC)),
                            remaining: n,
                        };
                    }
                },
                SeqState::Elems { inner, out, remaining } => match inner.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(value) => {
                        out.push(value);
                        *remaining -= 1;
                        if *remaining == 0 {
                            return Ok(Step::Done(mem::take(out)));
                        }
                        *inner = D::default();
                    }
                },
            }
        }
    }
}

/// Two-field product decoder.
pub struct PairDecoder<A: Decoder, B: Decoder> {
    state: PairState<A, B>,
}

enum PairState<A: Decoder, B: Decoder> {
    First(A),
    Second(A::Item, B),
}

impl<A: Decoder + Default, B: Decoder + Default> Default for PairDecoder<A, B> {
    fn default() -> Self {
        Self { state: PairState::First(A::default()) }
    }
}

impl<A: Decoder + Default, B: Decoder + Default> Decoder for PairDecoder<A, B> {
    type Item = (A::Item, B::Item);

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Self::Item>, WireError> {
        loop {
            match &mut self.state {
                PairState::First(first) => match first.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(a) => self.state = PairState::Second(a, B::default()),
                },
                PairState::Second(_, second) => match second.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(b) => {
                        let prev = mem::replace(&mut self.state, PairState::First(A::default()));
                        let PairState::Second(a, _) = prev else { unreachable!() };
                        return Ok(Step::Done((a, b)));
                    }
                },
            }
        }
    }
}

/// Consistency marker decoder.
#[derive(Debug)]
pub struct ConsistencyDecoder {
    state: ConsistencyState,
}

#[derive(Debug)]
enum ConsistencyState {
    Tag(I8Decoder),
    AtLeast(I64Decoder),
}

impl Default for ConsistencyDecoder {
    fn default() -> Self {
        Self { state: ConsistencyState::Tag(I8Decoder::default()) }
    }
}

impl Decoder for ConsistencyDecoder {
    type Item = Consistency;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Consistency>, WireError> {
        loop {
            match &mut self.state {
                ConsistencyState::Tag(tag) => match tag.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(0) => return Ok(Step::Done(Consistency::Consistent)),
                    Step::Done(1) => return Ok(Step::Done(Consistency::Inconsistent)),
                    Step::Done(2) => self.state = ConsistencyState::AtLeast(I64Decoder::default()),
                    Step::Done(other) => return Err(WireError::BadConsistencyTag(other)),
                },
                ConsistencyState::AtLeast(i) => {
                    return Ok(match i.step(input)? {
                        Step::Need(n) => Step::Need(n),
                        Step::Done(i) => Step::Done(Consistency::AtLeast(i)),
                    })
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// One value inside the server statistics tree.
#[derive(Clone, Debug, PartialEq)]
pub enum StatValue {
    /// 32-bit integer field.
    I32(i32),
    /// 64-bit integer field.
    I64(i64),
    /// Floating-point field.
    F64(f64),
    /// Raw string field.
    Bytes(Vec<u8>),
    /// Nested fields, collapsed into a name → value mapping.
    Map(BTreeMap<String, StatValue>),
}

const FIELD_TYPE_I32: i32 = 1;
const FIELD_TYPE_I64: i32 = 2;
const FIELD_TYPE_F64: i32 = 3;
const FIELD_TYPE_BYTES: i32 = 4;
const FIELD_TYPE_LIST: i32 = 5;

/// Self-describing named-field decoder.
///
/// Yields `(name, value)`; a list-typed field's children are themselves
/// named fields and collapse into [`StatValue::Map`].
pub struct NamedFieldDecoder {
    state: NamedFieldState,
}

enum NamedFieldState {
    Tag(I32Decoder),
    Name { tag: i32, name: BytesDecoder },
    Value { name: String, value: ValueState },
}

enum ValueState {
    I32(I32Decoder),
    I64(I64Decoder),
    F64(F64Decoder),
    Bytes(BytesDecoder),
    List(Box<ListDecoder<NamedFieldDecoder>>),
}

impl Default for NamedFieldDecoder {
    fn default() -> Self {
        Self { state: NamedFieldState::Tag(I32Decoder::default()) }
    }
}

impl Decoder for NamedFieldDecoder {
    type Item = (String, StatValue);

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Self::Item>, WireError> {
        loop {
            match &mut self.state {
                NamedFieldState::Tag(tag) => match tag.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(tag) => {
                        self.state = NamedFieldState::Name { tag, name: BytesDecoder::default() };
                    }
                },
                NamedFieldState::Name { tag, name } => match name.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(raw) => {
                        let name =
                            String::from_utf8(raw).map_err(|_| WireError::BadFieldName)?;
                        let value = match *tag {
                            FIELD_TYPE_I32 => ValueState::I32(I32Decoder::default()),
                            FIELD_TYPE_I64 => ValueState::I64(I64Decoder::default()),
                            FIELD_TYPE_F64 => ValueState::F64(F64Decoder::default()),
                            FIELD_TYPE_BYTES => ValueState::Bytes(BytesDecoder::default()),
                            FIELD_TYPE_LIST => ValueState::List(Box::default()),
                            other => return Err(WireError::BadFieldType(other)),
                        };
                        self.state = NamedFieldState::Value { name, value };
                    }
                },
                NamedFieldState::Value { value, .. } => {
                    let decoded = match value {
                        ValueState::I32(d) => match d.step(input)? {
                            Step::Need(n) => return Ok(Step::Need(n)),
                            Step::Done(v) => StatValue::I32(v),
                        },
                        ValueState::I64(d) => match d.step(input)? {
                            Step::Need(n) => return Ok(Step::Need(n)),
                            Step::Done(v) => StatValue::I64(v),
                        },
                        ValueState::F64(d) => match d.step(input)? {
                            Step::Need(n) => return Ok(Step::Need(n)),
                            Step::Done(v) => StatValue::F64(v),
                        },
                        ValueState::Bytes(d) => match d.step(input)? {
                            Step::Need(n) => return Ok(Step::Need(n)),
                            Step::Done(v) => StatValue::Bytes(v),
                        },
                        ValueState::List(d) => match d.step(input)? {
                            Step::Need(n) => return Ok(Step::Need(n)),
                            Step::Done(fields) => {
                                StatValue::Map(fields.into_iter().collect())
                            }
                        },
                    };
                    let prev = mem::replace(
                        &mut self.state,
                        NamedFieldState::Tag(I32Decoder::default()),
                    );
                    let NamedFieldState::Value { name, .. } = prev else { unreachable!() };
                    return Ok(Step::Done((name, decoded)));
                }
            }
        }
    }
}

/// Server statistics decoder.
///
/// The payload arrives wrapped as a single wire string; the inner buffer must
/// hold exactly one named field called [`STATS_ROOT_FIELD`], whose value is
/// the result.
#[derive(Default)]
pub struct StatisticsDecoder {
    payload: BytesDecoder,
}

impl Decoder for StatisticsDecoder {
    type Item = StatValue;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<StatValue>, WireError> {
        match self.payload.step(input)? {
            Step::Need(n) => Ok(Step::Need(n)),
            Step::Done(payload) => {
                let (name, value) = decode_all::<NamedFieldDecoder>(&payload)?;
                if name != STATS_ROOT_FIELD {
                    return Err(WireError::BadStatsRoot(name));
                }
                Ok(Step::Done(value))
            }
        }
    }
}
