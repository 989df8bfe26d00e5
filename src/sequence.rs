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

//! Transactional sequences: trees of steps executed all-or-nothing on the
//! master.
//!
//! A sequence serialises as a tag-prefixed tree; the whole tree is wrapped as
//! one wire string inside the `sequence` / `synced_sequence` message
//! envelope.

use crate::protocol::wire::{put_bytes, put_option_bytes, put_u32};

const TAG_SET: u32 = 1;
const TAG_DELETE: u32 = 2;
const TAG_SEQUENCE: u32 = 5;
const TAG_ASSERT: u32 = 8;
const TAG_DELETE_PREFIX: u32 = 14;
const TAG_ASSERT_EXISTS: u32 = 15;
const TAG_REPLACE: u32 = 16;

/// One step of a transactional sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Bind `key` to `value`.
    Set {
        /// Key to set.
        key: Vec<u8>,
        /// Value to set.
        value: Vec<u8>,
    },
    /// Remove `key`; the transaction fails if it is absent.
    Delete {
        /// Key to delete.
        key: Vec<u8>,
    },
    /// Fail the transaction unless `key` is bound to exactly `value`
    /// (`None` meaning absent).
    Assert {
        /// Key to check.
        key: Vec<u8>,
        /// Expected value, or `None` for "must be absent".
        value: Option<Vec<u8>>,
    },
    /// Fail the transaction unless `key` exists.
    AssertExists {
        /// Key to check.
        key: Vec<u8>,
    },
    /// Bind `key` to `value`, or delete it when `value` is `None`.
    Replace {
        /// Key to replace.
        key: Vec<u8>,
        /// New value, or `None` to delete.
        value: Option<Vec<u8>>,
    },
    /// Remove every key starting with `prefix`.
    DeletePrefix {
        /// Prefix of the keys to delete.
        prefix: Vec<u8>,
    },
    /// A nested sequence, atomic with its parent.
    Sequence(Vec<Step>),
}

impl Step {
    /// Append this step's wire form, recursing into nested sequences.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Step::Set { key, value } => {
                put_u32(buf, TAG_SET);
                put_bytes(buf, key);
                put_bytes(buf, value);
            }
            Step::Delete { key } => {
                put_u32(buf, TAG_DELETE);
                put_bytes(buf, key);
            }
            Step::Assert { key, value } => {
                put_u32(buf, TAG_ASSERT);
                put_bytes(buf, key);
                put_option_bytes(buf, value.as_deref());
            }
            Step::AssertExists { key } => {
                put_u32(buf, TAG_ASSERT_EXISTS);
                put_bytes(buf, key);
            }
            Step::Replace { key, value } => {
                put_u32(buf, TAG_REPLACE);
                put_bytes(buf, key);
                put_option_bytes(buf, value.as_deref());
            }
            Step::DeletePrefix { prefix } => {
                put_u32(buf, TAG_DELETE_PREFIX);
                put_bytes(buf, prefix);
            }
            Step::Sequence(steps) => {
                put_u32(buf, TAG_SEQUENCE);
                put_u32(buf, steps.len() as u32);
                for step in steps {
                    step.encode(buf);
                }
            }
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        fn bytes_len(b: &[u8]) -> usize {
            4 + b.len()
        }
        fn option_len(o: Option<&[u8]>) -> usize {
            1 + o.map_or(0, bytes_len)
        }
        match self {
            Step::Set { key, value } => 4 + bytes_len(key) + bytes_len(value),
            Step::Delete { key } => 4 + bytes_len(key),
            Step::Assert { key, value } => 4 + bytes_len(key) + option_len(value.as_deref()),
            Step::AssertExists { key } => 4 + bytes_len(key),
            Step::Replace { key, value } => 4 + bytes_len(key) + option_len(value.as_deref()),
            Step::DeletePrefix { prefix } => 4 + bytes_len(prefix),
            Step::Sequence(steps) => {
                8 + steps.iter().map(Step::encoded_len).sum::<usize>()
            }
        }
    }
}

/// Builder for a transactional sequence.
///
/// Steps execute in insertion order; either all of them take effect or none
/// do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sequence {
    steps: Vec<Step>,
}

impl Sequence {
    /// Empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Append an arbitrary step.
    pub fn add(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Append a set step.
    pub fn add_set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.add(Step::Set { key: key.into(), value: value.into() })
    }

    /// Append a delete step.
    pub fn add_delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.add(Step::Delete { key: key.into() })
    }

    /// Append an assert step.
    pub fn add_assert(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> &mut Self {
        self.add(Step::Assert { key: key.into(), value })
    }

    /// Append an assert-exists step.
    pub fn add_assert_exists(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.add(Step::AssertExists { key: key.into() })
    }

    /// Append a replace step.
    pub fn add_replace(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> &mut Self {
        self.add(Step::Replace { key: key.into(), value })
    }

    /// Append a delete-prefix step.
    pub fn add_delete_prefix(&mut self, prefix: impl Into<Vec<u8>>) -> &mut Self {
        self.add(Step::DeletePrefix { prefix: prefix.into() })
    }

    /// Append a nested sequence.
    pub fn add_sequence(&mut self, nested: Sequence) -> &mut Self {
        self.add(Step::Sequence(nested.steps))
    }

    /// Serialise the whole tree as a single outer sequence step.
    pub fn encode(&self) -> Vec<u8> {
        let root = Step::Sequence(self.steps.clone());
        let mut buf = Vec::with_capacity(root.encoded_len());
        root.encode(&mut buf);
        buf
    }
}

impl From<Vec<Step>> for Sequence {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}
