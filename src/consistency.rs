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

//! Read-freshness guarantees attached to queries.

use crate::errors::Error;

/// How fresh a read must be.
///
/// Writes always go through the master; reads can be relaxed per request.
/// `AtLeast(i)` accepts any replica whose applied transaction counter has
/// reached `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Consistency {
    /// Linearised read through the current master.
    #[default]
    Consistent,
    /// Read from any replica, however stale.
    Inconsistent,
    /// Read from any replica that has applied at least transaction `i`.
    AtLeast(i64),
}

impl Consistency {
    /// Validate before anything is encoded.
    pub fn check(&self) -> Result<(), Error> {
        match self {
            Consistency::AtLeast(i) if *i < 0 => Err(Error::InvalidArgument {
                name: "consistency",
                reason: format!("AtLeast requires a non-negative counter, got {i}"),
            }),
            _ => Ok(()),
        }
    }
}
