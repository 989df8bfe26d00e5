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

//! Protocol layer: framing constants, the request trait, response parsing.

pub mod messages;
pub mod wire;

use crate::errors::Error;
use wire::{BytesDecoder, Decoder, Step, U32Decoder, WireError};

/// Command mask carried in the high bits of every request tag.
pub const MASK: u32 = 0xb1ff_0000;

/// Protocol version announced in the prologue.
///
/// Fixed per targeted server line; a deployment speaking another version
/// changes this one constant.
pub const PROTOCOL_VERSION: u32 = 1;

/// Response code signalling success.
pub const RESULT_SUCCESS: u32 = 0;

/// Build the preamble sent once on every new connection, before any request.
pub fn build_prologue(cluster_id: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + cluster_id.len());
    wire::put_u32(&mut buf, MASK);
    wire::put_u32(&mut buf, PROTOCOL_VERSION);
    wire::put_bytes(&mut buf, cluster_id);
    buf
}

/// One request to the cluster.
///
/// A request knows its wire tag, how to lay its arguments out in wire order,
/// and which decoder parses its success payload. The response envelope
/// (status code, error demultiplexing) is shared by every request and handled
/// by [`ResponseDecoder`].
pub trait Request {
    /// Decoder for the success payload.
    type Payload: Decoder + Default;

    /// Full 32-bit command tag, mask included.
    fn tag(&self) -> u32;

    /// Validate arguments before any byte is encoded.
    fn check(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Append the arguments in wire order (the tag is not included).
    fn encode_args(&self, buf: &mut Vec<u8>);

    /// Serialize the complete request: tag, then arguments.
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        wire::put_u32(&mut buf, self.tag());
        self.encode_args(&mut buf);
        buf
    }
}

/// Decoded outcome of one response: the typed payload, or the server error.
pub type ServerReply<T> = Result<T, Error>;

/// The success payload type of a request.
pub type RequestOutput<R> = <<R as Request>::Payload as Decoder>::Item;

/// Incremental decoder for a full response.
///
/// Reads the status code, then either the request's payload (on success) or
/// the server's error message, which is mapped through the error-code table
/// with the message preserved verbatim.
#[derive(Debug)]
pub struct ResponseDecoder<D: Decoder> {
    state: ResponseState<D>,
}

#[derive(Debug)]
enum ResponseState<D> {
    Code(U32Decoder),
    Payload(D),
    ErrorMessage { code: u32, message: BytesDecoder },
}

impl<D: Decoder + Default> Default for ResponseDecoder<D> {
    fn default() -> Self {
        Self { state: ResponseState::Code(U32Decoder::default()) }
    }
}

impl<D: Decoder + Default> Decoder for ResponseDecoder<D> {
    type Item = ServerReply<D::Item>;

    fn step(&mut self, input: &mut &[u8]) -> Result<Step<Self::Item>, WireError> {
        loop {
            match &mut self.state {
                ResponseState::Code(code) => match code.step(input)? {
                    Step::Need(n) => return Ok(Step::Need(n)),
                    Step::Done(RESULT_SUCCESS) => {
                        self.state = ResponseState::Payload(D::default());
                    }
                    Step::Done(code) => {
                        self.state = ResponseState::ErrorMessage {
                            code,
                            message: BytesDecoder::default(),
                        };
                    }
                },
                ResponseState::Payload(payload) => {
                    return Ok(match payload.step(input)? {
                        Step::Need(n) => Step::Need(n),
                        Step::Done(value) => Step::Done(Ok(value)),
                    })
                }
                ResponseState::ErrorMessage { code, message } => {
                    return Ok(match message.step(input)? {
                        Step::Need(n) => Step::Need(n),
                        Step::Done(raw) => {
                            let text = String::from_utf8_lossy(&raw).into_owned();
                            Step::Done(Err(Error::from_code(*code, text)))
                        }
                    })
                }
            }
        }
    }
}
