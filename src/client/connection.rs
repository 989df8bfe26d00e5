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

//! One node connection: transport seams, prologue, decoder-driven reads.

use crate::client::config::NodeLocation;
use crate::errors::{Error, Result};
use crate::protocol::wire::{Decoder, Step};
use crate::protocol::build_prologue;
use futures::future::BoxFuture;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const KEEPALIVE_IDLE: Duration = Duration::from_secs(20);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
#[cfg(not(windows))]
const KEEPALIVE_PROBES: u32 = 3;

/// Byte stream to one node.
///
/// The core never opens sockets itself; it drives whatever stream the
/// installed [`Connector`] hands back.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Opens transports to nodes.
///
/// The default [`TcpConnector`] dials plain TCP. TLS deployments install a
/// connector that performs the handshake with the material carried in the
/// cluster configuration; the handshake itself is outside the core.
pub trait Connector: Send + Sync {
    /// Open a transport to one node, within `timeout`.
    fn connect<'a>(
        &'a self,
        location: &'a NodeLocation,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<Box<dyn Transport>>>;
}

/// Plain TCP connector with keep-alive probing.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(
        &'a self,
        location: &'a NodeLocation,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<Box<dyn Transport>>> {
        Box::pin(async move {
            let mut last_err = None;
            // The first address is preferred; all are viable.
            for address in &location.addresses {
                let dial = TcpStream::connect((address.as_str(), location.port));
                match tokio::time::timeout(timeout, dial).await {
                    Ok(Ok(stream)) => {
                        enable_keepalive(&stream)?;
                        return Ok(Box::new(stream) as Box<dyn Transport>);
                    }
                    Ok(Err(e)) => {
                        debug!(%address, port = location.port, error = %e, "dial failed");
                        last_err = Some(e);
                    }
                    Err(_) => {
                        debug!(%address, port = location.port, "dial timed out");
                        last_err = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timeout"));
                    }
                }
            }
            Err(last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")))
        })
    }
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL);
    #[cfg(not(windows))]
    let keepalive = keepalive.with_retries(KEEPALIVE_PROBES);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Lifecycle of one connection.
///
/// `Closed` is terminal; reuse allocates a fresh [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
}

/// An open, prologue-initialised channel to one node.
pub(crate) struct Connection {
    peer: String,
    stream: Option<Box<dyn Transport>>,
    state: ConnState,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Dial a node and send the prologue.
    ///
    /// The prologue goes out exactly once, before any request; a connection
    /// that fails mid-prologue is closed, never reused.
    pub(crate) async fn open(
        connector: &dyn Connector,
        location: &NodeLocation,
        cluster_id: &[u8],
        connect_timeout: Duration,
    ) -> Result<Self> {
        let peer = format!(
            "{}:{}",
            location.addresses.first().map(String::as_str).unwrap_or("?"),
            location.port
        );
        let mut conn = Self {
            peer,
            stream: None,
            state: ConnState::Disconnected,
            read_timeout: Some(connect_timeout),
        };

        conn.state = ConnState::Connecting;
        match connector.connect(location, connect_timeout).await {
            Ok(stream) => conn.stream = Some(stream),
            Err(e) => {
                warn!(peer = %conn.peer, error = %e, "unable to connect");
                conn.state = ConnState::Closed;
                return Err(Error::NotConnected(conn.peer));
            }
        }

        conn.write_all(&build_prologue(cluster_id)).await?;
        conn.state = ConnState::Ready;
        Ok(conn)
    }

    /// Peer address, for error reporting.
    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    /// Override the read timeout; `None` disables it.
    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Write one serialised request atomically.
    pub(crate) async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ConnState::Ready {
            return Err(Error::NotConnected(self.peer.clone()));
        }
        self.write_all(bytes).await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let outcome = {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| Error::NotConnected(self.peer.clone()))?;
            match stream.write_all(bytes).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            }
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(Error::Send(e))
            }
        }
    }

    /// Drive a decoder to completion, reading exactly the bytes it asks for.
    pub(crate) async fn receive<D: Decoder>(&mut self, decoder: &mut D) -> Result<D::Item> {
        if self.state != ConnState::Ready {
            return Err(Error::ReadClosed);
        }

        let mut chunk: Vec<u8> = Vec::new();
        loop {
            let mut input: &[u8] = &chunk;
            let step = match decoder.step(&mut input) {
                Ok(step) => step,
                Err(e) => {
                    // The stream position is unknown after a codec violation.
                    self.close();
                    return Err(Error::Wire(e));
                }
            };
            match step {
                Step::Done(value) => return Ok(value),
                Step::Need(n) => {
                    chunk.resize(n, 0);
                    self.read_exact_timed(&mut chunk).await?;
                }
            }
        }
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let timeout = self.read_timeout;
            let outcome: Result<usize> = {
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or_else(|| Error::NotConnected(self.peer.clone()))?;
                let read = stream.read(&mut buf[filled..]);
                match timeout {
                    Some(t) => match tokio::time::timeout(t, read).await {
                        Ok(r) => r.map_err(Error::Read),
                        Err(_) => Err(Error::NotReadable),
                    },
                    None => read.await.map_err(Error::Read),
                }
            };
            match outcome {
                Ok(0) => {
                    self.close();
                    return Err(Error::ReadNoBytes);
                }
                Ok(n) => filled += n,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Tear the connection down; terminal.
    pub(crate) fn close(&mut self) {
        self.stream = None;
        self.state = ConnState::Closed;
    }
}
