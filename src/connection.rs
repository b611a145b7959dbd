// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-client connection state: the read buffer, held locks, owned
//! messages, and the single outstanding lock wait (spec §3 "Connection
//! state").

use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind, Read, Write};

use mio::net::TcpStream;
use mio::Token;

use crate::engine::lock::Mode;

const READ_CHUNK: usize = 4096;

/// The lock this connection is currently parked on.
#[derive(Debug, Clone)]
pub struct Waiting {
    /// Name of the lock being waited for.
    pub name: String,
    /// Mode requested.
    pub mode: Mode,
}

/// One TCP client, plus everything the dispatcher needs to know about it.
#[derive(Debug)]
pub struct Connection {
    /// This connection's identity in the server's connection table.
    pub token: Token,
    /// The underlying socket.
    pub stream: TcpStream,
    read_buf: Vec<u8>,
    /// Locks currently held, and in which mode. At most one entry per name.
    pub locks_held: HashMap<String, Mode>,
    /// Messages this connection is the recorded owner of.
    pub msgs_owned: HashSet<String>,
    /// Present iff this connection is parked on exactly one lock request.
    pub waiting: Option<Waiting>,
}

impl Connection {
    /// Wraps a freshly accepted stream.
    pub fn new(token: Token, stream: TcpStream) -> Self {
        Connection {
            token,
            stream,
            read_buf: Vec::with_capacity(READ_CHUNK),
            locks_held: HashMap::new(),
            msgs_owned: HashSet::new(),
            waiting: None,
        }
    }

    /// Drains all currently-available bytes from the socket into the read
    /// buffer, looping until the kernel would block. This is required for
    /// `mio`'s edge-triggered readiness: anything left unread after this
    /// call returns may not produce another readiness notification, so
    /// partial draining would stall the connection.
    ///
    /// Returns `Ok(true)` if the peer closed its end (possibly after some
    /// bytes were still read and buffered), `Ok(false)` if the socket
    /// simply has no more data right now, or an I/O error on genuine
    /// transport failure.
    pub fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Pulls one complete `\n`-terminated line (without the terminator) out
    /// of the read buffer, if one is present.
    pub fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.read_buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.read_buf.drain(..=pos).collect();
        line.pop(); // drop the '\n'
        Some(line)
    }

    /// Writes `data` to the socket. Per spec §4.4 "Send discipline", a short
    /// write is treated as client misbehavior and the caller must tear the
    /// connection down; responses are small enough (bounded by NAME/TEXT
    /// length) to fit a single non-blocking `write`.
    pub fn send(&mut self, data: &str) -> io::Result<()> {
        let bytes = data.as_bytes();
        let n = self.stream.write(bytes)?;
        if n != bytes.len() {
            return Err(io::Error::new(
                ErrorKind::Other,
                "short write to client socket",
            ));
        }
        Ok(())
    }
}
