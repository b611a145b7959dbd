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

//! The single-threaded event loop (spec §4.5) and the verb dispatcher (spec
//! §4.4) that sits on top of it.
//!
//! There is exactly one [`Server`], owning the listening socket, every
//! connection, and the [`Engine`]. All state transitions happen on the
//! thread that calls [`Server::run`]; nothing here needs a lock, per spec
//! §5.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use socket2::{Domain, Protocol, Socket, Type};

use crate::connection::{Connection, Waiting};
use crate::engine::lock::{Mode, Request};
use crate::engine::Engine;
use crate::protocol::{self, Command};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

/// Listener backlog mandated by spec §6.
const LISTEN_BACKLOG: i32 = 5;

/// Cap on how much of an offending line gets logged, so a misbehaving
/// client can't inflate log output by sending an enormous bad line.
const LOGGED_LINE_PREFIX: usize = 64;

fn truncated_line(line: &[u8]) -> String {
    let prefix = &line[..line.len().min(LOGGED_LINE_PREFIX)];
    String::from_utf8_lossy(prefix).into_owned()
}

/// Owns the listening socket, every open connection, and the lock/message
/// engine, and drives the `mio` readiness loop over all of them.
#[derive(Debug)]
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: Slab<Connection>,
    engine: Engine,
}

impl Server {
    /// Binds a listener at `addr` with `SO_REUSEADDR` set and a backlog of
    /// 5, matching spec §6 exactly, and prepares (but does not yet run) the
    /// event loop.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Server {
            poll,
            listener,
            connections: Slab::new(),
            engine: Engine::new(),
        })
    }

    /// The address actually bound, useful when `addr`'s port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop. Blocks until a transport error occurs on the
    /// listening socket itself, at which point spec §7 calls for process
    /// exit — this returns the `Err` so `main` can do that.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            self.poll.poll(&mut events, None)?;

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept()?,
                    token => self.handle_event(token, event.is_error(), event.is_readable()),
                }
            }
        }
    }

    fn accept(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!(error = %e, "failed to register new connection, dropping it");
                        continue;
                    }

                    tracing::info!(?token, %addr, "accepted connection");
                    entry.insert(Connection::new(token, stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "listening socket failed, shutting down");
                    return Err(e);
                }
            }
        }
    }

    /// Readiness is recomputed every cycle (spec §4.5), so a token from this
    /// batch whose connection was already torn down earlier in the same
    /// batch is simply skipped here.
    fn handle_event(&mut self, token: Token, is_error: bool, is_readable: bool) {
        if !self.connections.contains(token.0) {
            return;
        }

        if is_error {
            self.teardown(token);
            return;
        }

        if is_readable {
            let result = self
                .connections
                .get_mut(token.0)
                .expect("checked above")
                .fill();

            match result {
                Ok(eof) => {
                    self.dispatch_buffered(token);
                    if eof {
                        self.teardown(token);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    tracing::debug!(?token, error = %e, "read error, tearing down");
                    self.teardown(token);
                }
            }
        }
    }

    /// Hands complete lines to [`Self::handle_line`] until the buffer is
    /// drained, the connection starts waiting on a lock, or the connection
    /// is torn down (spec §4.4 "Dispatch loop").
    fn dispatch_buffered(&mut self, token: Token) {
        loop {
            let conn = match self.connections.get_mut(token.0) {
                Some(c) => c,
                None => return,
            };
            if conn.waiting.is_some() {
                return;
            }
            let line = match conn.take_line() {
                Some(l) => l,
                None => return,
            };

            if !self.handle_line(token, &line) {
                return;
            }
        }
    }

    /// Decodes and routes one line. Returns `false` iff the connection was
    /// torn down while handling it (protocol violation or send failure).
    fn handle_line(&mut self, token: Token, line: &[u8]) -> bool {
        let cmd = match protocol::parse_line(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(
                    ?token,
                    error = %e,
                    line = %truncated_line(line),
                    "protocol violation, terminating connection"
                );
                self.teardown(token);
                return false;
            }
        };

        tracing::trace!(?token, ?cmd, "dispatching command");

        match cmd {
            Command::Lock { name, mode, wait } => self.handle_lock(token, name, mode, wait),
            Command::Release { name } => self.handle_release(token, name),
            Command::Count { name } => self.handle_count(token, name),
            Command::Set { name, text } => self.handle_set(token, name, text),
            Command::Get { name } => self.handle_get(token, name),
            Command::RelMsg { name } => self.handle_relmsg(token, name),
        }
    }

    fn handle_lock(&mut self, token: Token, name: String, mode: Mode, wait: bool) -> bool {
        let already_held = self
            .connections
            .get(token.0)
            .map(|c| c.locks_held.contains_key(&name))
            .unwrap_or(false);

        if already_held {
            tracing::warn!(?token, %name, "lock request refused: already held by this connection");
            return self.send_line(token, &protocol::response_already_locked(&name));
        }

        match self.engine.locks.request(&name, mode, token, wait) {
            Request::Granted => {
                if let Some(conn) = self.connections.get_mut(token.0) {
                    conn.locks_held.insert(name.clone(), mode);
                }
                tracing::debug!(?token, %name, ?mode, "lock granted");
                self.send_line(token, &protocol::response_acquired(&name))
            }
            Request::Enqueued => {
                if let Some(conn) = self.connections.get_mut(token.0) {
                    conn.waiting = Some(Waiting { name: name.clone(), mode });
                }
                tracing::debug!(?token, %name, ?mode, "waiter parked");
                true
            }
            Request::Failed => {
                tracing::debug!(?token, %name, ?mode, "lock failed");
                self.send_line(token, &protocol::response_failed(&name))
            }
        }
    }

    fn handle_release(&mut self, token: Token, name: String) -> bool {
        let held = self
            .connections
            .get_mut(token.0)
            .map(|c| c.locks_held.remove(&name).is_some())
            .unwrap_or(false);

        if !held {
            tracing::warn!(?token, %name, "release refused: not held by this connection");
            return self.send_line(token, &protocol::response_not_locked(&name));
        }

        let granted = self.engine.locks.release(&name, token);
        tracing::debug!(?token, %name, "lock released");
        if !self.send_line(token, &protocol::response_released(&name)) {
            return false;
        }

        for (woken, mode) in granted {
            self.notify(woken, &name, mode);
        }
        true
    }

    fn handle_count(&mut self, token: Token, name: String) -> bool {
        let count = self.engine.locks.count(&name);
        self.send_line(token, &protocol::response_access_count(&name, count))
    }

    fn handle_set(&mut self, token: Token, name: String, text: String) -> bool {
        self.engine.messages.set(&name, text, token);
        tracing::debug!(?token, %name, "message set");
        if let Some(conn) = self.connections.get_mut(token.0) {
            conn.msgs_owned.insert(name);
        }
        true
    }

    fn handle_get(&mut self, token: Token, name: String) -> bool {
        let response = match self.engine.messages.get(&name) {
            Some(text) => {
                tracing::debug!(?token, %name, "message read");
                protocol::response_msg(&name, text)
            }
            None => {
                tracing::debug!(?token, %name, "message read: absent");
                protocol::response_no_msg()
            }
        };
        self.send_line(token, &response)
    }

    fn handle_relmsg(&mut self, token: Token, name: String) -> bool {
        if let Some(conn) = self.connections.get_mut(token.0) {
            conn.msgs_owned.remove(&name);
        }
        self.engine.messages.release(&name, token);
        tracing::debug!(?token, %name, "message released");
        true
    }

    /// Grants `name` in `mode` to `token` (already decided by
    /// [`crate::engine::lock::LockTable::release`]), writes `ACQUIRED`, and
    /// resumes dispatching anything that connection buffered while parked
    /// (spec §4.4 "Notification").
    fn notify(&mut self, token: Token, name: &str, mode: Mode) {
        let sent = match self.connections.get_mut(token.0) {
            Some(conn) => {
                conn.locks_held.insert(name.to_owned(), mode);
                conn.waiting = None;
                conn.send(&protocol::response_acquired(name)).is_ok()
            }
            None => {
                tracing::error!(?token, name, "woken waiter has no live connection");
                return;
            }
        };

        if sent {
            tracing::debug!(?token, name, ?mode, "waiter woken");
            self.dispatch_buffered(token);
        } else {
            self.teardown(token);
        }
    }

    fn send_line(&mut self, token: Token, line: &str) -> bool {
        match self.connections.get_mut(token.0) {
            Some(conn) => match conn.send(line) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(?token, error = %e, "send failed, tearing down");
                    self.teardown(token);
                    false
                }
            },
            None => false,
        }
    }

    /// Releases every lock and message this connection owned, clears it
    /// from any wait queue, and drops its socket (spec §4.4 "Disconnect /
    /// teardown").
    fn teardown(&mut self, token: Token) {
        let Some(mut conn) = self.connections.try_remove(token.0) else {
            return;
        };

        for (name, _mode) in conn.locks_held.drain() {
            let granted = self.engine.locks.release(&name, token);
            for (woken, mode) in granted {
                self.notify(woken, &name, mode);
            }
        }

        for name in conn.msgs_owned.drain() {
            self.engine.messages.release(&name, token);
        }

        if let Some(waiting) = conn.waiting.take() {
            self.engine.locks.clear_waiter(&waiting.name, token);
        }

        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            tracing::trace!(?token, error = %e, "deregister on teardown failed (already closed?)");
        }

        tracing::info!(?token, "connection torn down");
    }
}
