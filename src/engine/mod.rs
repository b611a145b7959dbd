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

//! Process-wide lock/message state, passed explicitly rather than hidden
//! behind globals so it stays testable in isolation (spec §9, "Global
//! state").

pub mod lock;
pub mod message;

use lock::LockTable;
use message::MessageTable;

/// The engine bundles the lock table and message table that every
/// connection's dispatcher mutates. It owns no sockets and does no I/O —
/// the server drives notifications from the data this returns.
#[derive(Debug, Default)]
pub struct Engine {
    /// Active reader/writer locks, keyed by name.
    pub locks: LockTable,
    /// Active rendezvous messages, keyed by name.
    pub messages: MessageTable,
}

impl Engine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Engine {
            locks: LockTable::new(),
            messages: MessageTable::new(),
        }
    }
}
