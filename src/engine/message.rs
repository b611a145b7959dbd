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

//! The named message registry: a last-writer-wins rendezvous slot, keyed by
//! name, not a queue or a durable value.

use std::collections::HashMap;

use mio::Token;

struct MessageEntry {
    text: String,
    owner: Token,
}

/// Name-indexed table of rendezvous messages.
///
/// An entry exists iff its text is present (spec §3); `get` on a name with
/// no entry is a pure read and never creates one, which already gives the
/// externally observable behaviour the original's delete-on-absent-get
/// produced, without the original's transient "entry exists with no text"
/// state. See DESIGN.md for the Open Question this resolves.
#[derive(Debug, Default)]
pub struct MessageTable {
    messages: HashMap<String, MessageEntry>,
}

impl std::fmt::Debug for MessageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEntry")
            .field("text", &self.text)
            .field("owner", &self.owner)
            .finish()
    }
}

impl MessageTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        MessageTable::default()
    }

    /// Unconditionally replaces the text and owner of `name`, creating the
    /// entry if it didn't already exist.
    pub fn set(&mut self, name: &str, text: String, owner: Token) {
        self.messages.insert(
            name.to_owned(),
            MessageEntry { text, owner },
        );
    }

    /// Returns the current text for `name`, if any. Never materializes an
    /// entry for a name with none (pure query, per spec §4.3).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.messages.get(name).map(|e| e.text.as_str())
    }

    /// Removes `name`'s entry iff `caller` is its recorded owner; otherwise
    /// a no-op (another writer already overwrote it).
    pub fn release(&mut self, name: &str, caller: Token) {
        if let Some(entry) = self.messages.get(name) {
            if entry.owner == caller {
                self.messages.remove(name);
            }
        }
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }
}
