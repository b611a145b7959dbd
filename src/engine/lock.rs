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

//! The reader/writer lock table.
//!
//! A [`LockTable`] entry exists exactly while a lock has holders or waiters;
//! releasing the last holder of an otherwise unwaited-on lock removes its
//! entry. All wake-up decisions are made here and returned to the caller as
//! plain data ([`Granted`] lists) — this module never touches a socket.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, VecDeque};

use mio::Token;

/// The mode under which a connection holds or requests a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Multiple connections may hold the lock simultaneously.
    Shared,
    /// At most one connection may hold the lock.
    Exclusive,
}

/// Outcome of a non-blocking or blocking acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    /// The lock was granted immediately.
    Granted,
    /// The lock was not available; the caller was enqueued as a waiter.
    Enqueued,
    /// The lock was not available and the caller declined to wait.
    Failed,
}

/// A waiter newly granted the lock as a result of a `release`.
pub type Granted = (Token, Mode);

/// State of one named lock.
///
/// Invariants (spec §3): `holders == 0` never coexists with a non-empty
/// `waiters` queue outside of the body of [`LockTable::release`] — by the
/// time that function returns, the entry has either been removed or has
/// `holders > 0` again. `mode == Exclusive` implies `holders == 1`.
#[derive(Debug)]
struct LockEntry {
    mode: Mode,
    holders: u32,
    waiters: VecDeque<(Token, Mode)>,
}

impl LockEntry {
    fn new(mode: Mode) -> Self {
        LockEntry {
            mode,
            holders: 1,
            waiters: VecDeque::new(),
        }
    }

    /// Attempts to grant `mode` against the current holder state.
    fn try_acquire(&mut self, mode: Mode) -> bool {
        if self.holders == 0 {
            self.mode = mode;
            self.holders = 1;
            return true;
        }
        if self.mode == Mode::Shared && mode == Mode::Shared {
            self.holders += 1;
            return true;
        }
        false
    }
}

/// Name-indexed table of active locks, with lazy creation and lazy deletion.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<String, LockEntry>,
}

impl LockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        LockTable::default()
    }

    /// Requests `mode` on behalf of `holder`. If the lock can't be granted
    /// and `may_wait` is set, `holder` is enqueued as a waiter in FIFO order.
    pub fn request(&mut self, name: &str, mode: Mode, holder: Token, may_wait: bool) -> Request {
        match self.locks.entry(name.to_owned()) {
            MapEntry::Vacant(slot) => {
                slot.insert(LockEntry::new(mode));
                Request::Granted
            }
            MapEntry::Occupied(mut slot) => {
                if slot.get_mut().try_acquire(mode) {
                    Request::Granted
                } else if may_wait {
                    slot.get_mut().waiters.push_back((holder, mode));
                    Request::Enqueued
                } else {
                    Request::Failed
                }
            }
        }
    }

    /// Releases one hold that `holder` had on `name`, waking waiters per the
    /// coalescing policy in spec §4.1: the head waiter is granted
    /// unconditionally, then if it was granted in shared mode, any run of
    /// *contiguous* shared waiters immediately behind it is granted too. The
    /// scan stops at the first exclusive waiter — it does not skip over it
    /// to reach shared waiters further back (see DESIGN.md, "shared burst
    /// coalescing").
    ///
    /// Returns the list of connections newly granted the lock, in the order
    /// they should be notified.
    pub fn release(&mut self, name: &str, holder: Token) -> Vec<Granted> {
        let mut granted = Vec::new();

        let remove = {
            let entry = match self.locks.get_mut(name) {
                Some(entry) => entry,
                None => return granted,
            };

            debug_assert!(entry.holders > 0, "release of lock {name} with no holders");
            entry.holders -= 1;

            if entry.holders > 0 {
                return granted;
            }

            if entry.waiters.is_empty() {
                true
            } else {
                let (head, head_mode) = entry.waiters.pop_front().unwrap();
                let ok = entry.try_acquire(head_mode);
                debug_assert!(ok, "head waiter must always be grantable on release");
                granted.push((head, head_mode));

                if head_mode == Mode::Shared {
                    while matches!(entry.waiters.front(), Some((_, Mode::Shared))) {
                        let (tok, mode) = entry.waiters.pop_front().unwrap();
                        let ok = entry.try_acquire(mode);
                        debug_assert!(ok, "contiguous shared waiter must always be grantable");
                        granted.push((tok, mode));
                    }
                }
                false
            }
        };

        if remove {
            self.locks.remove(name);
        }

        granted
    }

    /// Removes a specific parked waiter, used when a waiting connection
    /// disconnects before being granted the lock.
    pub fn clear_waiter(&mut self, name: &str, holder: Token) {
        if let Some(entry) = self.locks.get_mut(name) {
            entry.waiters.retain(|(tok, _)| *tok != holder);
        }
    }

    /// Returns the current holder count for `name`, or 0 if no entry exists.
    /// Does not create an entry (pure query, per spec §4.3).
    pub fn count(&self, name: &str) -> u32 {
        self.locks.get(name).map(|e| e.holders).unwrap_or(0)
    }

    /// True if `name` has an active entry (holders or waiters). Exposed for
    /// tests asserting invariant 2 ("no phantom entries").
    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }

    #[cfg(test)]
    pub fn mode_of(&self, name: &str) -> Option<Mode> {
        self.locks.get(name).map(|e| e.mode)
    }

    #[cfg(test)]
    pub fn waiter_tokens(&self, name: &str) -> Vec<Token> {
        self.locks
            .get(name)
            .map(|e| e.waiters.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(n: usize) -> Token {
        Token(n)
    }

    #[test]
    fn exclusive_round_trip() {
        let mut t = LockTable::new();
        assert_eq!(t.request("a", Mode::Exclusive, tok(1), false), Request::Granted);
        assert_eq!(t.request("a", Mode::Exclusive, tok(2), false), Request::Failed);
        assert_eq!(t.release("a", tok(1)), vec![]);
        assert!(!t.contains("a"));
    }

    #[test]
    fn shared_holders_stack() {
        let mut t = LockTable::new();
        assert_eq!(t.request("b", Mode::Shared, tok(1), false), Request::Granted);
        assert_eq!(t.request("b", Mode::Shared, tok(2), false), Request::Granted);
        assert_eq!(t.count("b"), 2);
        assert_eq!(t.request("b", Mode::Exclusive, tok(3), false), Request::Failed);
    }

    #[test]
    fn exclusive_wakes_single_waiter() {
        let mut t = LockTable::new();
        t.request("c", Mode::Shared, tok(1), false);
        assert_eq!(t.request("c", Mode::Exclusive, tok(2), true), Request::Enqueued);
        assert_eq!(t.request("c", Mode::Shared, tok(3), true), Request::Enqueued);
        let granted = t.release("c", tok(1));
        assert_eq!(granted, vec![(tok(2), Mode::Exclusive)]);
        assert_eq!(t.waiter_tokens("c"), vec![tok(3)]);
    }

    #[test]
    fn shared_burst_coalesces_but_stops_at_exclusive() {
        // Scenario S3 from spec.md: C1 holds shared; C2,C3 shared-wait, C4
        // exclusive-waits, C5 shared-waits. Releasing C1 must grant C2 and
        // C3 together, and must NOT skip past C4 to grant C5.
        let mut t = LockTable::new();
        t.request("d", Mode::Shared, tok(1), false);
        t.request("d", Mode::Shared, tok(2), true);
        t.request("d", Mode::Shared, tok(3), true);
        t.request("d", Mode::Exclusive, tok(4), true);
        t.request("d", Mode::Shared, tok(5), true);

        let granted = t.release("d", tok(1));
        assert_eq!(granted, vec![(tok(2), Mode::Shared), (tok(3), Mode::Shared)]);
        assert_eq!(t.waiter_tokens("d"), vec![tok(4), tok(5)]);

        // C2 and C3 both release; only now is C4 woken.
        assert_eq!(t.release("d", tok(2)), vec![]);
        let granted = t.release("d", tok(3));
        assert_eq!(granted, vec![(tok(4), Mode::Exclusive)]);
        assert_eq!(t.waiter_tokens("d"), vec![tok(5)]);

        let granted = t.release("d", tok(4));
        assert_eq!(granted, vec![(tok(5), Mode::Shared)]);
    }

    #[test]
    fn clear_waiter_removes_disconnected_waiter() {
        let mut t = LockTable::new();
        t.request("e", Mode::Exclusive, tok(1), false);
        t.request("e", Mode::Shared, tok(2), true);
        t.clear_waiter("e", tok(2));
        assert!(t.waiter_tokens("e").is_empty());
        let granted = t.release("e", tok(1));
        assert_eq!(granted, vec![]);
        assert!(!t.contains("e"));
    }

    #[test]
    fn count_on_absent_lock_does_not_materialize() {
        let t = LockTable::new();
        assert_eq!(t.count("nope"), 0);
        assert!(!t.contains("nope"));
    }
}
