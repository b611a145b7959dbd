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

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports
)]

//! lockserver is a centralized, single-threaded TCP server that arbitrates
//! advisory reader/writer locks and last-writer-wins rendezvous messages
//! between cooperating client processes.
//!
//! Clients speak a line-oriented ASCII protocol (see [`protocol`]) against a
//! single [`server::Server`] that owns the entire lock/message table and
//! every connection, so no part of this crate needs a mutex: state only
//! ever changes on the thread driving the event loop.

pub mod config;
pub mod connection;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;
