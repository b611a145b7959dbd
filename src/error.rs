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

//! Error types shared across the protocol dispatcher and the discovery file
//! reader/writer.

/// A line failed to decode into a well-formed command.
///
/// Every variant here corresponds to a case in §4.4/§7 of the protocol
/// design that terminates the connection without a response.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The mandatory verb/argument separator was missing.
    #[error("missing mandatory space in command line")]
    MissingSeparator,
    /// `set` requires a second `NAME SP TEXT` split that wasn't present.
    #[error("set command missing text argument")]
    MissingSetText,
    /// The verb isn't one of the nine recognized commands.
    #[error("unrecognized verb {0:?}")]
    UnknownVerb(String),
    /// The line wasn't valid ASCII.
    #[error("command line was not valid ASCII")]
    NotAscii,
    /// NAME was empty or contained disallowed characters.
    #[error("invalid lock/message name")]
    InvalidName,
}

/// Failures that can occur writing or reading the discovery file.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Underlying filesystem error.
    #[error("discovery file I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A non-comment line was missing the `key = value` separator.
    #[error("invalid line {line:?} in discovery file {path}")]
    InvalidLine {
        /// Offending line, verbatim.
        line: String,
        /// Path of the file being parsed.
        path: String,
    },
    /// The `port` key's value wasn't a valid decimal integer.
    #[error("invalid port value {0:?} in discovery file")]
    InvalidPort(String),
}
