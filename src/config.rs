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

//! Command-line surface for the server binary (spec §6 "CLI surface").
//!
//! Running with no flags reproduces the spec's exact default bootstrap:
//! detect the outward-facing IP, bind `0.0.0.0:29292`, and write
//! `lockserver.info`. The flags below exist so a real deployment can point
//! the server at a non-default bind address without patching source; they
//! add no lock/message behavior, so none of spec.md's Non-goals exclude
//! them.

use std::path::PathBuf;

use clap::Parser;

/// Default TCP port, matching spec §6.
pub const DEFAULT_PORT: u16 = 29292;

/// Default discovery file name, matching the Python original's
/// `DefaultLockFile`.
pub const DEFAULT_DISCOVERY_FILE: &str = "lockserver.info";

/// lockserverd: a centralized advisory lock and message coordination server.
#[derive(Debug, Parser)]
#[command(name = "lockserverd", version, about)]
pub struct Opts {
    /// Host/IP to bind. Defaults to detecting the outward-facing address,
    /// as the Python original's `getIp()` did.
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to bind.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Where to write the discovery file consumed by clients.
    #[arg(long, default_value = DEFAULT_DISCOVERY_FILE)]
    pub discovery_file: PathBuf,

    /// Tracing filter, e.g. `info`, `debug`, `lockserver=trace`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
