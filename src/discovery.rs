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

//! The discovery file (spec §6): a plain-text `key = value` pointer file
//! that lets a client find this server without being told its address out
//! of band. Written by server bootstrap, read by the external client
//! collaborator (not part of this crate, but the format is shared).

use std::fs;
use std::path::Path;

use crate::error::DiscoveryError;

/// `host`/`port` recovered from a discovery file, falling back to whatever
/// compile-time defaults the caller already had for any key that's absent
/// or a line that's a `#` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Resolved host, unchanged from the caller's default if `host` was absent.
    pub host: String,
    /// Resolved port, unchanged from the caller's default if `port` was absent.
    pub port: u16,
}

/// Parses a discovery file at `path`, overlaying `default_host`/
/// `default_port` with whatever `host =`/`port =` lines it finds. Unknown
/// keys are ignored; `#`-prefixed lines are comments.
pub fn read(path: &Path, default_host: &str, default_port: u16) -> Result<Discovered, DiscoveryError> {
    let contents = fs::read_to_string(path)?;
    let mut host = default_host.to_owned();
    let mut port = default_port;

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| DiscoveryError::InvalidLine {
            line: raw_line.to_owned(),
            path: path.display().to_string(),
        })?;
        let key = key.trim();
        let value = value.trim();

        match key {
            "host" => host = value.to_owned(),
            "port" => {
                port = value
                    .parse()
                    .map_err(|_| DiscoveryError::InvalidPort(value.to_owned()))?
            }
            _ => {}
        }
    }

    Ok(Discovered { host, port })
}

/// Writes `host`/`port` to `path` in the recognized key=value format.
pub fn write(path: &Path, host: &str, port: u16) -> Result<(), DiscoveryError> {
    let contents = format!("host = {host}\nport = {port}\n");
    fs::write(path, contents)?;
    Ok(())
}
