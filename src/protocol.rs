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

//! The wire grammar (spec §6): ASCII, line-framed by `\n`, `verb SP arg`.

use crate::engine::lock::Mode;
use crate::error::ProtocolError;

/// One decoded command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `xlock`/`slock`/`xlockwait`/`slockwait NAME`, `wait` selects the
    /// blocking variant.
    Lock { name: String, mode: Mode, wait: bool },
    /// `release NAME`
    Release { name: String },
    /// `count NAME`
    Count { name: String },
    /// `set NAME TEXT`
    Set { name: String, text: String },
    /// `get NAME`
    Get { name: String },
    /// `relmsg NAME`
    RelMsg { name: String },
}

/// Splits `line` (without its trailing `\n`) into `verb SP arg` and decodes
/// the verb/argument(s) into a [`Command`].
///
/// Returns `Err` exactly where spec §4.4/§7 calls for terminating the
/// connection: a missing mandatory space, non-ASCII bytes, or an
/// unrecognized verb.
pub fn parse_line(line: &[u8]) -> Result<Command, ProtocolError> {
    if !line.is_ascii() {
        return Err(ProtocolError::NotAscii);
    }
    // SAFETY: checked `is_ascii` above, all ASCII bytes are valid UTF-8.
    let line = unsafe { std::str::from_utf8_unchecked(line) };

    let (verb, arg) = line
        .split_once(' ')
        .ok_or(ProtocolError::MissingSeparator)?;

    match verb {
        "xlock" => Ok(Command::Lock {
            name: require_name(arg)?,
            mode: Mode::Exclusive,
            wait: false,
        }),
        "slock" => Ok(Command::Lock {
            name: require_name(arg)?,
            mode: Mode::Shared,
            wait: false,
        }),
        "xlockwait" => Ok(Command::Lock {
            name: require_name(arg)?,
            mode: Mode::Exclusive,
            wait: true,
        }),
        "slockwait" => Ok(Command::Lock {
            name: require_name(arg)?,
            mode: Mode::Shared,
            wait: true,
        }),
        "release" => Ok(Command::Release {
            name: require_name(arg)?,
        }),
        "count" => Ok(Command::Count {
            name: require_name(arg)?,
        }),
        "set" => {
            let (name, text) = arg
                .split_once(' ')
                .ok_or(ProtocolError::MissingSetText)?;
            require_name(name)?;
            Ok(Command::Set {
                name: name.to_owned(),
                text: text.to_owned(),
            })
        }
        "get" => Ok(Command::Get {
            name: require_name(arg)?,
        }),
        "relmsg" => Ok(Command::RelMsg {
            name: require_name(arg)?,
        }),
        other => Err(ProtocolError::UnknownVerb(other.to_owned())),
    }
}

fn require_name(s: &str) -> Result<String, ProtocolError> {
    if s.is_empty() || s.contains(' ') {
        return Err(ProtocolError::InvalidName);
    }
    Ok(s.to_owned())
}

/// Formats the `ACQUIRED NAME\n` / `FAILED NAME\n` response to a lock
/// request.
pub fn response_acquired(name: &str) -> String {
    format!("ACQUIRED {name}\n")
}

/// See [`response_acquired`].
pub fn response_failed(name: &str) -> String {
    format!("FAILED {name}\n")
}

/// `RELEASED NAME\n`
pub fn response_released(name: &str) -> String {
    format!("RELEASED {name}\n")
}

/// `ERROR NAME already locked\n`
pub fn response_already_locked(name: &str) -> String {
    format!("ERROR {name} already locked\n")
}

/// `ERROR NAME not already locked\n`
pub fn response_not_locked(name: &str) -> String {
    format!("ERROR {name} not already locked\n")
}

/// `ACCESSCOUNT NAME N\n`
pub fn response_access_count(name: &str, count: u32) -> String {
    format!("ACCESSCOUNT {name} {count}\n")
}

/// `MSG NAME TEXT\n`
pub fn response_msg(name: &str, text: &str) -> String {
    format!("MSG {name} {text}\n")
}

/// `NOMSG\n`
pub fn response_no_msg() -> String {
    "NOMSG\n".to_owned()
}
