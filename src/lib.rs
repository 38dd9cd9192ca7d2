//
//   Copyright 2026 Basil Crow
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
//

//! rtwatch runs as a long-lived child of a controlling daemon. It subscribes
//! to the kernel's rtnetlink route notifications, replays the current routing
//! table once at startup, and reports every observed route change as a compact
//! binary record on stdout. The controlling daemon signals liveness by writing
//! single bytes to rtwatch's stdin and requests shutdown by closing it.

use std::io;

use nix::errno::Errno;

pub mod channel;
pub mod cli;
pub mod proto;
pub mod route;
pub mod watch;
pub mod wire;

// Error handling philosophy: malformed but survivable input from the kernel
// (a message that is not a route, an address family we do not understand) is
// reported to the controlling daemon over the same protocol stream and
// processing continues. Anything that suggests the notification channel
// itself is broken -- setup failures, framing that does not add up, an
// unexpected end of stream -- is fatal: there is no state worth preserving
// across a restart, so we report once and exit rather than limp along.

/// Unified error type for rtwatch. Every variant is fatal; recoverable
/// conditions never surface as an `Error`.
#[derive(Debug)]
pub enum Error {
    /// A system call failed. `op` names the call the way the controlling
    /// daemon expects to see it (e.g. "bind", "recvmsg").
    Sys { op: &'static str, errno: Errno },
    /// The byte stream from the kernel did not frame into valid messages.
    Framing(String),
    /// Writing to the protocol stream failed.
    Io(io::Error),
}

impl Error {
    pub fn sys(op: &'static str, errno: Errno) -> Self {
        Error::Sys { op, errno }
    }

    pub fn framing(reason: &str) -> Self {
        Error::Framing(reason.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Sys { .. } | Error::Framing(_) => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Sys { op, errno } => write!(f, "{}: {}", op, errno.desc()),
            Error::Framing(reason) => write!(f, "{}", reason),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
