//! The binary protocol spoken to the controlling daemon.
//!
//! Records are written back to back with no delimiters; the first byte of
//! each record is a command code. These codes are a contract with the parent
//! side and must not change.

use std::io::{self, Write};
use std::net::IpAddr;

use crate::route::{RouteEvent, RouteKind};

pub const CMD_ROUTE_ADD: u8 = 0;
pub const CMD_ROUTE_DEL: u8 = 1;
pub const CMD_ERROR: u8 = 255;

/// Error messages are length-prefixed by a single byte.
const MAX_ERROR_LEN: usize = 255;

/// Writes protocol records to the controlling daemon.
///
/// Each record is serialized into one contiguous buffer and handed to the
/// stream in a single `write_all` so a record can never be split by a short
/// write. The stream is flushed after every record; there is no batching.
pub struct PortWriter<W: Write> {
    out: W,
    buf: Vec<u8>,
}

impl<W: Write> PortWriter<W> {
    pub fn new(out: W) -> Self {
        PortWriter {
            out,
            buf: Vec::with_capacity(2 + 16 + 16 + 4),
        }
    }

    fn push_addr(buf: &mut Vec<u8>, addr: IpAddr) {
        match addr {
            IpAddr::V4(a) => buf.extend_from_slice(&a.octets()),
            IpAddr::V6(a) => buf.extend_from_slice(&a.octets()),
        }
    }

    /// Emit one route event record: command, prefix length, destination,
    /// gateway, metric (big-endian).
    pub fn route_event(&mut self, ev: &RouteEvent) -> io::Result<()> {
        self.buf.clear();
        self.buf.push(match ev.kind {
            RouteKind::Added => CMD_ROUTE_ADD,
            RouteKind::Deleted => CMD_ROUTE_DEL,
        });
        self.buf.push(ev.prefix_len);
        Self::push_addr(&mut self.buf, ev.dest);
        Self::push_addr(&mut self.buf, ev.gateway);
        self.buf.extend_from_slice(&ev.priority.to_be_bytes());
        self.out.write_all(&self.buf)?;
        self.out.flush()
    }

    /// Emit one error record. Used both for survivable protocol errors and,
    /// as the last record before exit, for fatal ones. Messages longer than
    /// the one-byte length prefix allows are truncated.
    pub fn error(&mut self, msg: &str) -> io::Result<()> {
        let bytes = msg.as_bytes();
        let len = bytes.len().min(MAX_ERROR_LEN);
        self.buf.clear();
        self.buf.push(CMD_ERROR);
        self.buf.push(len as u8);
        self.buf.extend_from_slice(&bytes[..len]);
        self.out.write_all(&self.buf)?;
        self.out.flush()
    }
}
