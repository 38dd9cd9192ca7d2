//! rtnetlink wire format: message headers, alignment rules, and the
//! variable-length attribute block.
//!
//! We define the protocol constants ourselves rather than pulling them from
//! nix or libc so that the set we support is explicit and independent of what
//! those crates happen to export for the target libc.

/// Byte length of `struct nlmsghdr`.
pub const NLMSG_HDRLEN: usize = 16;
/// Byte length of `struct rtmsg`, which follows the netlink header in route
/// messages.
pub const RTMSG_LEN: usize = 12;
/// Byte length of `struct rtattr` (the attribute header).
pub const RTA_HDRLEN: usize = 4;
/// Netlink messages and attributes are padded to this boundary.
pub const ALIGNTO: usize = 4;

/// Terminator for a multi-message dump reply.
pub const NLMSG_DONE: u16 = 3;

pub const RTM_NEWROUTE: u16 = 24;
pub const RTM_DELROUTE: u16 = 25;
pub const RTM_GETROUTE: u16 = 26;

pub const NLM_F_REQUEST: u16 = 0x001;
pub const NLM_F_DUMP: u16 = 0x300;

// Multicast groups we join: link state, IPv4/IPv6 addresses, IPv4/IPv6
// routes.
pub const RTMGRP_LINK: u32 = 0x1;
pub const RTMGRP_IPV4_IFADDR: u32 = 0x10;
pub const RTMGRP_IPV4_ROUTE: u32 = 0x40;
pub const RTMGRP_IPV6_IFADDR: u32 = 0x100;
pub const RTMGRP_IPV6_ROUTE: u32 = 0x400;

/// The kernel's default routing table. Routes in policy-routing auxiliary
/// tables are not reported.
pub const RT_TABLE_MAIN: u8 = 254;

pub const RTA_DST: u16 = 1;
pub const RTA_GATEWAY: u16 = 5;
pub const RTA_PRIORITY: u16 = 6;

/// Highest attribute kind we track (RTA_NH_ID as of Linux 5.4). Kinds above
/// this are newer kernel additions and are skipped, not errors.
pub const RTA_KIND_MAX: u16 = 30;

/// Round `len` up to the netlink alignment boundary.
pub const fn align(len: usize) -> usize {
    (len + ALIGNTO - 1) & !(ALIGNTO - 1)
}

fn ne_u16(b: &[u8]) -> u16 {
    u16::from_ne_bytes([b[0], b[1]])
}

fn ne_u32(b: &[u8]) -> u32 {
    u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
}

/// Decoded `struct nlmsghdr`. Field values are in host byte order, as the
/// kernel sends them.
#[derive(Debug, Clone, Copy)]
pub struct NlMsgHdr {
    pub len: u32,
    pub kind: u16,
    pub flags: u16,
    pub seq: u32,
    pub pid: u32,
}

impl NlMsgHdr {
    /// Decode a netlink header from the front of `buf`, or `None` if fewer
    /// than [`NLMSG_HDRLEN`] bytes remain.
    pub fn parse(buf: &[u8]) -> Option<NlMsgHdr> {
        if buf.len() < NLMSG_HDRLEN {
            return None;
        }
        Some(NlMsgHdr {
            len: ne_u32(&buf[0..4]),
            kind: ne_u16(&buf[4..6]),
            flags: ne_u16(&buf[6..8]),
            seq: ne_u32(&buf[8..12]),
            pid: ne_u32(&buf[12..16]),
        })
    }
}

/// Decoded `struct rtmsg`.
#[derive(Debug, Clone, Copy)]
pub struct RtMsg {
    pub family: u8,
    pub dst_len: u8,
    pub src_len: u8,
    pub tos: u8,
    pub table: u8,
    pub protocol: u8,
    pub scope: u8,
    pub kind: u8,
    pub flags: u32,
}

impl RtMsg {
    /// Decode an rtmsg from the front of `buf`, or `None` if fewer than
    /// [`RTMSG_LEN`] bytes remain.
    pub fn parse(buf: &[u8]) -> Option<RtMsg> {
        if buf.len() < RTMSG_LEN {
            return None;
        }
        Some(RtMsg {
            family: buf[0],
            dst_len: buf[1],
            src_len: buf[2],
            tos: buf[3],
            table: buf[4],
            protocol: buf[5],
            scope: buf[6],
            kind: buf[7],
            flags: ne_u32(&buf[8..12]),
        })
    }
}

/// Route attributes from one message, keyed by attribute kind.
///
/// Rebuilt per message; entries borrow the read buffer, so no allocation is
/// involved. An in-order scan of the attribute block fills the table, with a
/// later attribute of the same kind overwriting an earlier one.
pub struct AttrTable<'a> {
    slots: [Option<&'a [u8]>; RTA_KIND_MAX as usize + 1],
}

impl<'a> AttrTable<'a> {
    /// Walk the attribute block at `block`, recording the payload of every
    /// attribute whose kind we track.
    ///
    /// The walk stops as soon as a well-formed attribute header no longer
    /// fits in the remaining bytes (the RTA_OK rule), so a declared length
    /// can never take us past the end of the block.
    pub fn parse(block: &'a [u8]) -> AttrTable<'a> {
        let mut slots = [None; RTA_KIND_MAX as usize + 1];
        let mut rest = block;
        while rest.len() >= RTA_HDRLEN {
            let rta_len = ne_u16(&rest[0..2]) as usize;
            let rta_kind = ne_u16(&rest[2..4]);
            if rta_len < RTA_HDRLEN || rta_len > rest.len() {
                break;
            }
            if rta_kind <= RTA_KIND_MAX {
                slots[rta_kind as usize] = Some(&rest[RTA_HDRLEN..rta_len]);
            }
            rest = &rest[align(rta_len).min(rest.len())..];
        }
        AttrTable { slots }
    }

    /// Payload of the last attribute seen with this kind, if any.
    pub fn get(&self, kind: u16) -> Option<&'a [u8]> {
        self.slots.get(kind as usize).copied().flatten()
    }
}
