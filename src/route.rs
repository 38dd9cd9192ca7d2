//! Decoding kernel route messages into route change events.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use nix::libc;

use crate::wire::{
    AttrTable, NlMsgHdr, RtMsg, RTA_DST, RTA_GATEWAY, RTA_PRIORITY, RTMSG_LEN, RTM_DELROUTE,
    RTM_NEWROUTE, RT_TABLE_MAIN,
};

/// Origin protocol identifier under which our route writer installs routes.
/// Routes carrying it are not reported back, or the controlling daemon would
/// see its own installs echoed. Keep in sync with the writer side.
pub const RTPROT_SELF: u8 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Added,
    Deleted,
}

/// One observed routing table change, ready for encoding. The address widths
/// of `dest` and `gateway` always agree: both IPv4 or both IPv6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEvent {
    pub kind: RouteKind,
    pub prefix_len: u8,
    pub dest: IpAddr,
    pub gateway: IpAddr,
    pub priority: u32,
}

/// Outcome of decoding one netlink frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// A reportable route change.
    Event(RouteEvent),
    /// Not for us (self-originated, non-main table); dropped silently.
    Ignore,
    /// Malformed but survivable; reported as a protocol error, then dropped.
    Reject(&'static str),
}

fn addr_from_attr(attr: Option<&[u8]>, v6: bool) -> Result<IpAddr, &'static str> {
    match attr {
        None => Ok(if v6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }),
        Some(b) if v6 && b.len() >= 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&b[..16]);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        Some(b) if !v6 && b.len() >= 4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&b[..4]);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        Some(_) => Err("short address attribute"),
    }
}

/// Decode the body of one route message (everything after the netlink
/// header) into a [`Verdict`].
///
/// Only RTM_NEWROUTE and RTM_DELROUTE produce events; the caller is expected
/// to have skipped NLMSG_DONE already. Routes installed under our own origin
/// protocol and routes outside the main table are suppressed without a
/// report.
pub fn decode_route(hdr: &NlMsgHdr, body: &[u8]) -> Verdict {
    let kind = match hdr.kind {
        RTM_NEWROUTE => RouteKind::Added,
        RTM_DELROUTE => RouteKind::Deleted,
        _ => return Verdict::Reject("not a route"),
    };

    let rtm = match RtMsg::parse(body) {
        Some(rtm) => rtm,
        None => return Verdict::Reject("wrong message length"),
    };

    // Don't report routes installed by our own writer.
    if rtm.protocol == RTPROT_SELF {
        return Verdict::Ignore;
    }

    if rtm.table != RT_TABLE_MAIN {
        return Verdict::Ignore;
    }

    let v6 = match rtm.family as libc::c_int {
        libc::AF_INET => false,
        libc::AF_INET6 => true,
        _ => return Verdict::Reject("bad message family"),
    };

    let max_prefix = if v6 { 128 } else { 32 };
    if rtm.dst_len > max_prefix {
        return Verdict::Reject("bad prefix length");
    }

    let attrs = AttrTable::parse(&body[RTMSG_LEN..]);

    let dest = match addr_from_attr(attrs.get(RTA_DST), v6) {
        Ok(addr) => addr,
        Err(reason) => return Verdict::Reject(reason),
    };
    let gateway = match addr_from_attr(attrs.get(RTA_GATEWAY), v6) {
        Ok(addr) => addr,
        Err(reason) => return Verdict::Reject(reason),
    };

    // The kernel reports the metric as a host-endian u32; a shorter payload
    // is treated the same as an absent one.
    let priority = attrs
        .get(RTA_PRIORITY)
        .filter(|b| b.len() >= 4)
        .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0);

    Verdict::Event(RouteEvent {
        kind,
        prefix_len: rtm.dst_len,
        dest,
        gateway,
        priority,
    })
}
