//! The kernel notification channel: a NETLINK_ROUTE socket subscribed to
//! link, address, and route multicast groups, plus the one-shot full-table
//! dump request.

use std::io::{IoSliceMut, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::socket::{
    bind, recvmsg, send, setsockopt, socket, sockopt, AddressFamily, MsgFlags, NetlinkAddr,
    SockFlag, SockProtocol, SockType,
};

use crate::proto::PortWriter;
use crate::route::decode_route;
use crate::route::Verdict;
use crate::wire::{
    self, NlMsgHdr, NLMSG_DONE, NLMSG_HDRLEN, NLM_F_DUMP, NLM_F_REQUEST, RTMGRP_IPV4_IFADDR,
    RTMGRP_IPV4_ROUTE, RTMGRP_IPV6_IFADDR, RTMGRP_IPV6_ROUTE, RTMGRP_LINK, RTM_GETROUTE,
};
use crate::Error;

/// One recvmsg batch is read into a buffer of this size.
pub const READ_BUF_SIZE: usize = 8192;

// A full-table dump arrives as a burst the moment we ask for it; a large
// receive buffer keeps the kernel from dropping messages (ENOBUFS) while we
// work through it.
const RCVBUF_SIZE: usize = 1 << 20;
const SNDBUF_SIZE: usize = 32768;

// The dump request is the only message we ever send; its sequence number is
// fixed.
const DUMP_SEQ: u32 = 1;

pub struct NetlinkChannel {
    fd: OwnedFd,
}

impl NetlinkChannel {
    /// Open, configure, and bind the notification socket. Any failure here
    /// is fatal; there is nothing to watch without the channel.
    pub fn open() -> Result<NetlinkChannel, Error> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::empty(),
            Some(SockProtocol::NetlinkRoute),
        )
        .map_err(|e| Error::sys("socket", e))?;

        setsockopt(&fd, sockopt::SndBuf, &SNDBUF_SIZE)
            .map_err(|e| Error::sys("setsockopt[SO_SNDBUF]", e))?;
        setsockopt(&fd, sockopt::RcvBuf, &RCVBUF_SIZE)
            .map_err(|e| Error::sys("setsockopt[SO_RCVBUF]", e))?;

        let groups = RTMGRP_LINK
            | RTMGRP_IPV4_IFADDR
            | RTMGRP_IPV4_ROUTE
            | RTMGRP_IPV6_IFADDR
            | RTMGRP_IPV6_ROUTE;
        // Wildcard local address; the kernel picks our port id.
        bind(fd.as_raw_fd(), &NetlinkAddr::new(0, groups)).map_err(|e| Error::sys("bind", e))?;

        Ok(NetlinkChannel { fd })
    }

    /// Ask the kernel to replay its entire route table as a sequence of
    /// RTM_NEWROUTE messages. Sent exactly once, on first writability.
    pub fn request_dump(&self) -> Result<(), Error> {
        // nlmsghdr + rtgenmsg { rtgen_family = AF_UNSPEC }, padded.
        let mut req = [0u8; 20];
        let len = req.len() as u32;
        req[0..4].copy_from_slice(&len.to_ne_bytes());
        req[4..6].copy_from_slice(&RTM_GETROUTE.to_ne_bytes());
        req[6..8].copy_from_slice(&(NLM_F_REQUEST | NLM_F_DUMP).to_ne_bytes());
        req[8..12].copy_from_slice(&DUMP_SEQ.to_ne_bytes());
        // nlmsg_pid and rtgen_family stay zero.

        send(self.fd.as_raw_fd(), &req, MsgFlags::empty()).map_err(|e| Error::sys("send", e))?;
        Ok(())
    }

    /// Read one batch of messages from the channel and dispatch every frame
    /// in it. Interrupted, would-block, and kernel-overrun reads end the
    /// attempt quietly; the next readiness wakeup retries.
    pub fn read_batch<W: Write>(
        &self,
        buf: &mut [u8],
        port: &mut PortWriter<W>,
    ) -> Result<(), Error> {
        let (bytes, truncated, sender_ok) = {
            let mut iov = [IoSliceMut::new(&mut *buf)];
            match recvmsg::<NetlinkAddr>(self.fd.as_raw_fd(), &mut iov, None, MsgFlags::empty()) {
                Ok(msg) => (
                    msg.bytes,
                    msg.flags.contains(MsgFlags::MSG_TRUNC),
                    msg.address.is_some(),
                ),
                Err(Errno::EINTR) | Err(Errno::EAGAIN) | Err(Errno::ENOBUFS) => return Ok(()),
                Err(e) => return Err(Error::sys("recvmsg", e)),
            }
        };

        if bytes == 0 {
            return Err(Error::framing("recvmsg: EOF"));
        }
        // A sender that is not a netlink peer means the socket is not the
        // channel we think it is.
        if !sender_ok {
            return Err(Error::framing("bad message namelen"));
        }

        dispatch_batch(&buf[..bytes], truncated, port)
    }
}

impl AsFd for NetlinkChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Frame a batch of back-to-back netlink messages and feed each one through
/// decode and encode.
///
/// `truncated` is the kernel's MSG_TRUNC signal: the tail of the batch did
/// not fit our buffer. A frame whose declared length overruns the remaining
/// bytes is then expected and ends the walk quietly; without the flag it
/// means the stream is corrupt, which is fatal. Leftover bytes smaller than
/// a header are likewise fatal unless the batch was truncated.
pub fn dispatch_batch<W: Write>(
    data: &[u8],
    truncated: bool,
    port: &mut PortWriter<W>,
) -> Result<(), Error> {
    let mut rest = data;
    while let Some(hdr) = NlMsgHdr::parse(rest) {
        let len = hdr.len as usize;
        if len < NLMSG_HDRLEN || len > rest.len() {
            if truncated && len >= NLMSG_HDRLEN {
                // The kernel clipped this frame; everything before it was
                // already dispatched.
                return Ok(());
            }
            return Err(Error::framing("malformed message"));
        }

        // The dump terminator carries no route.
        if hdr.kind != NLMSG_DONE {
            match decode_route(&hdr, &rest[NLMSG_HDRLEN..len]) {
                Verdict::Event(ev) => port.route_event(&ev)?,
                Verdict::Reject(reason) => port.error(reason)?,
                Verdict::Ignore => {}
            }
        }

        rest = &rest[wire::align(len).min(rest.len())..];
    }
    if !rest.is_empty() && !truncated {
        return Err(Error::framing("unexpected remaining bytes"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{CMD_ERROR, CMD_ROUTE_ADD};
    use crate::route::tests::frame;
    use crate::route::RTPROT_SELF;
    use crate::wire::tests::attr;
    use crate::wire::{RTA_DST, RTM_NEWROUTE, RT_TABLE_MAIN};
    use nix::libc;

    const AF_INET: u8 = libc::AF_INET as u8;

    fn done_frame() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(NLMSG_HDRLEN as u32 + 4).to_ne_bytes());
        out.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
        out.extend_from_slice(&0u16.to_ne_bytes());
        out.extend_from_slice(&DUMP_SEQ.to_ne_bytes());
        out.extend_from_slice(&0u32.to_ne_bytes());
        out.extend_from_slice(&0u32.to_ne_bytes()); // dump error code
        out
    }

    fn add_frame() -> Vec<u8> {
        frame(
            RTM_NEWROUTE,
            AF_INET,
            24,
            RT_TABLE_MAIN,
            3,
            &[attr(RTA_DST, &[10, 1, 2, 0])],
        )
    }

    fn run(data: &[u8], truncated: bool) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut port = PortWriter::new(&mut out);
        dispatch_batch(data, truncated, &mut port)?;
        Ok(out)
    }

    #[test]
    fn test_batch_of_route_and_terminator() {
        // A route-add followed by the dump terminator produces exactly one
        // record; the terminator produces none.
        let mut batch = add_frame();
        batch.extend(done_frame());
        let out = run(&batch, false).unwrap();
        assert_eq!(out.len(), 14);
        assert_eq!(out[0], CMD_ROUTE_ADD);
    }

    #[test]
    fn test_batch_reports_rejects_and_continues() {
        // A bad-family frame between two good ones: one error record in the
        // middle, both routes still reported.
        let mut batch = add_frame();
        batch.extend(frame(RTM_NEWROUTE, 7, 0, RT_TABLE_MAIN, 3, &[]));
        batch.extend(add_frame());
        let out = run(&batch, false).unwrap();
        assert_eq!(out[0], CMD_ROUTE_ADD);
        assert_eq!(out[14], CMD_ERROR);
        let err_len = out[15] as usize;
        assert_eq!(&out[16..16 + err_len], b"bad message family");
        assert_eq!(out[16 + err_len], CMD_ROUTE_ADD);
    }

    #[test]
    fn test_truncated_tail_is_not_fatal() {
        // Complete frames before the clipped tail are dispatched; the tail
        // itself is dropped without error.
        let mut batch = add_frame();
        let whole = add_frame();
        batch.extend(&whole[..whole.len() - 8]);
        let out = run(&batch, true).unwrap();
        assert_eq!(out.len(), 14);
    }

    #[test]
    fn test_overrun_without_trunc_flag_is_fatal() {
        let whole = add_frame();
        let batch = &whole[..whole.len() - 8];
        match run(batch, false) {
            Err(Error::Framing(reason)) => assert_eq!(reason, "malformed message"),
            other => panic!("expected framing error, got {:?}", other),
        }
    }

    #[test]
    fn test_undersized_length_is_fatal_even_when_truncated() {
        // A declared length below the header size is corruption, not
        // truncation.
        let mut batch = add_frame();
        batch[0..4].copy_from_slice(&4u32.to_ne_bytes());
        assert!(run(&batch, true).is_err());
        assert!(run(&batch, false).is_err());
    }

    #[test]
    fn test_leftover_bytes_are_fatal() {
        let mut batch = add_frame();
        batch.extend_from_slice(&[0u8; 3]);
        match run(&batch, false) {
            Err(Error::Framing(reason)) => assert_eq!(reason, "unexpected remaining bytes"),
            other => panic!("expected framing error, got {:?}", other),
        }
    }

    #[test]
    fn test_leftover_bytes_tolerated_when_truncated() {
        let mut batch = add_frame();
        batch.extend_from_slice(&[0u8; 3]);
        assert!(run(&batch, true).is_ok());
    }

    #[test]
    fn test_suppressed_frames_produce_no_output() {
        let mut batch = frame(RTM_NEWROUTE, AF_INET, 24, RT_TABLE_MAIN, RTPROT_SELF, &[]);
        batch.extend(frame(RTM_NEWROUTE, AF_INET, 24, 100, 3, &[]));
        let out = run(&batch, false).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        assert!(run(&[], false).unwrap().is_empty());
    }
}
