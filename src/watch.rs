//! The event loop: multiplex the control pipe and the notification channel
//! under poll(2), with no timeout. The process is woken only by input.

use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{self, PollFd, PollFlags, PollTimeout};
use nix::unistd;

use crate::channel::{NetlinkChannel, READ_BUF_SIZE};
use crate::proto::PortWriter;
use crate::Error;

/// A readiness condition observed in one poll wakeup. A single wakeup can
/// carry several; they are always drained in the order listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// The control pipe has input (a liveness poke) or hit EOF.
    Control,
    /// The channel became writable while the initial dump was still pending.
    DumpRequest,
    /// The channel has notification messages to read.
    Channel,
}

/// Map one wakeup's revents to the conditions to drain, in drain order.
///
/// The channel counts as readable on POLLERR/POLLHUP too, not just POLLIN:
/// poll reports a pending socket error (say, ENOBUFS after a receive-buffer
/// overrun) as POLLERR whether or not we asked for it, and the error is
/// level-triggered -- only a recvmsg consumes it. If it never provoked a
/// read, the loop would spin on poll forever without clearing it.
fn ready_set(
    control_ready: bool,
    dump_pending: bool,
    channel_revents: PollFlags,
) -> [Option<Readiness>; 3] {
    let channel_ready = channel_revents
        .intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP);
    [
        control_ready.then_some(Readiness::Control),
        (dump_pending && channel_revents.contains(PollFlags::POLLOUT))
            .then_some(Readiness::DumpRequest),
        channel_ready.then_some(Readiness::Channel),
    ]
}

fn set_nonblock(fd: RawFd) -> Result<(), Error> {
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| Error::sys("fcntl[F_GETFL]", e))?;
    let flags = OFlag::from_bits_truncate(bits) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| Error::sys("fcntl[F_SETFL]", e))?;
    Ok(())
}

/// Read the pending control byte. Returns true on EOF (the parent closed its
/// end, asking us to shut down); the byte itself carries no meaning.
fn control_hit_eof(control: BorrowedFd) -> Result<bool, Error> {
    let mut byte = [0u8; 1];
    match unistd::read(control.as_raw_fd(), &mut byte) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        // Readiness can be stale; no data right now is not an error.
        Err(Errno::EAGAIN) => Ok(false),
        Err(e) => Err(Error::sys("read", e)),
    }
}

/// Run the watch loop until the parent closes the control pipe (returns
/// `Ok(())`, exit 0) or a fatal condition surfaces (returns the error; the
/// caller reports it and exits 1).
///
/// The channel starts armed for writability; the first time it fires we send
/// the full-table dump request and immediately try a read so the first dump
/// response is not delayed until the next wakeup. After that only readability
/// is watched and the loop runs indefinitely.
pub fn run<W: Write>(
    control: BorrowedFd,
    channel: &NetlinkChannel,
    port: &mut PortWriter<W>,
) -> Result<(), Error> {
    set_nonblock(control.as_raw_fd())?;
    set_nonblock(channel.as_fd().as_raw_fd())?;

    let mut buf = [0u8; READ_BUF_SIZE];
    let mut dump_pending = true;

    loop {
        let channel_interest = if dump_pending {
            PollFlags::POLLIN | PollFlags::POLLOUT
        } else {
            PollFlags::POLLIN
        };
        let mut fds = [
            PollFd::new(control, PollFlags::POLLIN),
            PollFd::new(channel.as_fd(), channel_interest),
        ];

        match poll::poll(&mut fds, PollTimeout::NONE) {
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(Error::sys("poll", e)),
            Ok(_) => {}
        }

        // POLLHUP/POLLERR on the control pipe surface as a zero-byte read
        // below, so they count as readable here.
        let control_ready = fds[0].revents().is_some_and(|r| {
            r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
        });
        let channel_revents = fds[1].revents().unwrap_or(PollFlags::empty());

        for readiness in ready_set(control_ready, dump_pending, channel_revents)
            .into_iter()
            .flatten()
        {
            match readiness {
                Readiness::Control => {
                    if control_hit_eof(control)? {
                        return Ok(());
                    }
                }
                Readiness::DumpRequest => {
                    dump_pending = false;
                    channel.request_dump()?;
                    channel.read_batch(&mut buf, port)?;
                }
                Readiness::Channel => {
                    channel.read_batch(&mut buf, port)?;
                }
            }
        }
    }
}
