use clap::Parser;

/// rtwatch takes no operands: everything it does is driven by its standard
/// streams, which the controlling daemon wires up when it spawns us. The
/// parser exists for --help and --version and to reject stray arguments.
#[derive(Parser)]
#[command(
    name = "rtwatch",
    version,
    about = "Report kernel routing table changes to a controlling process",
    long_about = "Watch the kernel routing table over rtnetlink and write each route change to \
standard output as a fixed-layout binary record. The current table is replayed once at startup. \
Any byte on standard input is a liveness poke; end-of-file on standard input requests shutdown. \
rtwatch is meant to be spawned as a child of a controlling daemon, not run interactively."
)]
pub struct RtwatchCli {}
