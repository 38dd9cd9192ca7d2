use roff::{bold, roman, Roff};
use std::fs;
use std::path::Path;

struct ManPage<'a> {
    name: &'a str,
    about: &'a str,
    description: &'a str,
    synopsis: &'a str,
    protocol: &'a [(&'a str, &'a str)],
    exit_status: &'a str,
    see_also: &'a str,
}

fn render_man_page(page: &ManPage, out_dir: &Path) {
    let version = env!("CARGO_PKG_VERSION");
    let upper_name = page.name.to_uppercase();
    let date_version = format!("{} {}", page.name, version);
    let mut roff = Roff::default();
    roff.control("TH", [upper_name.as_str(), "1", date_version.as_str()]);
    roff.control("SH", ["NAME"]);
    roff.text([roman(format!("{} - {}", page.name, page.about))]);
    roff.control("SH", ["SYNOPSIS"]);
    roff.text([bold(page.name), roman(format!(" {}", page.synopsis))]);
    roff.control("SH", ["DESCRIPTION"]);
    roff.text([roman(page.description)]);
    if !page.protocol.is_empty() {
        roff.control("SH", ["PROTOCOL"]);
        for (record, layout) in page.protocol {
            roff.control("TP", []);
            roff.text([bold(*record)]);
            roff.text([roman(*layout)]);
        }
    }
    if !page.exit_status.is_empty() {
        roff.control("SH", ["EXIT STATUS"]);
        roff.text([roman(page.exit_status)]);
    }
    if !page.see_also.is_empty() {
        roff.control("SH", ["SEE ALSO"]);
        roff.text([roman(page.see_also)]);
    }
    fs::write(out_dir.join(format!("{}.1", page.name)), roff.to_roff()).unwrap();
}

fn main() {
    let out_dir = Path::new("target/man");
    fs::create_dir_all(out_dir).unwrap();

    render_man_page(
        &ManPage {
            name: "rtwatch",
            about: "report kernel routing table changes to a controlling process",
            description: "Subscribe to rtnetlink route notifications, replay the current routing \
                          table once at startup, and write every observed change to the kernel's \
                          main routing table to standard output as a fixed-layout binary record. \
                          Standard input is the control channel: any byte written to it is a \
                          liveness poke and is discarded; closing it shuts rtwatch down. rtwatch \
                          is meant to be spawned as a child of a controlling daemon with both \
                          streams connected to pipes, not run interactively. Routes outside the \
                          main table and routes installed under rtwatch's own reserved origin \
                          protocol are not reported.",
            synopsis: "",
            protocol: &[
                (
                    "Route event",
                    "One byte command (0 route added, 1 route deleted), one byte prefix length, \
                     destination address (4 bytes IPv4, 16 bytes IPv6), gateway address (same \
                     width), 4-byte big-endian route metric. Absent addresses are all zeros.",
                ),
                (
                    "Error",
                    "One byte command (255), one byte message length, then the message bytes, \
                     not NUL-terminated. Emitted for survivable protocol errors and, once, \
                     before a fatal exit.",
                ),
            ],
            exit_status: "0 after end-of-file on standard input; 1 after a fatal error, which is \
                          preceded by an error record on standard output.",
            see_also: "rtnetlink(7), netlink(7), ip-route(8)",
        },
        out_dir,
    );

    println!("cargo:rerun-if-changed=build.rs");
}
