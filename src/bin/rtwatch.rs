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

use std::io;
use std::os::fd::AsFd;
use std::process;

use clap::Parser;

use rtwatch::channel::NetlinkChannel;
use rtwatch::cli::RtwatchCli;
use rtwatch::proto::PortWriter;
use rtwatch::watch;

fn main() {
    let RtwatchCli {} = RtwatchCli::parse();

    // Note that Rust leaves SIGPIPE ignored, so a parent that dies while we
    // are writing surfaces as an EPIPE on the fatal path below rather than
    // killing us silently.
    let stdout = io::stdout();
    let mut port = PortWriter::new(stdout.lock());

    let result = NetlinkChannel::open().and_then(|channel| {
        let stdin = io::stdin();
        watch::run(stdin.as_fd(), &channel, &mut port)
    });

    if let Err(e) = result {
        // One final error record, then die; the parent applies its own
        // restart policy. The write itself is best-effort: if the protocol
        // stream is gone there is no one left to tell.
        let _ = port.error(&e.to_string());
        process::exit(1);
    }
}
