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

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rtwatch::channel::NetlinkChannel;
use rtwatch::proto::{CMD_ERROR, CMD_ROUTE_ADD, CMD_ROUTE_DEL};

mod common;
use common::find_exec;

// rtwatch needs a NETLINK_ROUTE socket; some build sandboxes forbid that.
fn netlink_available() -> bool {
    match NetlinkChannel::open() {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping: no netlink in this environment ({})", e);
            false
        }
    }
}

fn spawn_rtwatch() -> Child {
    Command::new(find_exec("rtwatch"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn rtwatch")
}

// Wait for exit with a bound, so a hung child fails the test rather than
// hanging it.
fn wait_bounded(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = child.try_wait().expect("try_wait failed") {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            let _ = child.wait();
            panic!("rtwatch did not exit within 5s of stdin close");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn rtwatch_exits_cleanly_on_stdin_close() {
    if !netlink_available() {
        return;
    }
    let mut child = spawn_rtwatch();
    drop(child.stdin.take());

    let status = wait_bounded(&mut child);
    assert_eq!(status.code(), Some(0), "expected clean exit on stdin EOF");
}

#[test]
fn rtwatch_survives_liveness_pokes() {
    if !netlink_available() {
        return;
    }
    let mut child = spawn_rtwatch();
    let mut stdin = child.stdin.take().unwrap();

    for _ in 0..3 {
        stdin.write_all(&[0]).expect("failed to poke rtwatch");
        stdin.flush().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(
            child.try_wait().expect("try_wait failed").is_none(),
            "rtwatch exited on a liveness poke"
        );
    }

    drop(stdin);
    let status = wait_bounded(&mut child);
    assert_eq!(status.code(), Some(0));
}

#[test]
fn rtwatch_output_starts_with_a_valid_command() {
    if !netlink_available() {
        return;
    }
    let mut child = spawn_rtwatch();

    // Give the initial dump a moment to be requested and answered.
    thread::sleep(Duration::from_millis(300));
    drop(child.stdin.take());

    // wait_with_output drains stdout while waiting, so a large dump cannot
    // deadlock against a full pipe.
    let output = child.wait_with_output().expect("wait_with_output failed");
    // The dump may legitimately be empty (e.g. a bare network namespace),
    // but whatever was written must be protocol records.
    if let Some(&cmd) = output.stdout.first() {
        assert!(
            cmd == CMD_ROUTE_ADD || cmd == CMD_ROUTE_DEL || cmd == CMD_ERROR,
            "stream does not start with a valid command code: {}",
            cmd
        );
    }
}

#[test]
fn rtwatch_reports_fatal_setup_errors_as_one_error_record() {
    // This is the flip side of the netlink check the other tests skip on:
    // when the channel cannot be opened, the binary must exit 1 with exactly
    // one error record on stdout. When the channel opens fine we cannot force
    // a setup failure from out here; the record rendering is then covered by
    // the unit tests in src/proto.rs and src/lib.rs.
    if netlink_available() {
        return;
    }
    let child = spawn_rtwatch();

    // wait_with_output closes our end of stdin and drains stdout.
    let output = child.wait_with_output().expect("wait_with_output failed");
    assert_eq!(output.status.code(), Some(1), "fatal setup must exit 1");

    let stdout = &output.stdout;
    assert!(stdout.len() >= 2, "expected an error record, got {:?}", stdout);
    assert_eq!(stdout[0], CMD_ERROR);
    let msg_len = stdout[1] as usize;
    assert!(msg_len > 0, "error record must carry a message");
    assert_eq!(
        stdout.len(),
        2 + msg_len,
        "stdout must be exactly one error record"
    );
}
