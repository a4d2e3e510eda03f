use std::{
    io::Write,
    net::TcpStream,
    process::Command,
    thread::sleep,
    time::{Duration, Instant},
};

use assert_cmd::prelude::*;
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};

/// Waits until something is listening on `addr`, or panics after 5 seconds.
fn wait_for_tcp(addr: &str) {
    let started = Instant::now();
    while TcpStream::connect(addr).is_err() {
        if started.elapsed() > Duration::from_secs(5) {
            panic!("server did not start listening on {addr}");
        }
        sleep(Duration::from_millis(20));
    }
}

#[test]
fn sigterm_produces_timely_clean_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("history.data");
    let port = portpicker::pick_unused_port().expect("no free ports");
    let addr = format!("127.0.0.1:{port}");

    let mut cmd = Command::cargo_bin("backlogd").unwrap();
    cmd.env("BACKLOGD_ADDRESS", &addr)
        .env("BACKLOGD_DATA_PATH", &data_path);
    let mut server = cmd.spawn().unwrap();

    wait_for_tcp(&addr);
    assert!(data_path.exists());

    // Leave a client mid-send so a worker is parked on a socket read when
    // the signal lands.
    let mut stalled = TcpStream::connect(&addr).unwrap();
    stalled.write_all(b"mid-send without newline").unwrap();

    kill(Pid::from_raw(server.id() as i32), Signal::SIGTERM).unwrap();

    // Time the shutdown.
    let now = Instant::now();
    let status = server.wait().unwrap();

    assert!(status.success());
    assert!(now.elapsed() < Duration::from_secs(3));
    // The file backend unlinks its file on clean exit.
    assert!(!data_path.exists());
}

#[test]
fn sigint_also_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("history.data");
    let port = portpicker::pick_unused_port().expect("no free ports");
    let addr = format!("127.0.0.1:{port}");

    let mut cmd = Command::cargo_bin("backlogd").unwrap();
    cmd.env("BACKLOGD_ADDRESS", &addr)
        .env("BACKLOGD_DATA_PATH", &data_path);
    let mut server = cmd.spawn().unwrap();

    wait_for_tcp(&addr);
    kill(Pid::from_raw(server.id() as i32), Signal::SIGINT).unwrap();

    assert!(server.wait().unwrap().success());
    assert!(!data_path.exists());
}

#[test]
fn rejects_extra_arguments() {
    let mut cmd = Command::cargo_bin("backlogd").unwrap();
    let output = cmd.arg("--no-such-flag").output().unwrap();

    assert!(!output.status.success());
}
