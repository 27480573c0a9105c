#![cfg(all(unix, feature = "cli"))]

use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral port should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    addr.to_string()
}

fn hermes() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hermes"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        match child.try_wait().expect("child status should be readable") {
            Some(_) => return child.wait_with_output().expect("child output should be readable"),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                panic!("child did not exit within {timeout:?}");
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    }
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn master_inspects_and_updates_a_slave() {
    let addr = free_addr();

    let master = hermes()
        .args(["--format", "json", "master", addr.as_str()])
        .args(["--set", "Level=uint:7", "--disconnect", "--count", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("master should start");

    let slave = hermes()
        .args(["--format", "json", "slave", addr.as_str()])
        .args(["--prop", "Model=string:Widget", "--prop", "Level=uint:3"])
        .args(["--serial", "00000000cafe0001", "--connect-timeout", "5s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("slave should start");

    let slave_out = wait_with_timeout(slave, Duration::from_secs(10));
    let master_out = wait_with_timeout(master, Duration::from_secs(10));
    assert!(
        master_out.status.success(),
        "master failed: {}",
        String::from_utf8_lossy(&master_out.stderr)
    );
    assert!(
        slave_out.status.success(),
        "slave failed: {}",
        String::from_utf8_lossy(&slave_out.stderr)
    );

    let reports = json_lines(&master_out);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report["role"], "master");
    assert_eq!(report["serial"], "00000000cafe0001");
    assert_eq!(report["properties"][0]["name"], "Model");
    assert_eq!(report["properties"][0]["value"], "Widget");
    assert_eq!(report["properties"][1]["type"], "uint");
    assert_eq!(report["properties"][1]["value"], "3");
    assert_eq!(report["updates"][0]["name"], "Level");
    assert_eq!(report["updates"][0]["value"], "7");

    let finals = json_lines(&slave_out);
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0]["role"], "slave");
    assert_eq!(finals[0]["properties"][1]["value"], "7");
}

#[test]
fn slave_outside_allow_list_exits_50() {
    let addr = free_addr();

    let mut master = hermes()
        .args(["master", addr.as_str(), "--allow", "0000000000000001"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("master should start");

    let slave = hermes()
        .args(["slave", addr.as_str(), "--serial", "0102030405060708"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("slave should start");

    let output = wait_with_timeout(slave, Duration::from_secs(10));
    let _ = master.kill();
    let _ = master.wait();

    assert_eq!(output.status.code(), Some(50));
    assert!(String::from_utf8_lossy(&output.stderr).contains("rejected"));
}

#[test]
fn unreachable_master_is_a_failure() {
    let addr = free_addr();

    let output = hermes()
        .args(["slave", addr.as_str(), "--connect-timeout", "200ms"])
        .output()
        .expect("slave should run");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn malformed_property_exits_64() {
    let output = hermes()
        .args(["slave", "127.0.0.1:1", "--prop", "Level=uint:minus-one"])
        .output()
        .expect("slave should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid uint value"));
}

#[test]
fn property_wider_than_the_record_exits_64() {
    let prop = format!("Label=string:{}", "x".repeat(65));
    let output = hermes()
        .args(["slave", "127.0.0.1:1", "--prop", prop.as_str()])
        .output()
        .expect("slave should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("too long for the record"));
}

#[test]
fn version_names_the_binary() {
    let output = hermes().arg("version").output().expect("version should run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("hermes "));
}
