use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_scalebench")
}

fn isolated() -> Command {
    let mut command = Command::new(bin());
    command
        .current_dir(std::env::temp_dir())
        .env_remove("SCALEBENCH_CONFIG")
        .env_remove("SCALEBENCH_RESOURCES");
    command
}

#[test]
fn unknown_command_prints_usage() {
    let output = isolated().arg("bogus").output().expect("scalebench should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: scalebench"));
}

#[test]
fn exec_command_returns_usage_without_resource_count() {
    let output = isolated()
        .args(["exec", "threads"])
        .output()
        .expect("exec should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: scalebench exec"));
}

#[test]
fn probe_command_dispatches_and_emits_json() {
    let output = isolated()
        .args(["probe", "5", "2", "local"])
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(&stdout).expect("probe should emit json");
    let reports = payload.as_array().expect("probe should emit an array");
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[3]["token"], 3);
}

#[test]
fn probe_command_rejects_unknown_mode() {
    let output = isolated()
        .args(["probe", "2", "2", "cluster"])
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn worker_command_answers_requests_on_stdout() {
    use std::io::Write;
    use std::process::Stdio;

    let mut child = isolated()
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("worker should start");
    {
        let mut stdin = child.stdin.take().expect("piped stdin");
        writeln!(stdin, r#"{{"task":"probe","index":4,"input":{{"token":9}}}}"#)
            .expect("request should be written");
    }
    let output = child.wait_with_output().expect("worker should exit");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reply: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("worker should emit one json reply");
    assert_eq!(reply["status"], "done");
    assert_eq!(reply["index"], 4);
    assert_eq!(reply["output"]["token"], 9);
}
