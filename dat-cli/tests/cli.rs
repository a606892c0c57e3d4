use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};

fn dat() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dat"));
    command.env_remove("RUST_LOG").env_remove("DAT_SETTINGS");
    command
}

fn stdout_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout carries only JSON lines"))
        .collect()
}

fn connection(id: &str, out_dir: &Path, count: u64) -> Value {
    json!({
        "id": id,
        "name": "numbers to files",
        "source": {
            "module_name": "sequence",
            "name": "Counter",
            "connection_specification": { "count": count, "stream": "numbers" }
        },
        "generator": { "module_name": "transform", "name": "Passthrough" },
        "destination": {
            "module_name": "file",
            "name": "JsonLines",
            "connection_specification": { "dir": out_dir }
        },
        "catalog": { "document_streams": [{ "name": "numbers" }] }
    })
}

fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, value.to_string()).unwrap();
}

#[test]
fn orchestrate_with_stage_processes() {
    let tmp = tempfile::tempdir().unwrap();
    let out_dir = tmp.path().join("out");
    let connection_path = tmp.path().join("connection.json");
    write_json(&connection_path, &connection("conn-p", &out_dir, 5));

    let output = dat()
        .args(["-q", "orchestrate", "--stages", "processes", "--batch-size", "2"])
        .arg("--connection")
        .arg(&connection_path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let acks: Vec<String> = stdout_lines(&output)
        .iter()
        .map(|m| m["log"]["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        acks,
        vec![
            "wrote 2 records to numbers",
            "wrote 2 records to numbers",
            "wrote 1 records to numbers",
        ]
    );
    let written = std::fs::read_to_string(out_dir.join("numbers.jsonl")).unwrap();
    assert_eq!(written.lines().count(), 5);
}

#[test]
fn orchestrate_in_process_matches_stage_processes() {
    let tmp = tempfile::tempdir().unwrap();
    let out_dir = tmp.path().join("out");
    let connection_path = tmp.path().join("connection.json");
    write_json(&connection_path, &connection("conn-i", &out_dir, 5));

    let output = dat()
        .args(["-q", "orchestrate", "--batch-size", "2"])
        .arg("--connection")
        .arg(&connection_path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output).len(), 3);
}

#[test]
fn generate_filters_stdin() {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("generator.json");
    write_json(
        &config_path,
        &json!({
            "module_name": "transform",
            "name": "SelectFields",
            "connection_specification": { "fields": ["name"] }
        }),
    );

    let mut child = dat()
        .args(["-q", "generate", "--config"])
        .arg(&config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        let record = json!({
            "type": "RECORD",
            "record": { "stream": { "name": "people" }, "data": { "name": "ada", "age": 36 } }
        });
        writeln!(stdin, "{record}").unwrap();
        writeln!(stdin, "not json").unwrap();
    }
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["record"]["data"], json!({ "name": "ada" }));
}

#[test]
fn missing_plugin_exits_with_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("source.json");
    write_json(&config_path, &json!({ "module_name": "nope", "name": "Missing" }));

    let output = dat()
        .args(["-q", "discover", "--config"])
        .arg(&config_path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to resolve source"));
}

#[test]
fn supervise_runs_orchestrate_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    let settings_path = tmp.path().join("dat.toml");
    std::fs::write(&settings_path, "[telemetry]\nkind = \"none\"\n").unwrap();

    let first = tmp.path().join("first.json");
    let second = tmp.path().join("second.json");
    write_json(&first, &connection("first", &tmp.path().join("a"), 3));
    write_json(&second, &connection("second", &tmp.path().join("b"), 4));

    let output = dat()
        .args(["-q", "supervise"])
        .arg("--settings")
        .arg(&settings_path)
        .arg("--tmp-dir")
        .arg(tmp.path().join("jobs"))
        .arg("--connection")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let count = |dir: &str| {
        std::fs::read_to_string(tmp.path().join(dir).join("numbers.jsonl"))
            .unwrap()
            .lines()
            .count()
    };
    assert_eq!(count("a"), 3);
    assert_eq!(count("b"), 4);
}
