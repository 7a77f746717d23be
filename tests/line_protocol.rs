use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

use model_worker::client::WorkerProcess;
use model_worker::inference::task::classify::{ClassifyRequest, ClassifyResponse, Politeness};
use model_worker::worker::protocol::Reply;

const WORKER: &str = env!("CARGO_BIN_EXE_classify_worker");

/// Feeds `input` to a heuristic classify worker and returns its stdout lines.
fn run_worker(input: &str) -> (bool, Vec<Value>) {
    let mut child = Command::new(WORKER)
        .args(["--classifier-backend", "heuristic", "--device", "cpu"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let lines = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (output.status.success(), lines)
}

#[test]
fn malformed_line_does_not_stop_the_worker() {
    let (success, lines) = run_worker("{not json\n{\"text\": \"Could you please help?\"}\n");
    assert!(success);
    assert_eq!(lines.len(), 2);
    assert!(lines[0]["error"].is_string());
    assert_eq!(lines[1]["label"], "polite");
}

#[test]
fn blank_lines_get_no_reply() {
    let (success, lines) = run_worker("\n   \n{\"text\": \"The bus is late.\"}\n\n");
    assert!(success);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["label"], "neutral");
}

#[test]
fn shutdown_is_the_last_reply() {
    let input = concat!(
        "{\"text\": \"Thank you!\"}\n",
        "{\"cmd\": \"shutdown\"}\n",
        "{\"text\": \"never answered\"}\n",
    );
    let (success, lines) = run_worker(input);
    assert!(success);
    assert_eq!(lines.len(), 2);
    assert!(lines[0]["label"].is_string());
    assert_eq!(lines[1], json!({"ok": true}));
}

#[test]
fn missing_text_is_classified_as_empty() {
    let (_, lines) = run_worker("{}\n{\"text\": \"\"}\n");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], lines[1]);
    assert!(lines[0]["confidence"].as_f64().unwrap() > 0.0);
}

#[test]
fn client_round_trip() {
    let mut worker = WorkerProcess::spawn(
        WORKER,
        ["--classifier-backend", "heuristic", "--device", "cpu"],
    )
    .unwrap();

    let reply: Reply<ClassifyResponse> = worker
        .request(&ClassifyRequest {
            text: "Tell me right now!".into(),
        })
        .unwrap();
    match reply {
        Reply::Success(response) => assert_eq!(response.label, Politeness::Impolite),
        other => panic!("unexpected reply {other:?}"),
    }

    let reply: Reply<ClassifyResponse> = worker.request(&json!(["not", "an", "object"])).unwrap();
    assert!(matches!(reply, Reply::Failure(_)));

    assert!(worker.shutdown().unwrap().success());
}

#[test]
fn startup_failure_exits_without_output() {
    let output = Command::new(WORKER)
        .args(["--classifier-model", "/no/such/checkpoint", "--device", "cpu"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
