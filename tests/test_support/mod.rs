#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolsyncd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolsyncd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

/// Like `request`, but the call must succeed; returns the result payload.
pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result payload")
}

/// Open a fresh workspace and seed the standard fixture: subjects MATH101
/// and ENG101, curriculum CURR-like (grade 11, STEM) carrying both, and one
/// unlinked section. Returns (sectionId, curriculumId).
pub fn seed_stem_fixture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    auto_link: bool,
) -> (String, String) {
    let _ = request_ok(
        stdin,
        reader,
        "seed-setup",
        "setup.update",
        json!({ "section": "sync", "patch": { "autoLinkCurriculums": auto_link } }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-math",
        "subjects.create",
        json!({
            "code": "MATH101",
            "name": "General Mathematics",
            "type": "core",
            "teacherId": "T-9",
            "roomNumber": "R204",
            "status": "active"
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-eng",
        "subjects.create",
        json!({
            "code": "ENG101",
            "name": "Oral Communication",
            "type": "core",
            "status": "active"
        }),
    );
    let created = request_ok(
        stdin,
        reader,
        "seed-curr",
        "curriculums.create",
        json!({
            "gradeLevel": 11,
            "strand": "STEM",
            "subjects": ["MATH101", "ENG101"],
            "status": "active"
        }),
    );
    let curriculum_id = created
        .get("curriculumId")
        .and_then(|v| v.as_str())
        .expect("curriculumId")
        .to_string();

    let created = request_ok(
        stdin,
        reader,
        "seed-sec",
        "sections.create",
        json!({
            "gradeLevel": 11,
            "strand": "STEM",
            "sectionNumber": 1,
            "status": "active"
        }),
    );
    let section_id = created
        .get("sectionId")
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();

    (section_id, curriculum_id)
}

pub fn class_keys(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> Vec<String> {
    let listed = request_ok(stdin, reader, id, "classes.list", json!({}));
    listed
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes array")
        .iter()
        .map(|c| c.get("key").and_then(|v| v.as_str()).expect("key").to_string())
        .collect()
}

pub fn counters(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> serde_json::Value {
    let status = request_ok(stdin, reader, id, "sync.status", json!({}));
    status.get("counters").cloned().expect("counters")
}
