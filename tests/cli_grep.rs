//! End-to-end tests: run the `jot` binary and check output and exit codes.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn jot(args: &[&str], input: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_jot"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn jot");
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().expect("failed to wait on jot")
}

/// Run jot, assert success, return stdout.
fn jot_ok(args: &[&str], input: &[u8]) -> String {
    let output = jot(args, input);
    assert!(
        output.status.success(),
        "jot {:?} exited with {}: stderr={}",
        args,
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("jot output was not valid UTF-8")
}

/// Run jot, return (exit_code, stdout, stderr).
fn jot_result(args: &[&str], input: &[u8]) -> (i32, String, String) {
    let output = jot(args, input);
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

struct TempFile(PathBuf);

impl TempFile {
    fn create(name: &str, bytes: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!(
            "jot-e2e-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, bytes).unwrap();
        TempFile(path)
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Encode JSON lines through `jot enc` into a temp file. The input goes via
/// a file rather than a pipe so multi-megabyte fixtures cannot deadlock on
/// pipe buffers.
fn encoded_file(name: &str, jsonl: &str) -> TempFile {
    let input = TempFile::create(&format!("{name}.in"), jsonl.as_bytes());
    let output = Command::new(env!("CARGO_BIN_EXE_jot"))
        .args(["enc", input.path()])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run jot enc");
    assert!(
        output.status.success(),
        "enc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!output.stdout.is_empty());
    TempFile::create(name, &output.stdout)
}

fn int_records() -> String {
    (0..10)
        .map(|i| format!("{{\"n\":{i}}}\n"))
        .collect::<String>()
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

#[test]
fn grep_integer_equality_on_stdin() {
    let out = jot_ok(&["grep", "--key", "n", "--int", "5"], int_records().as_bytes());
    assert_eq!(out, "{\"n\":5}\n");
}

#[test]
fn grep_integer_equality_on_binary_file() {
    let file = encoded_file("int-eq.jot", &int_records());
    let out = jot_ok(&["grep", "--key", "n", "--int", "5", file.path()], b"");
    assert_eq!(out, "{\"n\":5}\n");
}

#[test]
fn grep_count_mode() {
    let out = jot_ok(
        &["grep", "--key", "n", "--int", "5", "--count"],
        int_records().as_bytes(),
    );
    assert_eq!(out, "1\n");
}

#[test]
fn grep_substring() {
    let input = "{\"msg\":\"abcdef\"}\n{\"msg\":\"xyz\"}\n{\"msg\":\"def\"}\n";
    let out = jot_ok(&["grep", "--string", "de"], input.as_bytes());
    assert_eq!(out, "{\"msg\":\"abcdef\"}\n{\"msg\":\"def\"}\n");
    let count = jot_ok(&["grep", "--string", "de", "--count"], input.as_bytes());
    assert_eq!(count, "2\n");
}

#[test]
fn grep_full_match() {
    let input = "{\"msg\":\"abcdef\"}\n{\"msg\":\"def\"}\n";
    let out = jot_ok(&["grep", "--string", "def", "--full-match"], input.as_bytes());
    assert_eq!(out, "{\"msg\":\"def\"}\n");
}

#[test]
fn grep_context_window() {
    let out = jot_ok(
        &["grep", "--int", "5", "-B", "2", "-A", "1"],
        int_records().as_bytes(),
    );
    assert_eq!(out, "{\"n\":3}\n{\"n\":4}\n{\"n\":5}\n{\"n\":6}\n");
}

#[test]
fn grep_context_shorthand() {
    let out = jot_ok(&["grep", "--int", "5", "-C", "1"], int_records().as_bytes());
    assert_eq!(out, "{\"n\":4}\n{\"n\":5}\n{\"n\":6}\n");
}

#[test]
fn grep_context_on_binary_file() {
    let file = encoded_file("ctx.jot", &int_records());
    let out = jot_ok(&["grep", "--int", "5", "-B", "2", "-A", "1", file.path()], b"");
    assert_eq!(out, "{\"n\":3}\n{\"n\":4}\n{\"n\":5}\n{\"n\":6}\n");
}

#[test]
fn grep_max_count() {
    let input = "{\"n\":5}\n".repeat(10);
    let out = jot_ok(&["grep", "--int", "5", "-m", "3"], input.as_bytes());
    assert_eq!(out, "{\"n\":5}\n".repeat(3));
}

#[test]
fn grep_key_gating() {
    let input = "{\"m\":5}\n{\"n\":5}\n{\"deep\":{\"n\":5}}\n{\"n\":[5]}\n";
    let out = jot_ok(&["grep", "--key", "n", "--int", "5"], input.as_bytes());
    assert_eq!(
        out,
        "{\"n\":5}\n{\"deep\":{\"n\":5}}\n{\"n\":[5]}\n"
    );
}

#[test]
fn grep_atom() {
    let input = "{\"a\":null}\n{\"a\":true}\n{\"a\":false}\n";
    let out = jot_ok(&["grep", "--atom", "true"], input.as_bytes());
    assert_eq!(out, "{\"a\":true}\n");
}

#[test]
fn grep_time_interval_on_jsonl() {
    let input = "\
{\"ts\":\"2024-06-01T11:59:59Z\"}\n\
{\"ts\":\"2024-06-01T12:00:00Z\"}\n\
{\"ts\":\"2024-06-01T12:00:30Z\"}\n\
{\"ts\":\"2024-06-01T12:01:00Z\"}\n";
    let out = jot_ok(
        &["grep", "--time", "2024-06-01T12:00:00Z..2024-06-01T12:01:00Z"],
        input.as_bytes(),
    );
    assert_eq!(
        out,
        "{\"ts\":\"2024-06-01T12:00:00Z\"}\n{\"ts\":\"2024-06-01T12:00:30Z\"}\n"
    );
}

#[test]
fn grep_time_on_binary_native_timestamps() {
    let input = "\
{\"ts\":\"2024-06-01T11:59:59Z\"}\n\
{\"ts\":\"2024-06-01T12:00:00Z\"}\n\
{\"ts\":\"2024-06-01T12:00:01Z\"}\n";
    let file = encoded_file("times.jot", input);
    // Single-instant spec covers one second, half-open.
    let out = jot_ok(
        &["grep", "--time", "2024-06-01T12:00:00Z", file.path()],
        b"",
    );
    assert_eq!(out, "{\"ts\":\"2024-06-01T12:00:00Z\"}\n");
}

#[test]
fn count_equals_number_of_emitted_records() {
    let mut input = String::new();
    for i in 0..100 {
        input.push_str(&format!("{{\"n\":{}}}\n", i % 7));
    }
    let full = jot_ok(&["grep", "--key", "n", "--int", "3"], input.as_bytes());
    let count = jot_ok(
        &["grep", "--key", "n", "--int", "3", "--count"],
        input.as_bytes(),
    );
    assert_eq!(count.trim().parse::<usize>().unwrap(), full.lines().count());
}

#[test]
fn zero_matches_exits_zero() {
    let (code, stdout, _stderr) = jot_result(
        &["grep", "--int", "999"],
        int_records().as_bytes(),
    );
    assert_eq!(code, 0);
    assert_eq!(stdout, "");
}

#[test]
fn parse_error_exits_nonzero() {
    let (code, _stdout, stderr) = jot_result(
        &["grep", "--int", "999"],
        b"{\"n\":1}\nthis is not json\n",
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("grep failed"), "stderr: {stderr}");
}

#[test]
fn missing_value_pattern_is_a_usage_error() {
    let (code, _stdout, stderr) = jot_result(&["grep", "--key", "n"], b"");
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());
}

// ---------------------------------------------------------------------------
// Bisect
// ---------------------------------------------------------------------------

fn sorted_records(n: usize) -> String {
    (0..n)
        .map(|i| format!("{{\"n\":{i},\"tag\":\"r{i}\"}}\n"))
        .collect()
}

#[test]
fn bisect_matches_scan_on_sorted_binary_file() {
    let file = encoded_file("sorted.jot", &sorted_records(50_000));
    for target in ["0", "25000", "49999"] {
        let scan = jot_ok(&["grep", "--key", "n", "--int", target, file.path()], b"");
        let bisect = jot_ok(
            &["grep", "--key", "n", "--int", target, "--bisect", file.path()],
            b"",
        );
        assert_eq!(bisect, scan, "target {target}");
        assert!(!scan.is_empty());
    }
}

#[test]
fn bisect_matches_scan_on_sorted_jsonl_file() {
    let text = sorted_records(60_000);
    let file = TempFile::create("sorted.jsonl", text.as_bytes());
    let scan = jot_ok(&["grep", "--key", "n", "--int", "44444", file.path()], b"");
    let bisect = jot_ok(
        &["grep", "--key", "n", "--int", "44444", "--bisect", file.path()],
        b"",
    );
    assert_eq!(bisect, scan);
    assert_eq!(scan, "{\"n\":44444,\"tag\":\"r44444\"}\n");
}

#[test]
fn bisect_miss_exits_zero() {
    let file = encoded_file("sorted-miss.jot", &sorted_records(50_000));
    let (code, stdout, _stderr) = jot_result(
        &["grep", "--key", "n", "--int", "123456789", "--bisect", file.path()],
        b"",
    );
    assert_eq!(code, 0);
    assert_eq!(stdout, "");
}

#[test]
fn bisect_on_stdin_is_rejected() {
    let (code, _stdout, stderr) = jot_result(
        &["grep", "--int", "1", "--bisect"],
        b"{\"n\":1}\n",
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("seekable"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// cat / enc / stats
// ---------------------------------------------------------------------------

#[test]
fn enc_then_cat_round_trips() {
    let input = "{\"n\":0,\"msg\":\"zero\"}\n{\"n\":1,\"msg\":\"one\"}\n[1,2.5,null]\n";
    let file = encoded_file("roundtrip.jot", input);
    let out = jot_ok(&["cat", file.path()], b"");
    assert_eq!(out, input);
}

#[test]
fn cat_echoes_jsonl() {
    let input = "{\"a\":1}\n{\"b\":2}\n";
    let out = jot_ok(&["cat"], input.as_bytes());
    assert_eq!(out, input);
}

#[test]
fn cat_binary_from_stdin() {
    let encoded = jot(&["enc"], b"{\"n\":1}\n");
    assert!(encoded.status.success());
    let out = jot_ok(&["cat"], &encoded.stdout);
    assert_eq!(out, "{\"n\":1}\n");
}

#[test]
fn grep_reads_binary_on_stdin() {
    let encoded = jot(&["enc"], int_records().as_bytes());
    assert!(encoded.status.success());
    let out = jot_ok(&["grep", "--key", "n", "--int", "7"], &encoded.stdout);
    assert_eq!(out, "{\"n\":7}\n");
}

#[test]
fn stats_reports_record_counts() {
    let file = encoded_file("stats.jot", &int_records());
    let out = jot_ok(&["stats", file.path()], b"");
    assert!(out.contains("value"), "out: {out}");
    assert!(out.contains("10"), "out: {out}");
}

#[test]
fn stats_rejects_jsonl() {
    let file = TempFile::create("stats.jsonl", b"{\"a\":1}\n");
    let (code, _stdout, stderr) = jot_result(&["stats", file.path()], b"");
    assert_ne!(code, 0);
    assert!(stderr.contains("not a jot binary"), "stderr: {stderr}");
}

#[test]
fn emitted_records_are_valid_json() {
    let input = "{\"n\":0,\"msg\":\"a b\\\"c\"}\n{\"n\":1,\"ts\":\"2024-06-01T12:00:00Z\"}\n";
    let file = encoded_file("valid.jot", input);
    let out = jot_ok(&["cat", file.path()], b"");
    let values: Vec<serde_json::Value> = out
        .lines()
        .map(|line| serde_json::from_str(line).expect("cat emitted invalid JSON"))
        .collect();
    let expected: Vec<serde_json::Value> = input
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(values, expected);
}

#[test]
fn unknown_subcommand_is_rejected() {
    let (code, _stdout, stderr) = jot_result(&["frobnicate"], b"");
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());
}
