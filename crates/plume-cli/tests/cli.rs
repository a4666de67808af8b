//! End-to-end tests for the `plume` binary

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

const POLICY: &str = r#"
global { let limit = 1; }
session { let hits = 0; }

request when $.user == "ann" {
    hits += 1;
    status => 200 if hits <= limit else 429;
    "welcome " + $.user + " from " + client_ip
}

request { status => 403; }

config {
    server "edge" {
        @default
        listen => 8080;
    }
}
"#;

fn plume(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_plume"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn source_file(source: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".pl").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn path(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_check_reports_counts() {
    let file = source_file(POLICY);
    let output = plume(&["check", path(&file)]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        format!("ok: {} (2 rules, 0 functions, 0 iterators)\n", path(&file))
    );
}

#[test]
fn test_check_fails_with_a_located_error() {
    let file = source_file("main {\n  let = 1;\n}");
    let output = plume(&["check", path(&file)]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(
        err.contains(&format!("{}:2:7: unexpected '=', expected identifier", path(&file))),
        "{err}"
    );
    assert!(err.contains(" 2 |   let = 1;"), "{err}");
}

#[test]
fn test_run_dispatches_with_context_and_vars() {
    let file = source_file(POLICY);
    let output = plume(&[
        "run",
        path(&file),
        "--event",
        "request",
        "--context",
        r#"{"user": "ann"}"#,
        "--var",
        "client_ip=10.0.0.1",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "status => 200\n\"welcome ann from 10.0.0.1\"\n"
    );
}

#[test]
fn test_run_falls_through_to_later_rules() {
    let file = source_file(POLICY);
    let output = plume(&["run", path(&file), "-e", "request", "-x", r#"{"user": "eve"}"#]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "status => 403\n");
}

#[test]
fn test_run_reports_unmatched_events() {
    let file = source_file(POLICY);
    let output = plume(&["run", path(&file), "--event", "unknown"]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("no rule matched event 'unknown'"));
}

#[test]
fn test_run_with_settings_and_config_phase() {
    let file = source_file(POLICY);
    let mut settings = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(settings, "[vars]\nclient_ip = \"192.168.1.5\"").unwrap();
    let output = plume(&[
        "run",
        path(&file),
        "--event",
        "request",
        "--context",
        r#"{"user": "ann"}"#,
        "--config",
        path(&settings),
        "--emit-config",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        concat!(
            "server \"edge\" {\n",
            "    @default listen => 8080;\n",
            "}\n",
            "status => 200\n",
            "\"welcome ann from 192.168.1.5\"\n",
        )
    );
}

#[test]
fn test_run_enforces_frame_limits() {
    let file = source_file("fn down(n) { down(n + 1) }\nmain { down(0) }");
    let output = plume(&["run", path(&file), "--max-frames", "32"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("stack overflow"), "{}", stderr(&output));
}

#[test]
fn test_runtime_errors_include_the_trace() {
    let file = source_file("main {\n  error(\"denied\")\n}");
    let output = plume(&["run", path(&file)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Runtime error: denied\n  at main (line 2)"));
}

#[test]
fn test_eval_prints_the_value() {
    let output = plume(&["eval", "[1, 2, 3].map(fn (x) { x * x })"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "[1, 4, 9]\n");

    let output = plume(&["eval", r#"str::upper("plume")"#]);
    assert_eq!(stdout(&output), "\"PLUME\"\n");
}

#[test]
fn test_disasm_lists_programs() {
    let file = source_file("fn add(a, b) { a + b }\nmain { add(1, 2) }");
    let output = plume(&["disasm", path(&file)]);
    assert!(output.status.success(), "{}", stderr(&output));
    let listing = stdout(&output);
    assert!(listing.contains("add (arity 2"), "{listing}");
    assert!(listing.contains("main (arity 0"), "{listing}");
}

#[test]
fn test_missing_files_are_reported() {
    let output = plume(&["check", "does/not/exist.pl"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read file 'does/not/exist.pl'"));
    assert!(!Path::new("does/not/exist.pl").exists());
}
