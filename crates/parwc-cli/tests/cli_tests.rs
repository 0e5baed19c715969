//! Command-line behaviour of the `parwc` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_input(contents: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "parwc-cli-test-{}-{}.txt",
        std::process::id(),
        id
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

fn cleanup(path: &Path) {
    let _ = std::fs::remove_file(path);
}

fn parwc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_parwc"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run parwc")
}

fn parwc_with_stdin(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_parwc"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run parwc");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Topology runs
// ============================================================================

#[test]
fn counts_words_in_file() {
    let input = temp_input("The cat sat. The cat ran!\n3 dogs ran\n");
    let output = parwc(&[input.to_str().unwrap()]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "  2 cat\n  1 dogs\n  2 ran\n  1 sat\n  2 the\n");
    cleanup(&input);
}

#[test]
fn fan_out_and_system_flags_agree() {
    let text = "One fish, two fish.\nRed fish; blue fish!\n".repeat(50);
    let input = temp_input(&text);
    let path = input.to_str().unwrap();

    let single = parwc(&["--single", path]);
    let wide = parwc(&["-j", "6", path]);
    let system = parwc(&["--system", "--fan-out=3", path]);

    for output in [&single, &wide, &system] {
        assert!(output.status.success(), "stderr: {}", stderr(output));
    }
    assert_eq!(stdout(&single), "   50 blue\n  200 fish\n   50 one\n   50 red\n   50 two\n");
    assert_eq!(stdout(&wide), stdout(&single));
    assert_eq!(stdout(&system), stdout(&single));
    cleanup(&input);
}

#[test]
fn report_goes_to_stderr() {
    let input = temp_input("a b b\n");
    let output = parwc(&["-j3", "--report", input.to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(stdout(&output), "  1 a\n  2 b\n");

    let err = stderr(&output);
    let json_start = err.find('{').expect("no report on stderr");
    let report: serde_json::Value = serde_json::from_str(&err[json_start..]).unwrap();
    assert_eq!(report["fan_out"], 3);
    assert_eq!(report["merge"]["entries"], 2);
    assert_eq!(report["stages"].as_array().unwrap().len(), 21);
    cleanup(&input);
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn unknown_stage_fails_with_empty_stdout() {
    let input = temp_input("words\n");
    let output = parwc(&["--stages=cat,frobnicate", input.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("unknown stage: frobnicate"), "{}", stderr(&output));
    cleanup(&input);
}

#[test]
fn fan_out_zero_is_rejected() {
    let input = temp_input("words\n");
    let output = parwc(&["-j", "0", input.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("fan-out"));
    cleanup(&input);
}

#[test]
fn missing_input_file() {
    let output = parwc(&["/nonexistent/parwc-input.txt"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn no_arguments_is_usage_error() {
    let output = parwc(&[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--help"));
}

#[test]
fn unknown_option() {
    let output = parwc(&["--frobnicate", "x"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown option"));
}

// ============================================================================
// Stage host and helpers
// ============================================================================

#[test]
fn stage_host_runs_one_filter() {
    let output = parwc_with_stdin(&["stage", "lowercase"], "HeLLo World\n");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "hello world\n");
}

#[test]
fn stage_host_rejects_external_and_unknown_names() {
    for name in ["sys-sort", "frobnicate"] {
        let output = parwc_with_stdin(&["stage", name], "");
        assert!(!output.status.success(), "{name} should fail");
        assert!(stderr(&output).contains("not an embedded stage"));
    }
}

#[test]
fn merge_sum_reduces_stdin() {
    let output = parwc_with_stdin(&["merge-sum"], "      2 a\n      9 b\n      3 a\n");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "  5 a\n  9 b\n");
}

#[test]
fn merge_sum_rejects_malformed_records() {
    let output = parwc_with_stdin(&["merge-sum"], "  1 a\nnot a record\n");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("line 2"));
}

#[test]
fn list_stages() {
    let output = parwc(&["--list-stages"]);
    assert!(output.status.success());

    let listing = stdout(&output);
    for name in ["count-runs", "merge-sum", "split-words", "sys-sort", "sys-count-runs"] {
        assert!(listing.contains(name), "{name} missing from:\n{listing}");
    }
}

#[test]
fn version_and_help() {
    let version = parwc(&["-V"]);
    assert!(version.status.success());
    assert!(stdout(&version).starts_with("parwc "));

    let help = parwc(&["--help"]);
    assert!(help.status.success());
    assert!(stdout(&help).contains("--fan-out"));
}
