use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_script(dir: &TempDir, source: &str) -> std::path::PathBuf {
    let path = dir.path().join("main.sbl");
    fs::write(&path, source).unwrap();
    path
}

fn sable(args: &[&str], script: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sable"))
        .args(args)
        .arg(script)
        .output()
        .expect("failed to execute sable")
}

fn run_sable(source: &str, flags: &[&str]) -> (String, String, bool) {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, source);
    let mut args = vec!["run"];
    args.extend_from_slice(flags);
    let output = sable(&args, &script);

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn assert_success(source: &str) -> String {
    let (stdout, stderr, success) = run_sable(source, &[]);
    assert!(success, "program should succeed, stderr:\n{}", stderr);
    stdout
}

fn assert_failure(source: &str) -> String {
    let (_, stderr, success) = run_sable(source, &[]);
    assert!(!success, "program should fail");
    stderr
}

#[test]
fn test_arithmetic() {
    let stdout = assert_success("x = 10 + 20 * 2\nprint(x)\nprint(x / 7, x - 60)\n");
    assert_eq!(stdout, "50\n7 -10\n");
}

#[test]
fn test_final_value_is_not_printed() {
    let stdout = assert_success("1 + 2\n");
    assert_eq!(stdout, "");
}

#[test]
fn test_shared_box_between_closures() {
    let source = r#"
fn make() {
  n = 0
  fn inc() { n = n + 1 }
  fn get() { n }
  list(inc, get)
}
pair = make()
inc = head(pair)
get = nth(pair, 1)
inc()
inc()
print(get())
"#;
    assert_eq!(assert_success(source), "2\n");
}

#[test]
fn test_effect_resume() {
    let source = r#"
fn greet() { print("hello " + do name()) }
try { greet() } handle name(_) { resume("sable") }
"#;
    assert_eq!(assert_success(source), "hello sable\n");
}

#[test]
fn test_runtime_error_trace() {
    let stderr = assert_failure("fn f() {\n  1 + nil\n}\nf()\n");
    let message = "error: TypeError: cannot add int and nil";
    let trace = "  at f (line 2)\n  at <script> (line 4)";
    assert!(stderr.contains(message), "{}", stderr);
    assert!(stderr.contains(trace), "{}", stderr);
}

#[test]
fn test_unhandled_effect_exit_code() {
    let (_, stderr, success) = run_sable("do boom()\n", &[]);
    assert!(!success);
    assert!(stderr.contains("unhandled effect 'boom'"));
}

#[test]
fn test_frame_overflow_is_host_fault() {
    let stderr = assert_failure("fn loop(n) { loop(n + 1) }\nloop(0)\n");
    let message = "host fault: call depth exceeded 256 frames";
    assert!(stderr.contains(message), "{}", stderr);
}

const COUNTDOWN: &str = "fn down(n) { if n == 0 { 0 } else { down(n - 1) } }\n";

#[test]
fn test_config_file_next_to_script() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sable.toml"), "max_frames = 4\n").unwrap();
    let script = write_script(&dir, &format!("{}down(10)\n", COUNTDOWN));
    let output = sable(&["run"], &script);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = "call depth exceeded 4 frames";
    assert!(stderr.contains(message), "{}", stderr);
}

#[test]
fn test_explicit_config_overrides_discovery() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sable.toml"), "max_frames = 4\n").unwrap();
    let custom = dir.path().join("custom.toml");
    fs::write(&custom, "max_frames = 64\n").unwrap();
    let script = write_script(&dir, &format!("{}print(down(10))\n", COUNTDOWN));
    let output = sable(&["run", "--config", custom.to_str().unwrap()], &script);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "0\n");
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sable.toml"), "max_frames = \"many\"\n").unwrap();
    let script = write_script(&dir, "print(1)\n");
    let output = sable(&["run"], &script);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config error"));
}

#[test]
fn test_dump_bytecode_to_file() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "print(1)\n");
    let dump = dir.path().join("out.txt");
    let flag = format!("--dump-bytecode={}", dump.display());
    let output = sable(&["run", &flag], &script);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1\n");
    let listing = fs::read_to_string(&dump).unwrap();
    assert!(listing.starts_with("== <script> ==\n"));
    assert!(listing.contains("CALL             1"));
}

#[test]
fn test_dump_bytecode_to_stderr() {
    let (stdout, stderr, success) = run_sable("print(1)\n", &["--dump-bytecode"]);
    assert!(success);
    assert_eq!(stdout, "1\n");
    assert!(stderr.contains("== <script> =="));
}

#[test]
fn test_timings_json() {
    let (_, stderr, success) = run_sable("print(1)\n", &["--timings=json"]);
    assert!(success);
    let line = stderr.lines().last().unwrap();
    let json: serde_json::Value = serde_json::from_str(line).unwrap();
    assert!(json["total_ms"].is_number());
}

#[test]
fn test_timings_human() {
    let (_, stderr, success) = run_sable("print(1)\n", &["--timings"]);
    assert!(success);
    assert!(stderr.contains("compile:"));
}

#[test]
fn test_trace_flag_logs_to_stderr() {
    let (stdout, stderr, success) = run_sable("fn f() { 1 }\nprint(f())\n", &["--trace"]);
    assert!(success);
    assert_eq!(stdout, "1\n");
    assert!(stderr.contains("compiled function"), "{}", stderr);
}

#[test]
fn test_disasm_command() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "x = 1\n");
    let output = sable(&["disasm"], &script);
    assert!(output.status.success());
    let expected = "\
== <script> ==
0000    1 LOAD_CONST       0 '1'
0002    | STORE_GLOBAL     0 'x'
0004    | NIL
0005    | RETURN
";
    assert_eq!(String::from_utf8_lossy(&output.stdout), expected);
}

#[test]
fn test_missing_file() {
    let output = sable(&["run"], Path::new("/nonexistent/nope.sbl"));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}
