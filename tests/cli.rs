use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn sharpling() -> Command {
    Command::cargo_bin("sharpling").expect("binary exists")
}

#[test]
fn run_demo_with_scripted_input() {
    let mut cmd = sharpling();
    cmd.arg("run")
        .arg("demos/loops.cs")
        .arg("--input")
        .arg("demos/loops.input");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("The square of 3 is 9"))
        .stdout(predicate::str::contains("The factorial of 5 is 120"));
}

#[test]
fn run_reads_stdin_by_default() {
    let mut cmd = sharpling();
    cmd.arg("run").arg("demos/loops.cs").write_stdin("0\n4\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("The factorial of 4 is 24"));
}

#[test]
fn run_top_level_program() {
    let mut cmd = sharpling();
    cmd.arg("run").arg("demos/grades.cs");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Ben     95 A"))
        .stdout(predicate::str::contains("Average: 78.25"))
        .stdout(predicate::str::contains("Best: 95"));
}

#[test]
fn eval_snippet() {
    let mut cmd = sharpling();
    cmd.arg("eval").arg("int x = 1 + 2; Console.WriteLine(x);");
    cmd.assert().success().stdout("3\n");
}

#[test]
fn eval_honours_call_depth_flag() {
    let mut cmd = sharpling();
    cmd.arg("eval")
        .arg("--max-call-depth")
        .arg("2")
        .arg("static void Down(int n) { if (n > 0) { Down(n - 1); } } Down(5); Console.WriteLine(\"end\");");
    cmd.assert()
        .stdout(predicate::str::contains("call depth limit of 2 exceeded"))
        .stdout(predicate::str::contains("end"));
}

#[test]
fn malformed_for_header_fails() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("broken.cs");
    fs::write(
        &path,
        "Console.WriteLine(\"before\");\nfor (int i = 0; i < 3) { }\nConsole.WriteLine(\"after\");\n",
    )
    .expect("write program");

    let mut cmd = sharpling();
    cmd.arg("run").arg(&path);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("before"))
        .stdout(predicate::str::contains("after").not());
}

#[test]
fn program_without_entry_point_fails() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("empty.cs");
    fs::write(&path, "class Empty { static void Helper() { } }\n").expect("write program");

    let mut cmd = sharpling();
    cmd.arg("run").arg(&path);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("MissingEntryPoint"));
}

#[test]
fn missing_file_fails() {
    let mut cmd = sharpling();
    cmd.arg("run").arg("demos/does-not-exist.cs");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
}
