//! Command-line tests

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;
use tempfile::tempdir;

fn fpc() -> Command {
    let mut cmd = Command::cargo_bin("fpc").expect("fpc binary");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_parse_error_does_not_stop_other_inputs() {
    let dir = tempdir().expect("tempdir");
    let bad = dir.path().join("bad.fp");
    let good = dir.path().join("good.fp");
    fs::write(&bad, "fn f( {").unwrap();
    fs::write(&good, "fn g(x: f32) -> f32 { x * x }").unwrap();
    let out = dir.path().join("out");

    fpc()
        .arg("compile")
        .arg(&bad)
        .arg(&good)
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .stderr(contains("1 translation unit(s) failed to compile"));

    let ir = fs::read_to_string(out.join("good.fir")).expect("good.fir written");
    assert!(ir.contains("define float @g(float %x)"));
    assert!(!out.join("bad.fir").exists());
}

#[test]
fn test_compile_to_stdout() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("mul.fp");
    fs::write(&src, "fn m(a: f32, b: f32) -> f32 { a * b }").unwrap();

    fpc()
        .args(["--eval-method", "double", "compile"])
        .arg(&src)
        .assert()
        .success()
        .stdout(contains("fpext float %a to double").and(contains("fmul double")));
}

#[test]
fn test_check_reports_diagnostics() {
    let dir = tempdir().expect("tempdir");
    let ok = dir.path().join("ok.fp");
    let bad = dir.path().join("pop.fp");
    fs::write(&ok, "fn f(a: f64) -> f64 { a }").unwrap();
    fs::write(&bad, "#pragma float_control(pop)\nfn f(a: f64) -> f64 { a }").unwrap();

    fpc()
        .arg("check")
        .arg(&ok)
        .assert()
        .success()
        .stdout(contains("ok (1 function(s), 0 warning(s))"));

    fpc()
        .arg("check")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(contains("1 error(s)"));
}

#[test]
fn test_info_shows_target_defaults() {
    fpc()
        .args(["--target", "powerpc64-ibm-aix", "info"])
        .assert()
        .success()
        .stdout(contains("powerpc64-ibm-aix").and(contains("Eval method:     double")));
}
