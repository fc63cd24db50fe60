//! Invoker tests against real `/bin/sh` commands.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use stlpress_core::config::{FaultSimControl, LogicSimControl};
use stlpress_core::invoker::{
    Compilation, FaultSimulation, Invoker, LogicSimulation, TIMEOUT_SENTINEL,
};
use stlpress_core::{Config, Error};

use crate::common::write_file;

/// Builds simulation control tables through the regular TOML path so the
/// regexes carry the production DOTALL compilation.
fn controls(ok: &str, tat: &str, timeout: f64, allow: &[&str]) -> (LogicSimControl, FaultSimControl) {
    let allow_toml = allow
        .iter()
        .map(|p| format!("{p:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
[isa]
isa_file = "isa.txt"
[assembly_sources]
sources = ["a.S"]
[cross_compilation]
instructions = ["true"]
[vcs_logic_simulation]
instructions = ["true"]
[vcs_logic_simulation_control]
timeout = {timeout}
simulation_ok_regex = {ok:?}
test_application_time_regex = {tat:?}
[zoix_fault_simulation]
instructions = ["true"]
[zoix_fault_simulation_control]
timeout = {timeout}
allow_regexs = [{allow_toml}]
[fault_report]
frpt_file = "report.frpt"
coverage_formula = "Coverage"
"#
    );
    let dir = TempDir::new().expect("tempdir");
    let path = write_file(dir.path(), "config.toml", &toml);
    let config = Config::load(path).expect("control config loads");
    (
        config.vcs_logic_simulation_control,
        config.zoix_fault_simulation_control,
    )
}

#[test]
fn execute_returns_both_streams() {
    let invoker = Invoker::new();
    let (stdout, stderr) = invoker
        .execute("echo out; echo err 1>&2", None)
        .expect("execute");
    assert_eq!(stdout.trim(), "out");
    assert_eq!(stderr.trim(), "err");
}

#[test]
fn execute_times_out_with_the_sentinel_pair() {
    let invoker = Invoker::new();
    let started = Instant::now();
    let (stdout, stderr) = invoker
        .execute("sleep 5", Some(Duration::from_millis(200)))
        .expect("execute");
    assert_eq!(stdout, TIMEOUT_SENTINEL);
    assert_eq!(stderr, TIMEOUT_SENTINEL);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[rstest::rstest]
#[case::silent_stderr("echo building", Compilation::Success)]
#[case::stderr_content("echo 'undefined symbol' 1>&2", Compilation::Error)]
#[case::warnings_exempt("echo 'Warning: deprecated mnemonic' 1>&2", Compilation::Success)]
fn compile_classifies_stderr(#[case] command: &str, #[case] expected: Compilation) {
    let invoker = Invoker::new();
    let status = invoker
        .compile(&[command.to_string()])
        .expect("compile");
    assert_eq!(status, expected);
}

#[test]
fn compile_stops_at_the_first_failing_command() {
    let dir = TempDir::new().expect("tempdir");
    let marker = dir.path().join("second_ran");
    let invoker = Invoker::new();

    let status = invoker
        .compile(&[
            "echo 'hard error' 1>&2".to_string(),
            format!("touch {}", marker.display()),
        ])
        .expect("compile");

    assert_eq!(status, Compilation::Error);
    assert!(!marker.exists());
}

#[test]
fn logic_simulation_captures_the_tat() {
    let (lsim_control, _) = controls(
        "EXIT SUCCESS",
        "test application time = ([0-9]+)",
        10.0,
        &[],
    );
    let invoker = Invoker::new();
    let mut tat = Vec::new();

    let status = invoker
        .logic_simulate(
            &["printf 'booting\\nEXIT SUCCESS\\ntest application time = 4242\\n'".to_string()],
            &lsim_control,
            &mut tat,
        )
        .expect("lsim");

    assert_eq!(status, LogicSimulation::Success);
    assert_eq!(tat, vec![4242]);
}

#[test]
fn logic_simulation_needs_both_markers() {
    let (lsim_control, _) = controls(
        "EXIT SUCCESS",
        "test application time = ([0-9]+)",
        10.0,
        &[],
    );
    let invoker = Invoker::new();
    let mut tat = Vec::new();

    // Ok marker without a TaT line.
    let status = invoker
        .logic_simulate(
            &["echo 'EXIT SUCCESS'".to_string()],
            &lsim_control,
            &mut tat,
        )
        .expect("lsim");
    assert_eq!(status, LogicSimulation::SimError);
}

#[test]
fn logic_simulation_reports_stderr_as_sim_error() {
    let (lsim_control, _) = controls(
        "EXIT SUCCESS",
        "test application time = ([0-9]+)",
        10.0,
        &[],
    );
    let invoker = Invoker::new();
    let mut tat = Vec::new();

    let status = invoker
        .logic_simulate(
            &["echo 'assertion failed' 1>&2".to_string()],
            &lsim_control,
            &mut tat,
        )
        .expect("lsim");
    assert_eq!(status, LogicSimulation::SimError);
}

#[test]
fn logic_simulation_times_out() {
    let (lsim_control, _) = controls(
        "EXIT SUCCESS",
        "test application time = ([0-9]+)",
        0.2,
        &[],
    );
    let invoker = Invoker::new();
    let mut tat = Vec::new();

    let status = invoker
        .logic_simulate(&["sleep 5".to_string()], &lsim_control, &mut tat)
        .expect("lsim");
    assert_eq!(status, LogicSimulation::Timeout);
}

#[test]
fn non_integer_tat_capture_is_fatal() {
    let (lsim_control, _) = controls("EXIT SUCCESS", "time = ([a-z]+)", 10.0, &[]);
    let invoker = Invoker::new();
    let mut tat = Vec::new();

    let err = invoker
        .logic_simulate(
            &["printf 'EXIT SUCCESS\\ntime = fast\\n'".to_string()],
            &lsim_control,
            &mut tat,
        )
        .expect_err("must fail");
    assert!(matches!(err, Error::TatCapture(_)));
}

#[test]
fn fault_simulation_allows_listed_stderr() {
    let (_, fsim_control) = controls("x", "x([0-9]+)", 10.0, &["fault list.*truncated"]);
    let invoker = Invoker::new();

    let status = invoker
        .fault_simulate(
            &["echo 'fault list was truncated' 1>&2".to_string()],
            &fsim_control,
        )
        .expect("fsim");
    assert_eq!(status, FaultSimulation::Success);

    let status = invoker
        .fault_simulate(
            &["echo 'license server unreachable' 1>&2".to_string()],
            &fsim_control,
        )
        .expect("fsim");
    assert_eq!(status, FaultSimulation::FsimError);
}

#[test]
fn fault_simulation_times_out() {
    let (_, fsim_control) = controls("x", "x([0-9]+)", 0.2, &[]);
    let invoker = Invoker::new();

    let status = invoker
        .fault_simulate(&["sleep 5".to_string()], &fsim_control)
        .expect("fsim");
    assert_eq!(status, FaultSimulation::Timeout);
}
