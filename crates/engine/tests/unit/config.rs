//! Configuration tests: placeholder expansion, typed regex/duration fields,
//! and error reporting for missing keys.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use stlpress_core::config::{BlockPolicy, CompactionPolicy};
use stlpress_core::{Config, Error};

use crate::common::write_file;

const CONFIG: &str = r#"
seed = 42
compaction_policy = "Threshold"

[user_defines]
croot = "/opt/stl/cv32e40p"
ccprefix = "riscv32-unknown-elf"

[isa]
isa_file = "%croot%/isa.txt"

[assembly_sources]
sources = ["%croot%/src/test1.S", "%croot%/src/test2.S"]

[cross_compilation]
instructions = ["make -C %croot% clean", "%ccprefix%-gcc -o test.elf %croot%/src/test1.S"]

[vcs_hdl_compilation]
instructions = []

[vcs_logic_simulation]
instructions = ["./simv +firmware=%croot%/test.hex"]

[vcs_logic_simulation_control]
timeout = 120.5
simulation_ok_regex = "EXIT SUCCESS"
test_application_time_regex = "test application time = ([0-9]+)"
test_application_time_regex_group_no = 1

[zoix_fault_simulation]
instructions = ["fsim -campaign run"]

[zoix_fault_simulation_control]
timeout = 3600.0
allow_regexs = ["Warning: fault list.*truncated"]

[fault_report]
frpt_file = "%croot%/fault_report.frpt"
coverage_formula = "Observational Coverage"

[preprocessing]
enabled = true
processor_name = "CV32E40P"
processor_trace = "%croot%/trace.log"
elf_file = "%croot%/test.elf"

[preprocessing.zoix_to_trace]
sim_time = "Time"
PC_ID = "PC"

[a1xx]
a1xx_segment_dimension = 5
a1xx_policy = "F"
"#;

fn load(toml: &str) -> Result<Config, Error> {
    let dir = TempDir::new().expect("tempdir");
    let path = write_file(dir.path(), "config.toml", toml);
    Config::load(path)
}

#[test]
fn expands_user_define_placeholders_everywhere() {
    let config = load(CONFIG).expect("config loads");

    assert_eq!(
        config.isa.isa_file.to_string_lossy(),
        "/opt/stl/cv32e40p/isa.txt"
    );
    assert_eq!(
        config.cross_compilation.instructions[1],
        "riscv32-unknown-elf-gcc -o test.elf /opt/stl/cv32e40p/src/test1.S"
    );
    assert_eq!(
        config.fault_report.frpt_file.to_string_lossy(),
        "/opt/stl/cv32e40p/fault_report.frpt"
    );
    assert_eq!(config.assembly_sources.sources.len(), 2);
}

#[test]
fn typed_fields_deserialize() {
    let config = load(CONFIG).expect("config loads");

    assert_eq!(config.seed, Some(42));
    assert_eq!(config.compaction_policy, CompactionPolicy::Threshold);
    assert_eq!(
        config.vcs_logic_simulation_control.timeout,
        Duration::from_secs_f64(120.5)
    );
    assert_eq!(
        config.vcs_logic_simulation_control.test_application_time_regex_group_no,
        1
    );
    assert_eq!(config.zoix_fault_simulation_control.allow_regexs.len(), 1);

    let a1xx = config.a1xx().expect("a1xx table");
    assert_eq!(a1xx.a1xx_segment_dimension, 5);
    assert_eq!(a1xx.a1xx_policy, BlockPolicy::F);

    assert!(config.preprocessing.enabled);
    assert_eq!(
        config.preprocessing.zoix_to_trace.get("sim_time"),
        Some(&"Time".to_string())
    );
}

#[test]
fn regex_fields_compile_with_dotall() {
    let config = load(CONFIG).expect("config loads");
    let pattern = &config.zoix_fault_simulation_control.allow_regexs[0];
    // `.` crosses newlines under DOTALL.
    assert!(pattern.is_match("Warning: fault list\nwas truncated"));
}

#[test]
fn missing_required_table_names_the_key() {
    let toml = CONFIG.replace("[fault_report]", "[fault_report_gone]");
    let err = load(&toml).expect_err("must fail");
    let message = err.to_string();
    assert!(message.contains("fault_report"), "got: {message}");
}

#[test]
fn invalid_regex_is_a_configuration_error() {
    let toml = CONFIG.replace(
        "simulation_ok_regex = \"EXIT SUCCESS\"",
        "simulation_ok_regex = \"EXIT [SUCCESS\"",
    );
    assert!(matches!(load(&toml), Err(Error::Config(_))));
}

#[test]
fn unknown_policy_is_a_configuration_error() {
    let toml = CONFIG.replace(
        "compaction_policy = \"Threshold\"",
        "compaction_policy = \"Minimize\"",
    );
    assert!(matches!(load(&toml), Err(Error::Config(_))));
}

#[test]
fn empty_instruction_lists_are_rejected() {
    let toml = CONFIG.replace(
        "instructions = [\"fsim -campaign run\"]",
        "instructions = []",
    );
    let err = load(&toml).expect_err("must fail");
    assert!(err.to_string().contains("zoix_fault_simulation"));
}

#[test]
fn a1xx_table_is_optional_until_requested() {
    let toml: String = CONFIG
        .lines()
        .take_while(|line| !line.starts_with("[a1xx]"))
        .collect::<Vec<_>>()
        .join("\n");
    let config = load(&toml).expect("config loads without a1xx");
    assert!(config.a1xx().is_err());
}
