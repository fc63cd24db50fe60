//! Shared test fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use stlpress_core::{Config, Isa};
use tempfile::TempDir;

/// The sample fault report used across the report, coverage and driver
/// tests: five primes (four with attributes), four equivalents, status
/// groups and two coverage formulas. All eleven faults carry status `ON`,
/// so `Diagnostic Coverage` evaluates to 0 and `Observational Coverage`
/// to 1.
pub const FAULT_REPORT: &str = r#"
Date("DDDD TTTTT")
Tool("REPORT")
Info("  Type:    Fault Coverage Report")

TestList {
    1 test1 {Results:16020 NC:547 NO:101 NN:772 ON:14600}
}

StatusDefinitions {
    NN "Not Observed Not Diagnosed";
    ON "Observed Not Diagnosed";

    StatusGroups {
        SA "Safe" (UT, UB, UR, UU);
        SU "Safe Unobserved" (NN, NC, NO, NT);
        DA "Dangerous Assumed" (HA, HM, HT, OA, OZ, IA, IP, IF, IX);
        DN "Dangerous Not Diagnosed" (PN, ON, PP, OP, NP, AN, AP);
        DD "Dangerous Diagnosed" (PD, OD, ND, AD);
    }
}

Coverage {
    "Diagnostic Coverage" = "DD/(NA + DA + DN + DD)";
    "Observational Coverage" = "(DD + DN)/(NA + DA + DN + DD + SU)";
}

FaultList {
    <  1> ON 1 {PORT "tb_top.dut.mult.U10.A1"}(* "test1"->INSTR=3cb3079a; "test1"->sim_time="   2815ns"; *)
          -- 1 {PORT "tb_top.dut.mult.U333.Z"}
    <  1> ON 1 {PORT "tb_top.dut.mult.U10.A2"}(* "test1"->INSTR=3cb3079a; "test1"->sim_time="   6425ns"; *)
    <  1> ON 0 {PORT "tb_top.dut.mult.U10.ZN"}(* "test1"->INSTR=3cb3079a; "test1"->sim_time="   2815ns"; *)
    <  1> ON 1 {PORT "tb_top.dut.mult.U10.ZN"}(* "test1"->INSTR=3cb3079a; "test1"->sim_time="  18745ns"; *)
          -- 0 {PORT "tb_top.dut.mult.U10.A1"}
          -- 0 {PORT "tb_top.dut.mult.U10.A2"}
          -- 0 {PORT "tb_top.dut.mult.U333.Z"}
    <  1> ON 1 {PORT "tb_top.dut.mult.U100.A1"}(* "test1"->INSTR=3cb3079a; "test1"->sim_time="   7455ns"; *)
}
"#;

/// A small RISC-V flavored ISA language file.
pub const ISA_FILE: &str = "# toy RV32 subset\naddi\nadd\nsub\nnop\nlui\nsw\nlw\njal\n";

/// A small STL source with labels, directives, comments and instructions.
pub const STL_SOURCE: &str = "\
.section .text
main:
    addi x1,x1,1
    nop
    sub  x2,x2,x2
    # trailing comment
    jal  x0, main
";

/// Writes `content` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("fixture write");
    path
}

/// Creates an ISA catalog from [`ISA_FILE`] inside `dir`.
pub fn isa_in(dir: &Path) -> Isa {
    let path = write_file(dir, "isa.txt", ISA_FILE);
    Isa::load(path).expect("ISA fixture loads")
}

/// Shell-quotes nothing fancy; the fixture paths have no spaces.
fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds a driver configuration whose toolchain is `/bin/sh` stubs.
///
/// - cross-compilation runs `compile_cmd`
/// - logic simulation prints an ok marker and `TaT <n> cycles`
/// - fault simulation succeeds silently (the report fixture pre-exists)
pub struct StubToolchain {
    /// Workspace holding sources, report, and outputs. Keep it alive for
    /// the duration of the test.
    pub dir: TempDir,
    /// The STL source file(s).
    pub sources: Vec<PathBuf>,
    /// The generated configuration.
    pub config: Config,
}

impl StubToolchain {
    /// Assembles the workspace: STL sources, ISA file, fault report, and a
    /// TOML configuration using `compile_cmd` for cross-compilation.
    pub fn new(stl_sources: &[&str], compile_cmd: &str, a1xx: Option<(usize, char)>) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();

        let isa_path = write_file(root, "isa.txt", ISA_FILE);
        let report_path = write_file(root, "fault_report.frpt", FAULT_REPORT);

        let sources: Vec<PathBuf> = stl_sources
            .iter()
            .enumerate()
            .map(|(index, content)| write_file(root, &format!("test{index}.S"), content))
            .collect();

        let sources_toml = sources
            .iter()
            .map(|p| format!("{:?}", path_str(p)))
            .collect::<Vec<_>>()
            .join(", ");

        let a1xx_table = a1xx
            .map(|(dimension, policy)| {
                format!(
                    "\n[a1xx]\na1xx_segment_dimension = {dimension}\na1xx_policy = \"{policy}\"\n"
                )
            })
            .unwrap_or_default();

        let toml = format!(
            r#"
seed = 17
times_to_shuffle = 3
compaction_policy = "Maximize"
output_directory = {out:?}

[isa]
isa_file = {isa:?}

[assembly_sources]
sources = [{sources_toml}]

[cross_compilation]
instructions = [{compile:?}]

[vcs_logic_simulation]
instructions = ["printf 'SIMULATION SUCCESS\n$finish TaT 2815 cycles\n'"]

[vcs_logic_simulation_control]
timeout = 10.0
simulation_ok_regex = "SIMULATION SUCCESS"
test_application_time_regex = "TaT ([0-9]+) cycles"
test_application_time_regex_group_no = 1

[zoix_fault_simulation]
instructions = ["true"]

[zoix_fault_simulation_control]
timeout = 10.0

[fault_report]
frpt_file = {report:?}
coverage_formula = "Observational Coverage"
{a1xx_table}"#,
            out = path_str(root),
            isa = path_str(&isa_path),
            compile = compile_cmd,
            report = path_str(&report_path),
        );

        let config_path = write_file(root, "config.toml", &toml);
        let config = Config::load(config_path).expect("stub config loads");

        Self {
            dir,
            sources,
            config,
        }
    }

    /// The statistics CSV produced by a run, if any.
    pub fn stats_file(&self) -> Option<PathBuf> {
        fs::read_dir(self.dir.path())
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| {
                path.extension().is_some_and(|ext| ext == "csv")
                    && path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().contains("statistics"))
            })
    }

    /// The backup directory produced by a run, if any.
    pub fn backup_dir(&self) -> Option<PathBuf> {
        fs::read_dir(self.dir.path())
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().starts_with("backup_"))
            })
    }
}
