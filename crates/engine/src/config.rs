//! Configuration system for the compaction engine.
//!
//! Configuration is supplied as a single TOML file, read once at startup. It
//! provides:
//! 1. **Substitution:** `[user_defines]` entries are expanded into every
//!    string value as `%key%` placeholders before typed deserialization.
//! 2. **Structures:** one struct per TOML table (ISA, sources, toolchain
//!    instruction lists, simulation control, fault report, preprocessing,
//!    A1xx tuning).
//! 3. **Typed fields:** keys whose names contain `regex` deserialize into
//!    DOTALL-compiled patterns; timeouts deserialize from float seconds into
//!    [`Duration`].
//!
//! Missing required keys, unparseable TOML, invalid regexes and unknown
//! policy names are configuration errors reported with the offending key
//! path, before any simulator runs.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::common::error::{Error, Result};

/// A regular expression compiled with DOTALL semantics (`.` matches `\n`).
///
/// Every configuration key whose name contains `regex` uses this type.
#[derive(Debug, Clone)]
pub struct DotallRegex(pub Regex);

impl Deref for DotallRegex {
    type Target = Regex;

    fn deref(&self) -> &Regex {
        &self.0
    }
}

impl fmt::Display for DotallRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for DotallRegex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        RegexBuilder::new(&pattern)
            .dot_matches_new_line(true)
            .build()
            .map(DotallRegex)
            .map_err(|e| D::Error::custom(format!("invalid regex {pattern:?}: {e}")))
    }
}

/// Deserializes a float (or integer) number of seconds into a [`Duration`].
fn duration_secs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let seconds = f64::deserialize(deserializer)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(D::Error::custom(format!("invalid timeout {seconds}")));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Whether an accepted removal moves both anchor metrics or only TaT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CompactionPolicy {
    /// Accepts update both the TaT and the coverage anchor.
    #[default]
    Maximize,
    /// Coverage stays locked at the baseline; only TaT is driven down.
    Threshold,
}

/// Intra-block removal order for the A1xx driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BlockPolicy {
    /// Front of the block first.
    B,
    /// Back of the block first, discarding the next back-most entry after
    /// each selection.
    F,
    /// Uniformly random within the block.
    R,
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::B => write!(f, "B"),
            Self::F => write!(f, "F"),
            Self::R => write!(f, "R"),
        }
    }
}

/// `[isa]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct IsaConfig {
    /// ISA language file (one mnemonic per line).
    pub isa_file: PathBuf,
}

/// `[assembly_sources]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblySourcesConfig {
    /// The STL's assembly source files, in handler-id order.
    pub sources: Vec<PathBuf>,
}

/// A table holding one ordered list of shell instructions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstructionList {
    /// Shell commands, run in order through `/bin/sh -c`.
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// `[vcs_logic_simulation_control]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LogicSimControl {
    /// Per-command timeout in seconds.
    #[serde(deserialize_with = "duration_secs")]
    pub timeout: Duration,
    /// Matches the stdout line that marks a graceful simulation end.
    pub simulation_ok_regex: DotallRegex,
    /// Matches the stdout line carrying the test application time; the
    /// designated capture group must parse as an integer.
    pub test_application_time_regex: DotallRegex,
    /// Capture group index of the TaT value within the regex above.
    #[serde(default = "LogicSimControl::default_group_no")]
    pub test_application_time_regex_group_no: usize,
}

impl LogicSimControl {
    fn default_group_no() -> usize {
        1
    }
}

/// `[zoix_fault_simulation_control]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultSimControl {
    /// Per-command timeout in seconds.
    #[serde(deserialize_with = "duration_secs")]
    pub timeout: Duration,
    /// stderr content matching any of these patterns is treated as benign.
    #[serde(default)]
    pub allow_regexs: Vec<DotallRegex>,
}

/// `[fault_report]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultReportConfig {
    /// The textual fault report produced by each fault simulation.
    pub frpt_file: PathBuf,
    /// Name of the coverage formula to steer the verdict with.
    pub coverage_formula: String,
}

/// `[preprocessing]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreprocessingConfig {
    /// Master switch; when false the remaining fields are ignored.
    #[serde(default)]
    pub enabled: bool,
    /// Processor name selecting the trace grammar (e.g. `CV32E40P`).
    #[serde(default)]
    pub processor_name: String,
    /// The processor execution trace of the golden run.
    #[serde(default)]
    pub processor_trace: PathBuf,
    /// ELF with DWARF line information for PC-to-source resolution.
    #[serde(default)]
    pub elf_file: PathBuf,
    /// Fault-attribute name → trace column name mapping.
    #[serde(default)]
    pub zoix_to_trace: BTreeMap<String, String>,
}

/// `[a1xx]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct A1xxConfig {
    /// Block (segment) size the candidate list is partitioned into.
    pub a1xx_segment_dimension: usize,
    /// Intra-block removal order.
    pub a1xx_policy: BlockPolicy,
}

/// Root configuration; one instance per run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `%key%` placeholder definitions, expanded before deserialization.
    #[serde(default)]
    pub user_defines: BTreeMap<String, String>,

    /// PRNG seed; drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Directory receiving the statistics file and the source backup.
    /// Defaults to the working directory.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// How many times the A0 candidate list is shuffled.
    #[serde(default = "Config::default_times_to_shuffle")]
    pub times_to_shuffle: usize,

    /// Anchor update policy on accepted removals.
    #[serde(default)]
    pub compaction_policy: CompactionPolicy,

    /// ISA language file.
    pub isa: IsaConfig,

    /// Assembly sources forming the STL.
    pub assembly_sources: AssemblySourcesConfig,

    /// Cross-compilation of the assembly sources.
    pub cross_compilation: InstructionList,

    /// HDL compilation; empty list skips the step.
    #[serde(default)]
    pub vcs_hdl_compilation: InstructionList,

    /// Logic simulation commands.
    pub vcs_logic_simulation: InstructionList,

    /// Logic simulation evaluation parameters.
    pub vcs_logic_simulation_control: LogicSimControl,

    /// Fault simulation commands.
    pub zoix_fault_simulation: InstructionList,

    /// Fault simulation control parameters.
    pub zoix_fault_simulation_control: FaultSimControl,

    /// Fault report location and verdict formula.
    pub fault_report: FaultReportConfig,

    /// Candidate-pruning preprocessor parameters.
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    /// A1xx driver tuning; required only in A1xx mode.
    #[serde(default)]
    pub a1xx: Option<A1xxConfig>,
}

impl Config {
    fn default_times_to_shuffle() -> usize {
        100
    }

    /// Loads and validates a configuration file.
    ///
    /// The raw TOML value tree is parsed first so `[user_defines]`
    /// placeholders can be expanded into every string before the typed
    /// deserialization (which compiles regexes and converts timeouts).
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the file cannot be read; [`Error::Config`] with the
    /// offending key path on parse or validation failures.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        let mut value: toml::Value = text
            .parse()
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        let defines = value
            .get("user_defines")
            .and_then(toml::Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        substitute_placeholders(&mut value, &defines);

        let config: Self = value
            .try_into()
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Structural checks beyond what serde can express.
    fn validate(&self) -> Result<()> {
        if self.assembly_sources.sources.is_empty() {
            return Err(Error::Config(
                "assembly_sources.sources: at least one source is required".into(),
            ));
        }
        if self.cross_compilation.instructions.is_empty() {
            return Err(Error::Config(
                "cross_compilation.instructions: at least one instruction is required".into(),
            ));
        }
        if self.vcs_logic_simulation.instructions.is_empty() {
            return Err(Error::Config(
                "vcs_logic_simulation.instructions: at least one instruction is required".into(),
            ));
        }
        if self.zoix_fault_simulation.instructions.is_empty() {
            return Err(Error::Config(
                "zoix_fault_simulation.instructions: at least one instruction is required".into(),
            ));
        }
        if let Some(a1xx) = &self.a1xx {
            if a1xx.a1xx_segment_dimension == 0 {
                return Err(Error::Config(
                    "a1xx.a1xx_segment_dimension: must be at least 1".into(),
                ));
            }
        }
        if self.preprocessing.enabled {
            if self.preprocessing.processor_name.is_empty() {
                return Err(Error::Config(
                    "preprocessing.processor_name: required when preprocessing is enabled".into(),
                ));
            }
            if self.preprocessing.zoix_to_trace.is_empty() {
                return Err(Error::Config(
                    "preprocessing.zoix_to_trace: required when preprocessing is enabled".into(),
                ));
            }
        }
        Ok(())
    }

    /// The A1xx table, or a configuration error naming it.
    pub fn a1xx(&self) -> Result<&A1xxConfig> {
        self.a1xx
            .as_ref()
            .ok_or_else(|| Error::Config("a1xx: table required for A1xx mode".into()))
    }
}

/// Recursively replaces `%key%` placeholders in every string value.
fn substitute_placeholders(value: &mut toml::Value, defines: &BTreeMap<String, String>) {
    match value {
        toml::Value::String(s) => {
            for (key, replacement) in defines {
                let placeholder = format!("%{key}%");
                if s.contains(&placeholder) {
                    *s = s.replace(&placeholder, replacement);
                }
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                substitute_placeholders(item, defines);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                substitute_placeholders(item, defines);
            }
        }
        _ => {}
    }
}
