//! The shared per-trial pipeline.
//!
//! Both drivers evaluate a candidate removal the same way: cross-compile the
//! mutated sources, optionally re-compile the HDL, logic-simulate for the
//! test application time, fault-simulate, recompute coverage from the fresh
//! fault report, and compare against the anchor. Iteration-local failures
//! populate the statistics row and return a reject (the caller restores);
//! an HDL compile failure is fatal — an STL whose testbench no longer builds
//! cannot be compacted.

use std::path::Path;

use tracing::{debug, info};

use crate::common::error::{Error, Result};
use crate::compact::stats::{IterationStats, Verdict};
use crate::config::{CompactionPolicy, Config};
use crate::fault::TxtFaultReport;
use crate::invoker::{Compilation, FaultSimulation, Invoker, LogicSimulation};

/// The quality criterion to beat: the last accepted TaT/coverage pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Test application time, in simulator time units.
    pub tat: u64,
    /// Fault coverage in `[0, 1]`.
    pub coverage: f64,
}

impl Anchor {
    /// Accepts iff the new stats are no worse on either axis.
    pub fn accepts(&self, new_tat: u64, new_coverage: f64) -> bool {
        new_tat <= self.tat && new_coverage >= self.coverage
    }

    /// Moves the anchor after an accepted trial, per the compaction policy.
    ///
    /// `Maximize` adopts both new values; `Threshold` locks coverage and
    /// only drives TaT down.
    pub fn advance(&mut self, policy: CompactionPolicy, new_tat: u64, new_coverage: f64) {
        match policy {
            CompactionPolicy::Maximize => {
                self.tat = new_tat;
                self.coverage = new_coverage;
            }
            CompactionPolicy::Threshold => {
                self.tat = new_tat;
            }
        }
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// Quality criterion held; the removal stays.
    Accept,
    /// Quality criterion failed or a tool step broke; the caller restores.
    Reject,
}

/// Borrowed view of everything one trial needs from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    invoker: &'a Invoker,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    /// Creates the pipeline over the run's invoker and configuration.
    pub fn new(invoker: &'a Invoker, config: &'a Config) -> Self {
        Self { invoker, config }
    }

    /// Path of the fault report rewritten by every fault simulation.
    fn report_path(&self) -> &Path {
        &self.config.fault_report.frpt_file
    }

    /// Re-parses the fault report and evaluates the configured formula.
    fn coverage(&self) -> Result<f64> {
        let report = TxtFaultReport::load(self.report_path())?;
        report.coverage_value(&self.config.fault_report.coverage_formula)
    }

    /// Establishes the baseline anchor on the unmodified sources.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] when any baseline step fails — an STL with a failing
    /// baseline cannot be compacted.
    pub fn pre_run(&self) -> Result<Anchor> {
        if self.invoker.compile(&self.config.cross_compilation.instructions)?
            == Compilation::Error
        {
            return Err(Error::Tool(
                "unable to cross-compile the unmodified assembly sources".into(),
            ));
        }

        self.compile_hdl()?;

        info!("initial logic simulation for TaT computation");
        let mut tat_values = Vec::new();
        let lsim = self.invoker.logic_simulate(
            &self.config.vcs_logic_simulation.instructions,
            &self.config.vcs_logic_simulation_control,
            &mut tat_values,
        )?;
        if lsim != LogicSimulation::Success {
            return Err(Error::Tool(format!(
                "initial logic simulation resulted in {lsim}"
            )));
        }
        let tat = tat_values
            .pop()
            .ok_or_else(|| Error::Invariant("successful lsim captured no TaT".into()))?;

        info!("initial fault simulation for coverage computation");
        let fsim = self.invoker.fault_simulate(
            &self.config.zoix_fault_simulation.instructions,
            &self.config.zoix_fault_simulation_control,
        )?;
        if fsim != FaultSimulation::Success {
            return Err(Error::Tool(format!(
                "initial fault simulation resulted in {fsim}"
            )));
        }

        let coverage = self.coverage()?;
        Ok(Anchor { tat, coverage })
    }

    /// Runs one trial on the current on-disk sources.
    ///
    /// Fills `row` as the steps progress. On `Reject` the row's verdict is
    /// already `Restore` and the caller must undo the removal(s); on
    /// `Accept` the anchor has been advanced per the compaction policy.
    pub fn run_trial(&self, anchor: &mut Anchor, row: &mut IterationStats) -> Result<TrialOutcome> {
        // Assembly cross-compilation.
        info!("cross-compiling assembly sources");
        if self.invoker.compile(&self.config.cross_compilation.instructions)?
            == Compilation::Error
        {
            row.compiles = Some("NO".into());
            row.verdict = Some(Verdict::Restore);
            return Ok(TrialOutcome::Reject);
        }

        // HDL compilation (optional); failure here is not iteration-local.
        self.compile_hdl()?;

        // Logic simulation.
        info!("initiating logic simulation");
        let mut tat_values = Vec::new();
        let lsim = self.invoker.logic_simulate(
            &self.config.vcs_logic_simulation.instructions,
            &self.config.vcs_logic_simulation_control,
            &mut tat_values,
        )?;
        if lsim != LogicSimulation::Success {
            row.compiles = Some("YES".into());
            row.lsim_ok = Some(format!("NO-{lsim}"));
            row.verdict = Some(Verdict::Restore);
            return Ok(TrialOutcome::Reject);
        }
        let tat = *tat_values
            .first()
            .ok_or_else(|| Error::Invariant("successful lsim captured no TaT".into()))?;

        // Fault simulation.
        info!("initiating fault simulation");
        let fsim = self.invoker.fault_simulate(
            &self.config.zoix_fault_simulation.instructions,
            &self.config.zoix_fault_simulation_control,
        )?;
        if fsim != FaultSimulation::Success {
            row.compiles = Some("YES".into());
            row.lsim_ok = Some("YES".into());
            row.tat = Some(tat);
            row.fsim_ok = Some(format!("NO-{fsim}"));
            row.verdict = Some(Verdict::Restore);
            return Ok(TrialOutcome::Reject);
        }

        // Coverage from the freshly rewritten report.
        debug!("computing coverage");
        let coverage = self.coverage()?;

        row.compiles = Some("YES".into());
        row.lsim_ok = Some("YES".into());
        row.tat = Some(tat);
        row.fsim_ok = Some("YES".into());
        row.coverage = Some(coverage);

        if anchor.accepts(tat, coverage) {
            info!(
                "STL has better stats than before (old TaT {}, old coverage {}; new TaT {tat}, new coverage {coverage}); proceeding",
                anchor.tat, anchor.coverage
            );
            anchor.advance(self.config.compaction_policy, tat, coverage);
            row.verdict = Some(Verdict::Proceed);
            Ok(TrialOutcome::Accept)
        } else {
            info!(
                "STL has worse stats than before (old TaT {}, old coverage {}; new TaT {tat}, new coverage {coverage}); restoring",
                anchor.tat, anchor.coverage
            );
            row.verdict = Some(Verdict::Restore);
            Ok(TrialOutcome::Reject)
        }
    }

    /// HDL compilation; an empty instruction list skips the step.
    fn compile_hdl(&self) -> Result<()> {
        let instructions = &self.config.vcs_hdl_compilation.instructions;
        if instructions.is_empty() {
            return Ok(());
        }
        if self.invoker.compile(instructions)? == Compilation::Error {
            return Err(Error::Tool("unable to compile HDL sources".into()));
        }
        Ok(())
    }
}
