//! The A0 compaction driver.
//!
//! A0 flattens every instruction of every source into one list, shuffles it,
//! and attempts to remove one instruction per iteration. A rejected trial
//! restores the instruction; an accepted one moves the anchor. The loop ends
//! when every candidate has been attempted once.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::asm::codeline::CodelineRef;
use crate::asm::handler::AssemblyHandler;
use crate::backup;
use crate::common::error::{Error, Result};
use crate::compact::pipeline::{Anchor, Pipeline, TrialOutcome};
use crate::compact::stats::{CompactionStatistics, IterationStats};
use crate::config::Config;
use crate::fault::TxtFaultReport;
use crate::invoker::Invoker;
use crate::isa::Isa;
use crate::prep::Preprocessor;
use crate::reap;

/// Grace period before leftover children are force-killed.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// The A0 (single-instruction, random order) driver.
#[derive(Debug)]
pub struct A0 {
    config: Config,
    handlers: Vec<AssemblyHandler>,
    all_instructions: Vec<(usize, CodelineRef)>,
    path_to_id: BTreeMap<String, usize>,
    invoker: Invoker,
    rng: StdRng,
    seed: u64,
}

impl A0 {
    /// Builds the driver: one handler per source (chunk size 1), a flattened
    /// candidate list, and the run's seeded PRNG.
    pub fn new(config: Config) -> Result<Self> {
        debug!(
            "generating assembly handlers for {:?}",
            config.assembly_sources.sources
        );

        let isa = Isa::load(&config.isa.isa_file)?;
        let handlers = config
            .assembly_sources
            .sources
            .iter()
            .map(|source| AssemblyHandler::new(&isa, source, 1))
            .collect::<Result<Vec<_>>>()?;

        let all_instructions = flatten(&handlers);
        let path_to_id = path_to_id(&handlers);

        let seed = config.seed.unwrap_or_else(rand::random);
        info!("PRNG seed for this run: {seed}");

        Ok(Self {
            config,
            handlers,
            all_instructions,
            path_to_id,
            invoker: Invoker::new(),
            rng: StdRng::seed_from_u64(seed),
            seed,
        })
    }

    /// The seed driving every random decision of this run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of candidates currently in the search space.
    pub fn candidate_count(&self) -> usize {
        self.all_instructions.len()
    }

    /// The per-source handlers, in configuration order.
    pub fn handlers(&self) -> &[AssemblyHandler] {
        &self.handlers
    }

    /// Establishes the baseline TaT and coverage on the untouched STL.
    pub fn pre_run(&self) -> Result<Anchor> {
        Pipeline::new(&self.invoker, &self.config).pre_run()
    }

    /// Prunes the candidate list around the golden run's fault-injection
    /// windows. Returns `(before, after)` candidate counts, or `None` when
    /// preprocessing is disabled.
    ///
    /// Must run after [`A0::pre_run`] so the fault report of the golden run
    /// exists.
    pub fn preprocess(&mut self) -> Result<Option<(usize, usize)>> {
        if !self.config.preprocessing.enabled {
            return Ok(None);
        }

        let report = TxtFaultReport::load(&self.config.fault_report.frpt_file)?;
        let fault_list = report
            .fault_list
            .ok_or_else(|| Error::Report("FaultList section not found".into()))?;

        let preprocessor = Preprocessor::new(&self.config.preprocessing)?;
        let before = self.all_instructions.len();
        preprocessor.prune_candidates(&mut self.all_instructions, &fault_list, &self.path_to_id)?;
        Ok(Some((before, self.all_instructions.len())))
    }

    /// Main loop of the A0 algorithm.
    ///
    /// 1. Archive the starting sources.
    /// 2. Shuffle the candidate list.
    /// 3. Pop the front candidate, remove it, run the shared pipeline.
    /// 4. Restore on reject; repeat until the list is empty.
    pub fn run(&mut self, initial: Anchor) -> Result<()> {
        let run_id = chrono::Utc::now().format("%d_%b_%H%M").to_string();
        debug!(
            "initial coverage {}, TaT {}",
            initial.coverage, initial.tat
        );

        let out_dir = self
            .config
            .output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut stats = CompactionStatistics::create(
            out_dir.join(format!("a0_statistics_{run_id}_seed{}.csv", self.seed)),
            false,
        )?;

        // The sources are modified in place; keep a way back.
        let sources: Vec<_> = self
            .handlers
            .iter()
            .map(|handler| handler.asm_source().to_path_buf())
            .collect();
        let _ = backup::archive_sources(out_dir.join(format!("backup_{run_id}")), &sources)?;

        for _ in 0..self.config.times_to_shuffle {
            self.all_instructions.shuffle(&mut self.rng);
        }

        // Leading row carrying the baseline stats.
        let baseline = IterationStats {
            tat: Some(initial.tat),
            coverage: Some(initial.coverage),
            ..IterationStats::default()
        };
        stats.append(&baseline)?;

        let mut anchor = initial;
        let pipeline = Pipeline::new(&self.invoker, &self.config);
        let queue = std::mem::take(&mut self.all_instructions);
        let total_iterations = queue.len();

        for (iteration, (asm_id, codeline)) in queue.into_iter().enumerate() {
            info!("iteration {}/{total_iterations}", iteration + 1);

            let asm_source_file = file_name(&self.handlers[asm_id]);
            info!(
                "removing {} of assembly source {asm_source_file}",
                codeline.borrow()
            );

            let mut row = IterationStats {
                asm_source: Some(asm_source_file),
                removed: Some(codeline.borrow().to_string()),
                ..IterationStats::default()
            };

            self.handlers[asm_id].remove(&codeline)?;

            match pipeline.run_trial(&mut anchor, &mut row) {
                Ok(TrialOutcome::Accept) => {}
                Ok(TrialOutcome::Reject) => self.handlers[asm_id].restore()?,
                Err(e) => {
                    // Leave the sources in the last-accepted state before
                    // surfacing the failure.
                    self.handlers[asm_id].restore()?;
                    return Err(e);
                }
            }

            stats.append(&row)?;
        }

        info!("A0 finished; statistics in {}", stats.path().display());
        Ok(())
    }

    /// Cleans up any stopped simulator processes left behind.
    pub fn post_run(&self) {
        reap::reap_children(REAP_GRACE);
    }
}

/// Flattens `(asm-id, codeline)` pairs over all handlers.
pub(crate) fn flatten(handlers: &[AssemblyHandler]) -> Vec<(usize, CodelineRef)> {
    handlers
        .iter()
        .enumerate()
        .flat_map(|(asm_id, handler)| {
            handler.code().into_iter().map(move |codeline| (asm_id, codeline))
        })
        .collect()
}

/// Maps source file names (stem + extension) to handler ids.
pub(crate) fn path_to_id(handlers: &[AssemblyHandler]) -> BTreeMap<String, usize> {
    handlers
        .iter()
        .enumerate()
        .map(|(asm_id, handler)| (file_name(handler), asm_id))
        .collect()
}

/// The file-name component of a handler's source.
pub(crate) fn file_name(handler: &AssemblyHandler) -> String {
    handler
        .asm_source()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
