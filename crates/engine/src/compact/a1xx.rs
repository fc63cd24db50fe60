//! The A1xx compaction driver.
//!
//! A1xx partitions each source's candidates into blocks of
//! `segment_dimension` and walks the blocks in reverse order, from the end
//! of the STL toward its start — trailing instructions empirically yield the
//! larger cuts. Each block is torn down whole (members removed one by one in
//! policy order), then trials shrink the removed set: every rejected trial
//! restores the most recently removed member and retries, and the first
//! accepted trial closes the block.
//!
//! Intra-block order comes from the configured policy: `B` removes from the
//! front, `R` at random, and `F` removes from the back *and then discards
//! the next back-most member without attempting it*. The `F` discard is a
//! preserved behavioral quirk of the policy definition — deterministic and
//! reproducible, but deliberately not symmetric with `B`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::asm::codeline::CodelineRef;
use crate::asm::handler::AssemblyHandler;
use crate::backup;
use crate::common::error::{Error, Result};
use crate::compact::a0::{file_name, flatten, path_to_id};
use crate::compact::pipeline::{Anchor, Pipeline, TrialOutcome};
use crate::compact::stats::{CompactionStatistics, IterationStats};
use crate::config::{BlockPolicy, Config};
use crate::fault::TxtFaultReport;
use crate::invoker::Invoker;
use crate::isa::Isa;
use crate::prep::Preprocessor;
use crate::reap;

/// Grace period before leftover children are force-killed.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// The A1xx (block-wise) driver.
#[derive(Debug)]
pub struct A1xx {
    config: Config,
    handlers: Vec<AssemblyHandler>,
    all_instructions: Vec<(usize, CodelineRef)>,
    all_code_chunks: Vec<(usize, Vec<CodelineRef>)>,
    path_to_id: BTreeMap<String, usize>,
    invoker: Invoker,
    rng: StdRng,
    seed: u64,
    segment_dimension: usize,
    policy: BlockPolicy,
}

impl A1xx {
    /// Builds the driver: one handler per source chunked at
    /// `segment_dimension`, the block list, and the run's seeded PRNG.
    pub fn new(config: Config) -> Result<Self> {
        let a1xx = config.a1xx()?;
        let segment_dimension = a1xx.a1xx_segment_dimension;
        let policy = a1xx.a1xx_policy;

        debug!(
            "generating assembly handlers for {:?}",
            config.assembly_sources.sources
        );

        let isa = Isa::load(&config.isa.isa_file)?;
        let handlers = config
            .assembly_sources
            .sources
            .iter()
            .map(|source| AssemblyHandler::new(&isa, source, segment_dimension))
            .collect::<Result<Vec<_>>>()?;

        let all_instructions = flatten(&handlers);
        let all_code_chunks = handlers
            .iter()
            .enumerate()
            .flat_map(|(asm_id, handler)| {
                handler
                    .chunks()
                    .iter()
                    .map(move |chunk| (asm_id, chunk.clone()))
            })
            .collect();
        let path_to_id = path_to_id(&handlers);

        let seed = config.seed.unwrap_or_else(rand::random);
        info!("PRNG seed for this run: {seed}");

        Ok(Self {
            config,
            handlers,
            all_instructions,
            all_code_chunks,
            path_to_id,
            invoker: Invoker::new(),
            rng: StdRng::seed_from_u64(seed),
            seed,
            segment_dimension,
            policy,
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
    /// windows and re-chunks the survivors into blocks. Returns
    /// `(before, after)` candidate counts, or `None` when preprocessing is
    /// disabled.
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
        self.all_code_chunks = preprocessor.prune_chunked(
            &mut self.all_instructions,
            &fault_list,
            &self.path_to_id,
            self.segment_dimension,
        )?;
        Ok(Some((before, self.all_instructions.len())))
    }

    /// Main loop of the A1xx algorithm.
    ///
    /// 1. Archive the starting sources.
    /// 2. Walk the blocks in reverse order.
    /// 3. Tear each block down in policy order, then re-grow it one restore
    ///    per rejected trial until a trial is accepted or the block is whole
    ///    again.
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
            out_dir.join(format!(
                "a1{}{}_statistics_{run_id}_seed{}.csv",
                self.policy, self.segment_dimension, self.seed
            )),
            true,
        )?;

        let sources: Vec<_> = self
            .handlers
            .iter()
            .map(|handler| handler.asm_source().to_path_buf())
            .collect();
        let _ = backup::archive_sources(out_dir.join(format!("backup_{run_id}")), &sources)?;

        let baseline = IterationStats {
            tat: Some(initial.tat),
            coverage: Some(initial.coverage),
            ..IterationStats::default()
        };
        stats.append(&baseline)?;

        let mut anchor = initial;
        let blocks: Vec<(usize, Vec<CodelineRef>)> =
            self.all_code_chunks.iter().rev().cloned().collect();
        let blocks_number = blocks.len();

        debug!(
            "code len {}, segment_dimension {}, blocks_number {blocks_number}",
            self.all_instructions.len(),
            self.segment_dimension
        );

        for (block_index, (asm_id, block)) in blocks.into_iter().enumerate() {
            info!("block {}/{blocks_number}", block_index + 1);

            let assembly_source = file_name(&self.handlers[asm_id]);
            let mut removed = self.tear_down(asm_id, block)?;
            let attempts = removed.len();

            for _ in 0..attempts {
                let removed_codelines = removed
                    .iter()
                    .map(|codeline| codeline.borrow().to_string())
                    .collect::<Vec<_>>()
                    .join("\t");
                info!(
                    "removing {removed_codelines} of assembly source {assembly_source}"
                );

                let mut row = IterationStats {
                    asm_source: Some(assembly_source.clone()),
                    block_index: Some(block_index),
                    removed: Some(removed_codelines),
                    ..IterationStats::default()
                };

                let pipeline = Pipeline::new(&self.invoker, &self.config);
                let outcome = match pipeline.run_trial(&mut anchor, &mut row) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // Leave the sources in the last-accepted state
                        // before surfacing the failure.
                        while removed.pop().is_some() {
                            self.handlers[asm_id].restore()?;
                        }
                        return Err(e);
                    }
                };
                stats.append(&row)?;

                match outcome {
                    TrialOutcome::Accept => break,
                    TrialOutcome::Reject => {
                        let _ = removed.pop();
                        self.handlers[asm_id].restore()?;
                    }
                }
            }
        }

        info!("A1xx finished; statistics in {}", stats.path().display());
        Ok(())
    }

    /// Removes a whole block in policy order, returning the codelines that
    /// were actually removed, in removal order.
    ///
    /// Under `F` every selection also discards the next back-most member of
    /// the in-memory block without attempting it (the documented quirk).
    fn tear_down(
        &mut self,
        asm_id: usize,
        mut block: Vec<CodelineRef>,
    ) -> Result<Vec<CodelineRef>> {
        let mut removed = Vec::with_capacity(block.len());

        while !block.is_empty() {
            let codeline = match self.policy {
                BlockPolicy::B => block.remove(0),
                BlockPolicy::F => {
                    let codeline = block.pop().ok_or_else(|| {
                        Error::Invariant("teardown on an empty block".into())
                    })?;
                    let _ = block.pop();
                    codeline
                }
                BlockPolicy::R => {
                    let index = self.rng.random_range(0..block.len());
                    block.remove(index)
                }
            };

            self.handlers[asm_id].remove(&codeline)?;
            removed.push(codeline);
        }

        Ok(removed)
    }

    /// Cleans up any stopped simulator processes left behind.
    pub fn post_run(&self) {
        reap::reap_children(REAP_GRACE);
    }
}
