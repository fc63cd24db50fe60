//! Compaction drivers.
//!
//! Two closely related state machines share one per-trial pipeline. Both are
//! deterministic given the PRNG seed and the behavior of the external tools:
//! 1. **A0** removes one randomly ordered instruction per iteration.
//! 2. **A1xx** removes whole blocks (reverse source order) and re-grows each
//!    block one line at a time until the quality criterion holds.
//!
//! Every trial emits exactly one statistics row, flushed immediately.

/// The A0 (single-instruction, random order) driver.
pub mod a0;
/// The A1xx (block-wise) driver.
pub mod a1xx;
/// Shared per-trial pipeline: compile → lsim → fsim → coverage → verdict.
pub mod pipeline;
/// Per-iteration CSV statistics.
pub mod stats;

pub use a0::A0;
pub use a1xx::A1xx;
pub use pipeline::Anchor;
pub use stats::{CompactionStatistics, IterationStats, Verdict};
