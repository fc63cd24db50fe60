//! End-to-end driver tests against `/bin/sh` toolchain stubs.
//!
//! The stub toolchain compiles with `true` (or a failing command), logic
//! simulates with a `printf` that emits the ok marker and a constant TaT,
//! and fault simulates with `true` over a pre-existing fault report. With
//! constant stats every removal is accepted; with a failing compiler every
//! removal is rejected and restored.

use std::fs;

use pretty_assertions::assert_eq;

use stlpress_core::compact::{A1xx, Anchor, A0};

use crate::common::{StubToolchain, STL_SOURCE};

/// Reads the statistics CSV as a vector of line strings.
fn stats_lines(toolchain: &StubToolchain) -> Vec<String> {
    let path = toolchain.stats_file().expect("statistics file exists");
    fs::read_to_string(path)
        .expect("read statistics")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn a0_accepts_every_removal_under_constant_stats() {
    let toolchain = StubToolchain::new(&[STL_SOURCE], "true", None);
    let mut driver = A0::new(toolchain.config.clone()).expect("driver");
    assert_eq!(driver.candidate_count(), 4);

    let anchor = driver.pre_run().expect("baseline");
    assert_eq!(anchor.tat, 2815);
    assert_eq!(anchor.coverage, 1.0);

    driver.run(anchor).expect("run");

    // All four instructions were cut; labels, directives and comments stay.
    let final_source = fs::read_to_string(&toolchain.sources[0]).expect("read");
    assert_eq!(final_source, ".section .text\nmain:\n    # trailing comment\n");

    // Header + baseline row + one row per iteration, all accepted.
    let lines = stats_lines(&toolchain);
    assert_eq!(lines.len(), 6);
    for row in &lines[2..] {
        assert!(row.ends_with("Proceed"), "row {row:?}");
        assert!(row.contains("2815"));
    }

    // The backup preserves the starting source.
    let backup = toolchain.backup_dir().expect("backup dir");
    let copy = fs::read_to_string(backup.join("test0.S")).expect("backup copy");
    assert_eq!(copy, STL_SOURCE);
}

#[test]
fn a0_restores_when_the_assembly_no_longer_compiles() {
    // Single-candidate STL; the "compiler" always reports an error.
    let toolchain = StubToolchain::new(
        &["start:\n    addi x1,x1,1\n"],
        "echo 'relocation truncated' 1>&2",
        None,
    );
    let mut driver = A0::new(toolchain.config.clone()).expect("driver");
    assert_eq!(driver.candidate_count(), 1);

    let anchor = Anchor {
        tat: 1000,
        coverage: 0.95,
    };
    driver.run(anchor).expect("run");

    // The removal was rejected and the source restored byte-for-byte.
    let final_source = fs::read_to_string(&toolchain.sources[0]).expect("read");
    assert_eq!(final_source, "start:\n    addi x1,x1,1\n");

    let lines = stats_lines(&toolchain);
    assert_eq!(lines.len(), 3);
    let row = &lines[2];
    assert!(row.contains(",NO,"), "row {row:?}");
    assert!(row.ends_with("Restore"), "row {row:?}");
}

#[test]
fn a1xx_cuts_whole_blocks_under_constant_stats() {
    let toolchain = StubToolchain::new(&[STL_SOURCE], "true", Some((2, 'B')));
    let mut driver = A1xx::new(toolchain.config.clone()).expect("driver");

    let anchor = driver.pre_run().expect("baseline");
    driver.run(anchor).expect("run");

    let final_source = fs::read_to_string(&toolchain.sources[0]).expect("read");
    assert_eq!(final_source, ".section .text\nmain:\n    # trailing comment\n");

    // Two blocks of two, each accepted on its first trial: header +
    // baseline + two rows.
    let lines = stats_lines(&toolchain);
    assert_eq!(lines.len(), 4);
    for row in &lines[2..] {
        assert!(row.ends_with("Proceed"), "row {row:?}");
    }
}

#[test]
fn a1xx_forward_policy_discards_every_other_member() {
    // One block of three instructions under policy F: the teardown removes
    // the back-most, discards the next back-most unattempted, then removes
    // the front one — two removals, hence two trials when everything is
    // rejected.
    let source = "loop:\n    addi x1,x1,1\n    nop\n    sub x2,x2,x2\n";
    let toolchain = StubToolchain::new(&[source], "echo 'bad opcode' 1>&2", Some((3, 'F')));
    let mut driver = A1xx::new(toolchain.config.clone()).expect("driver");

    let anchor = Anchor {
        tat: 1000,
        coverage: 0.95,
    };
    driver.run(anchor).expect("run");

    // Everything was restored.
    let final_source = fs::read_to_string(&toolchain.sources[0]).expect("read");
    assert_eq!(final_source, source);

    // Header + baseline + exactly two trials (not three).
    let lines = stats_lines(&toolchain);
    assert_eq!(lines.len(), 4);

    // The first trial carries both removed lines, back-most first.
    assert!(lines[2].contains("sub x2,x2,x2"), "row {:?}", lines[2]);
    assert!(lines[2].contains("addi x1,x1,1"), "row {:?}", lines[2]);
    assert!(!lines[2].contains("nop"), "row {:?}", lines[2]);
}

#[test]
fn a1xx_walks_blocks_in_reverse_order() {
    // Five candidates, segment 3: blocks [c1,c2,c3] and [c4,c5]; the tail
    // block is attempted first. A failing compiler keeps everything, so the
    // statistics expose the order.
    let source = "\
    addi x1,x1,1
    nop
    sub x2,x2,x2
    lui x8,0x8
    sw x8,0(x2)
";
    let toolchain = StubToolchain::new(&[source], "echo 'nope' 1>&2", Some((3, 'B')));
    let mut driver = A1xx::new(toolchain.config.clone()).expect("driver");

    let anchor = Anchor {
        tat: 1000,
        coverage: 0.95,
    };
    driver.run(anchor).expect("run");

    let lines = stats_lines(&toolchain);
    // Baseline + 2 trials for the tail block + 3 for the head block.
    assert_eq!(lines.len(), 7);

    // Block 0 in the statistics is the tail block [lui, sw]; under B its
    // first trial lists the front member first.
    let first_trial = &lines[2];
    assert!(first_trial.contains(",0,"), "row {first_trial:?}");
    assert!(first_trial.contains("lui x8,0x8"), "row {first_trial:?}");
    assert!(first_trial.contains("sw x8,0(x2)"), "row {first_trial:?}");

    let head_block_trial = &lines[4];
    assert!(head_block_trial.contains(",1,"), "row {head_block_trial:?}");

    assert_eq!(
        fs::read_to_string(&toolchain.sources[0]).expect("read"),
        source
    );
}
