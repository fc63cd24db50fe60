//! Verdict and anchor policy tests, plus the pre-run source archival.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use stlpress_core::backup::archive_sources;
use stlpress_core::compact::Anchor;
use stlpress_core::config::CompactionPolicy;

use crate::common::write_file;

#[test]
fn accepts_only_when_neither_metric_regresses() {
    let anchor = Anchor {
        tat: 1000,
        coverage: 0.90,
    };

    assert!(anchor.accepts(1000, 0.90));
    assert!(anchor.accepts(900, 0.95));
    assert!(!anchor.accepts(1001, 0.95));
    assert!(!anchor.accepts(900, 0.89));
}

#[test]
fn maximize_moves_both_anchor_metrics() {
    let mut anchor = Anchor {
        tat: 1000,
        coverage: 0.90,
    };
    anchor.advance(CompactionPolicy::Maximize, 800, 0.93);
    assert_eq!(anchor.tat, 800);
    assert_eq!(anchor.coverage, 0.93);
}

#[test]
fn threshold_locks_coverage_at_the_baseline() {
    let mut anchor = Anchor {
        tat: 1000,
        coverage: 0.90,
    };

    // Accepted trial with better coverage: only TaT moves.
    anchor.advance(CompactionPolicy::Threshold, 800, 0.95);
    assert_eq!(anchor.tat, 800);
    assert_eq!(anchor.coverage, 0.90);

    // A later trial is still measured against the baseline coverage.
    assert!(anchor.accepts(800, 0.90));
    assert!(!anchor.accepts(800, 0.89));
}

#[test]
fn archive_copies_every_source() {
    let dir = TempDir::new().expect("tempdir");
    let a = write_file(dir.path(), "test0.S", "nop\n");
    let b = write_file(dir.path(), "test1.S", "addi x1,x1,1\n");

    let archive = archive_sources(dir.path().join("backup_run"), &[a, b]).expect("archive");

    assert!(archive.ends_with("backup_run"));
    assert_eq!(
        fs::read_to_string(archive.join("test0.S")).expect("copy"),
        "nop\n"
    );
    assert_eq!(
        fs::read_to_string(archive.join("test1.S")).expect("copy"),
        "addi x1,x1,1\n"
    );
}
