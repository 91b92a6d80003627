//! Non-interactive command flows.
//!
//! These tests verify the library paths the CLI commands use when run
//! without a terminal, driven by an [`AutoPrompter`] instead of subprocess
//! execution.

#![cfg(all(feature = "gzip", feature = "tar"))]

use std::path::PathBuf;

use arcx::progress::{NoProgress, Phase, StatisticsProgress};
use arcx::{Archive, AutoPrompter, ErrorAction, ExtractRequest, FormatDetector, FormatRegistry, OverwriteAction};
use tempfile::TempDir;

mod common;

fn tar_gz_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let tar = common::tar_bytes(&[("docs/", b""), ("docs/guide.md", b"# Guide"), ("main.rs", b"fn main() {}")]);
    let path = common::write_file(temp_dir.path(), "project.tar.gz", &common::gzip_bytes(&tar, None));
    (temp_dir, path)
}

// =============================================================================
// Detect Command Tests
// =============================================================================

#[test]
fn test_detect_lists_chains() {
    let (_temp, path) = tar_gz_file();
    let detector = FormatDetector::new(FormatRegistry::builtin());
    let chains = Archive::probe(&path, &detector, &mut AutoPrompter::new(), &mut NoProgress).unwrap();

    let names: Vec<String> = chains.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["GZip", "GZip->Tar"]);
}

#[test]
fn test_detect_nonexistent_file() {
    let detector = FormatDetector::new(FormatRegistry::builtin());
    let result = Archive::probe("/nonexistent/path/archive.tar", &detector, &mut AutoPrompter::new(), &mut NoProgress);
    assert!(result.is_err());
}

// =============================================================================
// List Command Tests
// =============================================================================

#[test]
fn test_list_without_format_choice_fails() {
    let (_temp, path) = tar_gz_file();
    let err = Archive::open(&path, &mut AutoPrompter::new(), &mut NoProgress).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_list_with_format_index() {
    let (_temp, path) = tar_gz_file();
    let archive = Archive::open(&path, &mut AutoPrompter::new().format(1), &mut NoProgress).unwrap();

    let tree = archive.tree();
    let mut names: Vec<&str> = tree.iter().map(|(_, e)| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["docs", "guide.md", "main.rs"]);
}

// =============================================================================
// Extract Command Tests
// =============================================================================

#[test]
fn test_extract_unattended() {
    let (temp, path) = tar_gz_file();
    let mut prompter = AutoPrompter::new()
        .format(1)
        .on_overwrite(OverwriteAction::Overwrite)
        .on_error(ErrorAction::Ignore);
    let mut archive = Archive::open(&path, &mut prompter, &mut NoProgress).unwrap();

    let out = temp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("main.rs"), b"stale").unwrap();

    let mut stats = StatisticsProgress::new();
    let report = archive
        .extract(&ExtractRequest::new(&out), &mut prompter, &mut stats)
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.files_extracted, 2);
    assert_eq!(stats.phases.last(), Some(&Phase::RestoringAttributes));
    assert_eq!(stats.suspends, 1, "one overwrite question");
    assert_eq!(common::read(out.join("main.rs")), "fn main() {}");
    assert_eq!(common::read(out.join("docs/guide.md")), "# Guide");
}

#[test]
fn test_extract_default_prompter_keeps_existing() {
    let (temp, path) = tar_gz_file();
    let mut prompter = AutoPrompter::new().format(1);
    let mut archive = Archive::open(&path, &mut prompter, &mut NoProgress).unwrap();

    let out = temp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("main.rs"), b"stale").unwrap();

    let report = archive
        .extract(&ExtractRequest::new(&out), &mut prompter, &mut NoProgress)
        .unwrap();
    assert_eq!(report.files_skipped, 1);
    assert_eq!(common::read(out.join("main.rs")), "stale");
}
