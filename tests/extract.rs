//! End-to-end tests for directory extraction.
#![cfg(feature = "compression-zstd")]

mod common;

use anyhow::Result;
use common::{comment, read_values, sorted, staging_leftovers, write_archive, write_malformed_zst};
use redsift::extract::{self, ExtractConfig};
use redsift::{Algorithm, CodecConfig, ExtractError, Predicate};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config(input: &Path, work: &Path, output: &Path, subreddit: Option<&str>) -> ExtractConfig {
    ExtractConfig {
        input_dir: input.to_path_buf(),
        work_dir: work.to_path_buf(),
        output: output.to_path_buf(),
        predicate: Predicate::subreddit(subreddit),
        threads: 2,
        intermediate: CodecConfig::new(Algorithm::Zst, Some(3)),
        final_level: None,
        resume: false,
    }
}

#[test]
fn filters_and_merges_a_small_directory() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    write_archive(
        input.path().join("one.zst"),
        &[json!({"subreddit": "a", "n": 1}), json!({"subreddit": "a", "n": 2})],
    )?;
    write_archive(input.path().join("two.zst"), &[json!({"subreddit": "b", "n": 3})])?;
    write_archive(input.path().join("three.zst"), &[json!({"subreddit": "a", "n": 4})])?;

    let output = out_dir.path().join("out.zst");
    let summary = extract::run(&config(input.path(), work.path(), &output, Some("A")))?;
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.resumed, 0);
    assert_eq!(summary.records, 3);

    let values = read_values(&output)?;
    assert_eq!(values.len(), 3);
    assert!(values.iter().all(|v| v["subreddit"] == "a"));
    Ok(())
}

#[test]
fn output_is_the_union_of_per_file_matches() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    let mut expected = Vec::new();
    for f in 0..5u32 {
        let values: Vec<Value> = (0..40)
            .map(|i| comment(f * 100 + i, ["AskScience", "rust", "askscience"][(i % 3) as usize]))
            .collect();
        expected.extend(
            values
                .iter()
                .filter(|v| v["subreddit"].as_str().is_some_and(|s| s.eq_ignore_ascii_case("askscience")))
                .cloned(),
        );
        write_archive(input.path().join(format!("RS_2016-{f:02}.zst")), &values)?;
    }

    let output = out_dir.path().join("askscience.zst");
    let summary = extract::run(&config(input.path(), work.path(), &output, Some("askSCIENCE")))?;
    assert_eq!(summary.records as usize, expected.len());
    assert_eq!(sorted(read_values(&output)?), sorted(expected));
    assert!(staging_leftovers(work.path())?.is_empty());
    assert!(staging_leftovers(out_dir.path())?.is_empty());
    Ok(())
}

#[test]
#[cfg(feature = "compression-bzip2")]
fn intermediates_can_use_another_codec() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    write_archive(input.path().join("a.zst"), &[comment(1, "x"), comment(2, "y")])?;

    let output = out_dir.path().join("out.zst");
    let mut cfg = config(input.path(), work.path(), &output, None);
    cfg.intermediate = CodecConfig::new(Algorithm::Bz2, None);
    extract::run(&cfg)?;
    assert!(work.path().join("a.bz2").is_file());
    assert_eq!(read_values(&output)?, vec![comment(1, "x"), comment(2, "y")]);
    Ok(())
}

#[test]
fn resuming_a_finished_run_redoes_nothing() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    for f in 0..4u32 {
        let values: Vec<_> = (0..25).map(|i| comment(f * 100 + i, "x")).collect();
        write_archive(input.path().join(format!("RC_{f}.zst")), &values)?;
    }

    let output = out_dir.path().join("out.zst");
    let mut cfg = config(input.path(), work.path(), &output, None);
    extract::run(&cfg)?;
    let first = fs::read(&output)?;

    cfg.resume = true;
    let summary = extract::run(&cfg)?;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.resumed, 4);
    assert!(summary.report.tasks.is_empty());
    assert_eq!(fs::read(&output)?, first);
    Ok(())
}

#[test]
fn resume_without_a_ledger_processes_everything() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    write_archive(input.path().join("a.zst"), &[comment(1, "x")])?;

    let output = out_dir.path().join("out.zst");
    let mut cfg = config(input.path(), work.path(), &output, None);
    cfg.resume = true;
    let summary = extract::run(&cfg)?;
    assert_eq!(summary.processed, 1);
    Ok(())
}

#[test]
fn fresh_run_ignores_previous_intermediates() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    write_archive(input.path().join("a.zst"), &[comment(1, "a"), comment(2, "b")])?;

    let output = out_dir.path().join("out.zst");
    extract::run(&config(input.path(), work.path(), &output, Some("a")))?;
    assert_eq!(read_values(&output)?, vec![comment(1, "a")]);

    let summary = extract::run(&config(input.path(), work.path(), &output, Some("b")))?;
    assert_eq!(summary.processed, 1);
    assert_eq!(read_values(&output)?, vec![comment(2, "b")]);
    Ok(())
}

#[test]
fn failed_input_aborts_without_output() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let out_dir = TempDir::new()?;
    for f in 0..3u32 {
        write_archive(input.path().join(format!("RC_{f}.zst")), &[comment(f, "x")])?;
    }
    write_malformed_zst(input.path().join("RC_bad.zst"))?;

    let output = out_dir.path().join("out.zst");
    let err = extract::run(&config(input.path(), work.path(), &output, None)).unwrap_err();
    assert!(matches!(err, ExtractError::Task { ref input, .. } if input == "RC_bad.zst"));
    assert!(matches!(err.cause(), ExtractError::Decode { .. }));
    assert!(err.to_string().contains("RC_bad.zst"));
    assert!(!output.exists());
    assert!(staging_leftovers(work.path())?.is_empty());
    assert!(staging_leftovers(out_dir.path())?.is_empty());
    Ok(())
}

#[test]
fn invalid_levels_are_rejected_up_front() -> Result<()> {
    let input = TempDir::new()?;
    let work = TempDir::new()?;
    let output = work.path().join("out.zst");

    let mut cfg = config(input.path(), &work.path().join("w"), &output, None);
    cfg.intermediate = CodecConfig::new(Algorithm::Zst, Some(40));
    assert!(matches!(extract::run(&cfg), Err(ExtractError::Config(_))));
    assert!(!work.path().join("w").exists());

    cfg.intermediate = CodecConfig::default();
    cfg.final_level = Some(0);
    assert!(matches!(extract::run(&cfg), Err(ExtractError::Config(_))));
    Ok(())
}
