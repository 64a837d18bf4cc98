//! Tests for single-archive filtering.
#![cfg(feature = "compression-zstd")]

mod common;

use anyhow::Result;
use common::{comment, read_values, staging_leftovers, write_archive};
use redsift::{CancelToken, ExtractError, Predicate, filter_archive};
use tempfile::TempDir;

#[test]
fn keeps_matching_records_in_order() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("RC_2015-01.zst");
    let output = tmp.path().join("out.zst");
    let records = vec![
        comment(1, "rust"),
        comment(2, "golang"),
        comment(3, "Rust"),
        comment(4, "RUST"),
    ];
    write_archive(&input, &records)?;

    let stats = filter_archive(&input, &output, &Predicate::subreddit(Some("rust")), None, None)?;
    assert_eq!(stats.read, 4);
    assert_eq!(stats.kept, 3);
    assert_eq!(
        read_values(&output)?,
        vec![records[0].clone(), records[2].clone(), records[3].clone()]
    );
    Ok(())
}

#[test]
fn output_codec_follows_extension() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in.zst");
    let output = tmp.path().join("out.jsonl");
    write_archive(&input, &[comment(1, "a")])?;

    filter_archive(&input, &output, &Predicate::keep_all(), None, None)?;
    let text = std::fs::read_to_string(&output)?;
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("\"c1\""));
    Ok(())
}

#[test]
fn no_match_still_produces_an_empty_archive() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in.zst");
    let output = tmp.path().join("out.zst");
    write_archive(&input, &[comment(1, "a")])?;

    let stats = filter_archive(&input, &output, &Predicate::subreddit(Some("b")), None, None)?;
    assert_eq!(stats.kept, 0);
    assert!(read_values(&output)?.is_empty());
    Ok(())
}

#[test]
fn cancelled_filter_leaves_nothing_behind() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in.zst");
    let output = tmp.path().join("out.zst");
    write_archive(&input, &[comment(1, "a"), comment(2, "a")])?;

    let cancel = CancelToken::new();
    assert!(cancel.cancel());
    assert!(!cancel.cancel());
    let err = filter_archive(&input, &output, &Predicate::keep_all(), None, Some(&cancel))
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!output.exists());
    assert!(staging_leftovers(tmp.path())?.is_empty());
    Ok(())
}

#[test]
fn decode_failure_names_the_input() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("broken.zst");
    let output = tmp.path().join("out.zst");
    common::write_malformed_zst(&input)?;

    let err = filter_archive(&input, &output, &Predicate::keep_all(), None, None).unwrap_err();
    match &err {
        ExtractError::Decode { path, line, .. } => {
            assert_eq!(path, &input);
            assert_eq!(*line, Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("broken.zst"));
    assert!(!output.exists());
    assert!(staging_leftovers(tmp.path())?.is_empty());
    Ok(())
}
