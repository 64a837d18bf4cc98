//! Tests for the deterministic merge of intermediates.
#![cfg(feature = "compression-zstd")]

mod common;

use anyhow::Result;
use common::{comment, read_values, staging_leftovers, write_archive, write_malformed_zst};
use redsift::ExtractError;
use redsift::merge::merge;
use std::fs;
use tempfile::TempDir;

#[test]
fn inputs_are_concatenated_in_path_order() -> Result<()> {
    let tmp = TempDir::new()?;
    let a = tmp.path().join("a.zst");
    let b = tmp.path().join("b.zst");
    write_archive(&a, &[comment(1, "x"), comment(2, "x")])?;
    write_archive(&b, &[comment(3, "x")])?;

    let out = tmp.path().join("out.zst");
    let n = merge(&[b.clone(), a.clone()], &out, None)?;
    assert_eq!(n, 3);
    assert_eq!(
        read_values(&out)?,
        vec![comment(1, "x"), comment(2, "x"), comment(3, "x")]
    );
    Ok(())
}

#[test]
fn merge_is_byte_identical_across_input_orders() -> Result<()> {
    let tmp = TempDir::new()?;
    let inputs: Vec<_> = (0..5)
        .map(|i| tmp.path().join(format!("part{i}.zst")))
        .collect();
    for (i, path) in inputs.iter().enumerate() {
        let values: Vec<_> = (0..50).map(|j| comment(i as u32 * 100 + j, "x")).collect();
        write_archive(path, &values)?;
    }

    let forward = tmp.path().join("forward.zst");
    let backward = tmp.path().join("backward.zst");
    merge(&inputs, &forward, Some(5))?;
    let mut reversed = inputs.clone();
    reversed.reverse();
    merge(&reversed, &backward, Some(5))?;

    assert_eq!(fs::read(&forward)?, fs::read(&backward)?);
    Ok(())
}

#[test]
fn duplicate_paths_are_merged_once() -> Result<()> {
    let tmp = TempDir::new()?;
    let a = tmp.path().join("a.zst");
    write_archive(&a, &[comment(1, "x")])?;
    let out = tmp.path().join("out.zst");
    assert_eq!(merge(&[a.clone(), a], &out, None)?, 1);
    Ok(())
}

#[test]
fn empty_input_list_gives_empty_archive() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out.zst");
    assert_eq!(merge(&[], &out, None)?, 0);
    assert!(read_values(&out)?.is_empty());
    Ok(())
}

#[test]
fn unreadable_intermediate_leaves_no_output() -> Result<()> {
    let tmp = TempDir::new()?;
    let good = tmp.path().join("a.zst");
    let bad = tmp.path().join("b.zst");
    write_archive(&good, &[comment(1, "x")])?;
    write_malformed_zst(&bad)?;

    let out = tmp.path().join("out.zst");
    fs::write(&out, b"previous")?;
    let err = merge(&[good, bad.clone()], &out, None).unwrap_err();
    assert!(matches!(err, ExtractError::MergeRead { ref path, line: Some(2), .. } if *path == bad));
    assert_eq!(fs::read(&out)?, b"previous");
    assert!(staging_leftovers(tmp.path())?.is_empty());
    Ok(())
}

#[test]
fn missing_intermediate_is_a_merge_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out.zst");
    let err = merge(&[tmp.path().join("gone.zst")], &out, None).unwrap_err();
    assert!(matches!(err, ExtractError::MergeRead { line: None, .. }));
    assert!(!out.exists());
    Ok(())
}
