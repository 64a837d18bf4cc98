//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use redsift::io::records::{Record, read_records, write_records};
use serde_json::{Value, json};
use std::path::Path;

/// A comment-like record.
pub fn comment(id: u32, subreddit: &str) -> Value {
    json!({ "id": format!("c{id}"), "subreddit": subreddit, "body": format!("body of {id}") })
}

/// Write `values` as a compressed archive (codec from the extension).
pub fn write_archive(path: impl AsRef<Path>, values: &[Value]) -> Result<()> {
    let records = values
        .iter()
        .cloned()
        .map(Record::from_value)
        .collect::<std::io::Result<Vec<_>>>()?;
    write_records(path, None, &records)?;
    Ok(())
}

/// Read every record of an archive as JSON values.
pub fn read_values(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    Ok(read_records(path)?
        .into_iter()
        .map(Record::into_value)
        .collect())
}

/// Sort values by their serialized form, for order-insensitive comparisons.
pub fn sorted(mut values: Vec<Value>) -> Vec<Value> {
    values.sort_by_key(Value::to_string);
    values
}

/// A zstd archive whose second line is not JSON.
#[cfg(feature = "compression-zstd")]
pub fn write_malformed_zst(path: impl AsRef<Path>) -> Result<()> {
    let body = b"{\"id\":\"ok\",\"subreddit\":\"a\"}\nthis is not json\n{\"id\":\"late\",\"subreddit\":\"a\"}\n";
    let compressed = zstd::encode_all(&body[..], 3)?;
    std::fs::write(path, compressed)?;
    Ok(())
}

/// Names of the entries of `dir` ending in `.partial`.
pub fn staging_leftovers(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(".partial") {
            out.push(name);
        }
    }
    Ok(out)
}
