//! Writing report rows
//!
//! Rows are sanitized, then written as JSON Lines to a file or as
//! pretty-printed JSON to stdout. Tabular exports are produced downstream from
//! the JSON Lines file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::sanitize::sanitize_row;

/// Rows are flushed to disk in chunks of this many
const FLUSH_EVERY: usize = 1000;

/// Writes `rows` to `output_file`, or to stdout when no file is given
///
/// Returns the number of rows written.
pub async fn write_rows<T: Serialize>(rows: &[T], output_file: Option<&Path>) -> Result<usize> {
    match output_file {
        Some(path) => write_jsonl(rows, path).await,
        None => {
            for row in rows {
                let value = sanitize_row(serde_json::to_value(row)?);
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Ok(rows.len())
        }
    }
}

async fn write_jsonl<T: Serialize>(rows: &[T], path: &Path) -> Result<usize> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    for (index, row) in rows.iter().enumerate() {
        let value = sanitize_row(serde_json::to_value(row)?);
        let mut line = serde_json::to_string(&value)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        if (index + 1) % FLUSH_EVERY == 0 {
            writer.flush().await?;
        }
    }
    writer.flush().await?;

    info!(rows = rows.len(), path = %path.display(), "wrote report");
    Ok(rows.len())
}
