//! Atomic write operations for JSONL files.
//!
//! Data is written to a sibling `.tmp` file, flushed, then renamed over the
//! target. Renames within one filesystem are atomic on POSIX systems, so a
//! crash mid-export leaves either the previous file or the complete new one.

use crate::{JsonlWriter, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Atomically writes a slice of values to a JSONL file.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, a value fails
/// to serialize, or the final rename fails. The target is left untouched on
/// failure.
///
/// # Examples
///
/// ```no_run
/// use lineage_jsonl::write_jsonl_atomic;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Failure {
///     table: String,
///     reason: String,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let failures = vec![Failure { table: "dbo.T".into(), reason: "no object found".into() }];
/// write_jsonl_atomic("failures.jsonl", &failures).await?;
/// # Ok(())
/// # }
/// ```
pub async fn write_jsonl_atomic<T, P>(path: P, values: &[T]) -> Result<usize>
where
    T: Serialize,
    P: AsRef<Path>,
{
    write_jsonl_atomic_iter(path, values.iter()).await
}

/// Atomically writes an iterator of values to a JSONL file.
///
/// Returns the number of records written.
///
/// # Errors
///
/// See [`write_jsonl_atomic`].
pub async fn write_jsonl_atomic_iter<T, I, P>(path: P, values: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let temp_path = make_temp_path(path);

    let written = match write_to_temp_file(&temp_path, values).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&temp_path, path).await?;
    tracing::debug!(path = %path.display(), records = written, "wrote JSONL file");

    Ok(written)
}

/// Appends `.tmp` to the file name: `edges.jsonl` becomes `edges.jsonl.tmp`.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

async fn write_to_temp_file<T, I>(temp_path: &Path, values: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let file = File::create(temp_path).await?;
    let mut writer = JsonlWriter::new(file);
    let written = writer.write_all(values).await?;
    writer.flush().await?;
    Ok(written)
}
