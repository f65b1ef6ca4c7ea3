//! JSONL reading operations.
//!
//! [`JsonlReader`] reads line by line and keeps a 1-based line counter so
//! decode failures can point at the offending line. [`read_jsonl_resilient`]
//! loads a whole file, turning malformed lines into [`Warning`]s instead of
//! aborting.

use crate::{Error, Result, Warning};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Async reader for JSONL (JSON Lines) data.
pub struct JsonlReader<R> {
    reader: BufReader<R>,
    /// 1-based number of the last line read, 0 before any read.
    line_number: usize,
    buffer: String,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: String::new(),
        }
    }

    /// Returns the 1-based number of the last line read (0 before any read).
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next raw line without its terminator.
    ///
    /// Returns `Ok(None)` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails or the line is not UTF-8.
    pub async fn next_line(&mut self) -> Result<Option<&str>> {
        self.buffer.clear();
        let read = self.reader.read_line(&mut self.buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(self.buffer.trim_end_matches(['\n', '\r'])))
    }

    /// Reads and decodes the next non-blank line.
    ///
    /// Returns `Ok(None)` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLine`] when a line does not decode as `T`.
    pub async fn read_value<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| Error::InvalidLine {
                    line_number: self.line_number,
                    message: e.to_string(),
                });
        }
    }
}

/// Loads every decodable record of a JSONL file.
///
/// Blank lines are ignored. Lines that fail to decode are skipped and
/// reported as [`Warning::MalformedJson`], so one bad line cannot block a
/// whole input file.
///
/// # Errors
///
/// Returns an error only when the file cannot be opened or read.
///
/// # Examples
///
/// ```no_run
/// use lineage_jsonl::read_jsonl_resilient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (rows, warnings): (Vec<serde_json::Value>, _) =
///     read_jsonl_resilient("seeds.jsonl").await?;
/// for warning in &warnings {
///     eprintln!("{warning}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).await?;
    let mut reader = JsonlReader::new(file);
    let mut values = Vec::new();
    let mut warnings = Vec::new();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(value) => values.push(value),
            Err(e) => {
                let warning = Warning::MalformedJson {
                    line_number: reader.line_number(),
                    error: e.to_string(),
                };
                tracing::warn!(path = %path.display(), "{warning}");
                warnings.push(warning);
            }
        }
    }

    Ok((values, warnings))
}
