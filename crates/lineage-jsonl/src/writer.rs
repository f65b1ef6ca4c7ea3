//! JSONL writing operations.
//!
//! Each record is serialized onto a single line followed by `\n`, through a
//! buffered async writer.

use crate::Result;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Async writer for JSONL (JSON Lines) data.
///
/// # Examples
///
/// ```no_run
/// use lineage_jsonl::JsonlWriter;
/// use tokio::fs::File;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::create("edges.jsonl").await?;
/// let mut writer = JsonlWriter::new(file);
/// writer.write(&serde_json::json!({"source": "a", "target": "b"})).await?;
/// writer.flush().await?;
/// # Ok(())
/// # }
/// ```
pub struct JsonlWriter<W> {
    writer: BufWriter<W>,
    records_written: usize,
}

impl<W: AsyncWrite + Unpin> JsonlWriter<W> {
    /// Creates a new `JsonlWriter` wrapping the given async writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            records_written: 0,
        }
    }

    /// Serializes one value and writes it as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the underlying write fails.
    pub async fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.records_written += 1;
        Ok(())
    }

    /// Writes every value of an iterator, returning how many were written.
    ///
    /// # Errors
    ///
    /// Stops at the first value that fails to serialize or write.
    pub async fn write_all<T, I>(&mut self, values: I) -> Result<usize>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let mut count = 0;
        for value in values {
            self.write(&value).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Flushes buffered data to the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Consumes the writer, returning the underlying buffered writer.
    ///
    /// Does not flush; call [`flush`](Self::flush) first.
    #[must_use]
    pub fn into_inner(self) -> BufWriter<W> {
        self.writer
    }
}
