//! JSON Lines plumbing for the lineage tracer.
//!
//! Seeds come in as JSONL and every exported record set goes out as JSONL.
//! This crate provides the buffered reader and writer, a resilient loader
//! that survives malformed lines, and crash-safe atomic writes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use atomic::{write_jsonl_atomic, write_jsonl_atomic_iter};
pub use error::{Error, Result};
pub use reader::{JsonlReader, read_jsonl_resilient};
pub use warning::Warning;
pub use writer::JsonlWriter;
