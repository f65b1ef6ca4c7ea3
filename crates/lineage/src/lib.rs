//! Lineage - dependency lineage tracing for SQL Server catalogs.
//!
//! Starting from seed tables, the tracer finds every view, procedure,
//! function and trigger that references them, then follows those objects'
//! own dependencies breadth-first. The result is a deduplicated object
//! catalog, dependency edges, per-seed report links with a read/write
//! classification, a failure log, enumerated paths and a migration order.
//!
//! The catalog is reached through the [`source::Connector`] trait, with a
//! SQL Server implementation and an in-memory snapshot implementation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lineage::config::TraceConfig;
//! use lineage::runner::LineageRunner;
//! use lineage::seed::SeedRecord;
//! use lineage::source::{MemoryCatalog, MemoryConnector, MemoryObject};
//!
//! # async fn example() {
//! let mut catalog = MemoryCatalog::new();
//! catalog
//!     .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
//!     .add_object("SrvA", "DbA", MemoryObject::view("dbo", "V").references("dbo", "T"));
//!
//! let mut runner = LineageRunner::new(
//!     TraceConfig::default(),
//!     Arc::new(MemoryConnector::new(catalog)),
//! );
//! let seed = SeedRecord {
//!     server: Some("SrvA".into()),
//!     database: Some("DbA".into()),
//!     table: Some("T".into()),
//!     ..SeedRecord::default()
//! };
//! let report = runner.run(&[seed]).await;
//! assert_eq!(report.links.len(), 1);
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod motive;
pub mod paths;
pub mod pool;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod seed;
pub mod source;
pub mod summary;
pub mod types;
pub mod validate;

// Public CLI module (needed by binary)
pub mod cli;

pub mod output;

pub use error::{Error, FailureKind, FailureRecord, Result};
pub use motive::{Motive, classify};
pub use report::{LineageReport, ReportLink};
pub use runner::LineageRunner;
pub use types::{DependencyEdge, LineageObject, ObjectKey, ObjectType, QualifiedName, Scope};
