//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use lineage::LineageReport;
use lineage::config::TraceConfig;
use lineage::runner::LineageRunner;
use lineage::seed::SeedRecord;
use lineage::source::memory::ConnectionStats;
use lineage::source::{MemoryCatalog, MemoryConnector, MemoryObject};

pub const SERVER: &str = "ServerA";
pub const DATABASE: &str = "DbA";

/// The reference scenario: view `dbo.V` reads table `dbo.T` and depends on
/// procedure `dbo.P`, which writes `dbo.Audit` and calls function `dbo.F`.
pub fn scenario_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog
        .add_object(SERVER, DATABASE, MemoryObject::table("dbo", "T"))
        .add_object(SERVER, DATABASE, MemoryObject::table("dbo", "Audit"))
        .add_object(
            SERVER,
            DATABASE,
            MemoryObject::function("dbo", "F")
                .with_definition("CREATE FUNCTION dbo.F() RETURNS INT AS BEGIN RETURN 1 END"),
        )
        .add_object(
            SERVER,
            DATABASE,
            MemoryObject::procedure("dbo", "P")
                .with_definition("CREATE PROCEDURE dbo.P AS INSERT INTO dbo.Audit VALUES (1)")
                .references("dbo", "Audit")
                .references("dbo", "F"),
        )
        .add_object(
            SERVER,
            DATABASE,
            MemoryObject::view("dbo", "V")
                .with_definition("CREATE VIEW dbo.V AS SELECT * FROM [dbo].[T] -- EXEC dbo.P")
                .references("dbo", "T")
                .references("dbo", "P"),
        );
    catalog
}

/// A seed row for `dbo.<table>`.
pub fn seed(server: &str, database: Option<&str>, table: &str) -> SeedRecord {
    SeedRecord {
        file_id: Some("sales.xlsx".to_string()),
        file_path: Some("/reports/sales".to_string()),
        server: Some(server.to_string()),
        database: database.map(str::to_string),
        schema: Some("dbo".to_string()),
        table: Some(table.to_string()),
    }
}

/// Runs the pipeline over `catalog` and returns the report with the
/// connector's connection counters.
pub async fn run(
    catalog: MemoryCatalog,
    config: TraceConfig,
    seeds: &[SeedRecord],
) -> (LineageReport, Arc<ConnectionStats>) {
    let connector = MemoryConnector::new(catalog);
    let stats = connector.stats();
    let mut runner = LineageRunner::new(config, Arc::new(connector));
    let report = runner.run(seeds).await;
    (report, stats)
}

/// Runs the lineage binary in `dir`.
pub fn run_lineage_in_dir(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lineage"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute lineage binary")
}
