//! Resilient loading of seed-style JSONL files.
//!
//! Seed files are hand-edited exports, so loading must keep every good line
//! and report every bad one with its line number.

use lineage_jsonl::{Warning, read_jsonl_resilient, write_jsonl_atomic};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;

// =============================================================================
// Test Data Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SeedRow {
    server: String,
    table: String,
    #[serde(default)]
    schema: Option<String>,
}

fn file_with(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// Loading Tests
// =============================================================================

#[tokio::test]
async fn all_valid_lines_load_without_warnings() {
    let file = file_with(
        "{\"server\":\"SrvA\",\"table\":\"T\"}\n{\"server\":\"SrvA\",\"table\":\"U\",\"schema\":\"stg\"}\n",
    );

    let (rows, warnings): (Vec<SeedRow>, _) = read_jsonl_resilient(file.path()).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert!(warnings.is_empty());
    assert_eq!(rows[1].schema.as_deref(), Some("stg"));
}

#[tokio::test]
async fn malformed_lines_become_warnings_with_line_numbers() {
    let file = file_with(
        "{\"server\":\"SrvA\",\"table\":\"T\"}\n\
         {not json}\n\
         \n\
         {\"server\":\"SrvA\"}\n\
         {\"server\":\"SrvB\",\"table\":\"X\"}\n",
    );

    let (rows, warnings): (Vec<SeedRow>, _) = read_jsonl_resilient(file.path()).await.unwrap();

    assert_eq!(rows.len(), 2, "good lines before and after the bad ones survive");
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].line_number(), 2);
    assert_eq!(warnings[1].line_number(), 4, "blank line still counts toward numbering");
    assert!(warnings.iter().all(|w| matches!(w, Warning::MalformedJson { .. })));
}

#[tokio::test]
async fn empty_file_loads_nothing() {
    let file = file_with("");
    let (rows, warnings): (Vec<SeedRow>, _) = read_jsonl_resilient(file.path()).await.unwrap();
    assert!(rows.is_empty());
    assert!(warnings.is_empty());
}

#[tokio::test]
async fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result: lineage_jsonl::Result<(Vec<SeedRow>, _)> =
        read_jsonl_resilient(dir.path().join("absent.jsonl")).await;
    assert!(matches!(result, Err(lineage_jsonl::Error::Io(_))));
}

#[tokio::test]
async fn atomic_export_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seeds.jsonl");
    let rows = vec![
        SeedRow {
            server: "SrvA".into(),
            table: "T".into(),
            schema: None,
        },
        SeedRow {
            server: "SrvB".into(),
            table: "Orders".into(),
            schema: Some("sales".into()),
        },
    ];

    write_jsonl_atomic(&path, &rows).await.unwrap();
    let (loaded, warnings): (Vec<SeedRow>, _) = read_jsonl_resilient(&path).await.unwrap();

    assert!(warnings.is_empty());
    assert_eq!(loaded, rows);
}
