//! Integration tests for the lineage CLI.
//!
//! These tests run the binary end to end against a snapshot file, so no
//! database server is needed.

use rstest::{fixture, rstest};
use std::path::Path;
use tempfile::TempDir;

mod common;
use common::{run_lineage_in_dir, scenario_catalog};

// ============================================================================
// Test Fixtures
// ============================================================================

/// A directory holding a scenario snapshot and a seed file.
#[fixture]
fn workspace() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let snapshot = serde_json::to_string_pretty(&scenario_catalog()).unwrap();
    std::fs::write(temp.path().join("snapshot.json"), snapshot).unwrap();
    std::fs::write(
        temp.path().join("seeds.jsonl"),
        concat!(
            "{\"File_name\":\"sales.xlsx\",\"Path_File\":\"/reports\",\"Server\":\"ServerA\",",
            "\"Database\":\"DbA\",\"Schema\":\"dbo\",\"Table\":\"T\"}\n",
            "{\"File_name\":\"sales.xlsx\",\"Path_File\":\"/reports\",\"Server\":\"ServerA\",",
            "\"Database\":\"DbA\",\"Schema\":\"dbo\",\"Table\":\"Missing\"}\n",
        ),
    )
    .unwrap();
    temp
}

fn trace(dir: &Path, extra: &[&str]) -> std::process::Output {
    let mut args = vec![
        "trace",
        "--seeds",
        "seeds.jsonl",
        "--snapshot",
        "snapshot.json",
        "--out-dir",
        "out",
    ];
    args.extend_from_slice(extra);
    run_lineage_in_dir(dir, &args)
}

// ============================================================================
// Help
// ============================================================================

#[rstest]
fn test_cli_help_shows_all_commands(workspace: TempDir) {
    let output = run_lineage_in_dir(workspace.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trace"));
    assert!(stdout.contains("classify"));
    assert!(stdout.contains("validate"));
}

// ============================================================================
// Trace
// ============================================================================

#[rstest]
fn test_trace_writes_exports_and_summary(workspace: TempDir) {
    let output = trace(workspace.path(), &[]);

    assert!(
        output.status.success(),
        "trace failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Lineage summary"));
    assert!(stdout.contains("Objects:       3"));
    assert!(stdout.contains("Failures:      1"));

    for file in [
        "links.jsonl",
        "edges.jsonl",
        "objects.jsonl",
        "failures.jsonl",
        "paths.jsonl",
        "migration_order.jsonl",
    ] {
        assert!(workspace.path().join("out").join(file).exists(), "{file} missing");
    }
}

#[rstest]
fn test_trace_json_output(workspace: TempDir) {
    let output = trace(workspace.path(), &["--json", "--max-depth", "2"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["total_objects"], 3);
    assert_eq!(json["summary"]["failures"], 1);
    assert_eq!(json["paths"], 1);
    assert_eq!(json["files"].as_array().unwrap().len(), 6);
}

#[rstest]
fn test_trace_missing_seed_file_fails(workspace: TempDir) {
    let output = run_lineage_in_dir(
        workspace.path(),
        &["trace", "--seeds", "nope.jsonl", "--snapshot", "snapshot.json"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.jsonl"));
}

// ============================================================================
// Validate
// ============================================================================

#[rstest]
fn test_validate_accepts_traced_links(workspace: TempDir) {
    assert!(trace(workspace.path(), &[]).status.success());

    let output = run_lineage_in_dir(workspace.path(), &["validate", "--links", "out/links.jsonl"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no anomalies"));
}

#[rstest]
fn test_validate_rejects_bad_links(workspace: TempDir) {
    std::fs::write(
        workspace.path().join("bad.jsonl"),
        "{\"root\":{\"schema\":\"dbo\",\"table\":\"T\"},\"motive\":\"Boh\"}\n",
    )
    .unwrap();

    let output = run_lineage_in_dir(workspace.path(), &["validate", "--links", "bad.jsonl"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("invalid motive: Boh"));
    assert!(stdout.contains("missing root metadata"));
}

// ============================================================================
// Classify
// ============================================================================

#[rstest]
#[case("INSERT INTO dbo.T (a) VALUES (1)", "dbo.T: Scrittura")]
#[case("SELECT * FROM [dbo].[T]", "dbo.T: Lettura")]
#[case("SELECT 1", "dbo.T: Lettura")]
#[case("  \n", "dbo.T: Sconosciuto")]
fn test_classify_definition_file(
    workspace: TempDir,
    #[case] definition: &str,
    #[case] expected: &str,
) {
    std::fs::write(workspace.path().join("def.sql"), definition).unwrap();

    let output = run_lineage_in_dir(
        workspace.path(),
        &["classify", "--definition", "def.sql", "--table", "dbo.T"],
    );

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), expected);
}
