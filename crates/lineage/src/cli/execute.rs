//! Command execution logic.

use anyhow::{Context, Result, bail};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::args::{ClassifyArgs, TraceArgs, ValidateArgs};
use crate::config::{PASSWORD_ENV, TraceConfig};
use crate::motive::classify;
use crate::output::{self, OutputConfig, OutputMode};
use crate::paths::PathEnumerator;
use crate::report::write_exports;
use crate::runner::LineageRunner;
use crate::seed::load_seeds;
use crate::source::{Connector, MemoryCatalog, MemoryConnector, MssqlConnector};
use crate::summary::Summary;
use crate::validate::{load_links, validate_links};

/// Builds the run configuration: file values first, then flag overrides.
pub async fn resolve_config(args: &TraceArgs) -> Result<TraceConfig> {
    let mut config = match &args.config {
        Some(path) => TraceConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TraceConfig::default(),
    };

    if let Some(server) = &args.server {
        config.server_override = Some(server.clone());
    }
    if !args.fallback_databases.is_empty() {
        config.fallback_databases.clone_from(&args.fallback_databases);
    }
    if args.scan_all {
        config.scan_all_databases = true;
    }
    if let Some(depth) = args.max_depth {
        config.max_path_depth = usize::try_from(depth).context("--max-depth is too large")?;
    }
    if let Some(timeout) = args.timeout {
        config.connect_timeout_secs = timeout;
    }
    if !args.connection_strings.is_empty() {
        config.connection_strings.clone_from(&args.connection_strings);
    }
    if let Some(user) = &args.sql_user {
        config.sql_user = Some(user.clone());
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        config.sql_password = Some(password);
    }

    config.validate()?;
    Ok(config)
}

async fn connector(args: &TraceArgs, config: &TraceConfig) -> Result<Arc<dyn Connector>> {
    match &args.snapshot {
        Some(path) => {
            let catalog = MemoryCatalog::load(path)
                .await
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            tracing::info!(
                snapshot = %path.display(),
                databases = catalog.databases.len(),
                "replaying catalog snapshot"
            );
            Ok(Arc::new(MemoryConnector::new(catalog)))
        }
        None => {
            config.check_login()?;
            Ok(Arc::new(MssqlConnector::new(
                config.connection_strings.clone(),
                config.login(),
                config.connect_timeout(),
            )))
        }
    }
}

/// Execute the trace command
pub async fn execute_trace(args: &TraceArgs, output_mode: OutputMode) -> Result<()> {
    let config = resolve_config(args).await?;
    let connector = connector(args, &config).await?;

    let (seeds, warnings) = load_seeds(&args.seeds)
        .await
        .with_context(|| format!("Failed to read seeds from {}", args.seeds.display()))?;

    let mut runner = LineageRunner::new(config.clone(), connector);
    let report = runner.run(&seeds).await;

    let paths = PathEnumerator::new(&report.catalog, config.max_path_depth).enumerate(&report.roots);
    let files = write_exports(&args.out_dir, &report, &paths)
        .await
        .with_context(|| format!("Failed to write exports to {}", args.out_dir.display()))?;
    let summary = Summary::from_report(&report);

    match output_mode {
        OutputMode::Json => {
            output::print_json(&serde_json::json!({
                "summary": summary,
                "paths": paths.len(),
                "seed_warnings": warnings.len(),
                "files": files,
            }))?;
        }
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            output::write_summary(
                &mut handle,
                &summary,
                &files,
                warnings.len(),
                &OutputConfig::from_env(),
            )?;
        }
    }
    Ok(())
}

async fn read_definition(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read definition from stdin")?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read definition from {source}"))
    }
}

/// Execute the classify command
pub async fn execute_classify(args: &ClassifyArgs, output_mode: OutputMode) -> Result<()> {
    let definition = read_definition(&args.definition).await?;
    let motive = classify(Some(&definition), &args.table.schema, &args.table.table);

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "schema": args.table.schema,
            "table": args.table.table,
            "motive": motive,
        }))?,
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            output::write_motive(
                &mut handle,
                &args.table.schema,
                &args.table.table,
                motive,
                &OutputConfig::from_env(),
            )?;
        }
    }
    Ok(())
}

/// Execute the validate command
///
/// Fails when any anomaly is found, so scripts can gate on the exit code.
pub async fn execute_validate(args: &ValidateArgs, output_mode: OutputMode) -> Result<()> {
    let (links, warnings) = load_links(&args.links)
        .await
        .with_context(|| format!("Failed to read links from {}", args.links.display()))?;
    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "skipped malformed link records");
    }
    let anomalies = validate_links(&links);

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "records": links.len(),
            "skipped": warnings.len(),
            "anomalies": anomalies,
        }))?,
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            output::write_anomalies(&mut handle, links.len(), &anomalies, &OutputConfig::from_env())?;
        }
    }

    if !anomalies.is_empty() {
        bail!(
            "{} anomalies found in {}",
            anomalies.len(),
            args.links.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::Commands;

    fn trace_args(extra: &[&str]) -> TraceArgs {
        let mut argv = vec!["lineage", "trace", "--seeds", "seeds.jsonl"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Trace(args)) => args,
            _ => panic!("Expected Trace command"),
        }
    }

    #[tokio::test]
    async fn flags_override_defaults() {
        let args = trace_args(&[
            "--server",
            "SrvB",
            "--fallback-db",
            "Stage,Mart",
            "--scan-all",
            "--max-depth",
            "3",
            "--timeout",
            "5",
        ]);
        let config = resolve_config(&args).await.unwrap();

        assert_eq!(config.server_override.as_deref(), Some("SrvB"));
        assert_eq!(config.fallback_databases, vec!["Stage", "Mart"]);
        assert!(config.scan_all_databases);
        assert_eq!(config.max_path_depth, 3);
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[tokio::test]
    async fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.yaml");
        tokio::fs::write(&path, "fallback-databases: [Stage]\nmax-path-depth: 7\n")
            .await
            .unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let args = trace_args(&["--config", path_arg.as_str(), "--max-depth", "2"]);
        let config = resolve_config(&args).await.unwrap();

        assert_eq!(config.fallback_databases, vec!["Stage"]);
        assert_eq!(config.max_path_depth, 2);
    }

    #[tokio::test]
    async fn template_without_server_is_rejected() {
        let args = trace_args(&["--connection-string", "database={database}"]);
        assert!(resolve_config(&args).await.is_err());
    }

    #[tokio::test]
    async fn live_trace_without_sql_user_fails_before_connecting() {
        let args = trace_args(&[]);
        let config = resolve_config(&args).await.unwrap();
        assert!(connector(&args, &config).await.is_err());

        let args = trace_args(&["--sql-user", "svc_lineage"]);
        let config = resolve_config(&args).await.unwrap();
        assert_eq!(config.sql_user.as_deref(), Some("svc_lineage"));
        assert!(connector(&args, &config).await.is_ok());
    }

    #[tokio::test]
    async fn classify_reads_definition_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proc.sql");
        tokio::fs::write(&path, "CREATE PROC p AS UPDATE dbo.T SET x = 1")
            .await
            .unwrap();
        let definition = read_definition(&path.to_string_lossy()).await.unwrap();
        assert!(definition.contains("UPDATE"));
    }
}
