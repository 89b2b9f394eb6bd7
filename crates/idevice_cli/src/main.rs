//! Command line entry point for stored iDevice snapshots.
//!
//! # Responsibility
//! - Provide a `ping` probe to verify `idevice_core` linkage.
//! - Print the binary, core and schema versions.
//! - Upgrade one JSON iDevice snapshot and report what the chain did.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idevice_core::{
    core_version, default_log_level, init_logging, latest_version, upgrade_idevice_with,
    GenericIdevice, UpgradeConfig, UpgradeReport,
};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit code for an upgrade that completed but dropped content.
const EXIT_DEGRADED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "idevice", version, about = "Inspect and upgrade stored generic iDevices")]
struct Cli {
    /// Log level: trace, debug, info, warn or error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logging stays off when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print core linkage and version information.
    Ping,
    /// Print the binary, core and iDevice schema versions.
    Version,
    /// Upgrade a JSON snapshot to the current iDevice version.
    Upgrade {
        /// Snapshot written by the package store.
        snapshot: PathBuf,

        /// JSON file with localized literals for marker-less documents.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the upgraded snapshot here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Exit non-zero when the upgrade left the node degraded.
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        let log_dir = log_dir
            .to_str()
            .context("log directory must be valid UTF-8")?;
        init_logging(level, log_dir).map_err(anyhow::Error::msg)?;
    }

    match cli.command {
        Command::Ping => {
            println!("idevice_core ping={}", idevice_core::ping());
            println!("idevice_core version={}", core_version());
            println!("idevice_core schema_version={}", latest_version());
            Ok(ExitCode::SUCCESS)
        }
        Command::Version => {
            println!("{}", version_line());
            Ok(ExitCode::SUCCESS)
        }
        Command::Upgrade {
            snapshot,
            config,
            output,
            strict,
        } => {
            let report = upgrade_file(&snapshot, config.as_deref(), output.as_deref())?;
            eprintln!(
                "upgraded {}: version {} -> {} ({} steps)",
                snapshot.display(),
                report.from_version,
                report.to_version,
                report.applied.len()
            );
            for issue in &report.issues {
                eprintln!("  issue: {issue}");
            }
            if strict && report.is_degraded() {
                return Ok(ExitCode::from(EXIT_DEGRADED));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn version_line() -> String {
    format!(
        "idevice {} (core {}, schema {})",
        env!("CARGO_PKG_VERSION"),
        core_version(),
        latest_version()
    )
}

fn upgrade_file(
    snapshot: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<UpgradeReport> {
    let config = match config {
        Some(path) => UpgradeConfig::from_json_file(path)?,
        None => UpgradeConfig::default(),
    };

    let raw = fs::read_to_string(snapshot)
        .with_context(|| format!("failed to read snapshot `{}`", snapshot.display()))?;
    let mut node: GenericIdevice = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not an iDevice snapshot", snapshot.display()))?;

    let report = upgrade_idevice_with(&mut node, &config)?;
    let rendered = serde_json::to_string_pretty(&node)?;
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            info!(
                "event=snapshot_write module=cli status=ok node_id={} path={}",
                node.id,
                path.display()
            );
        }
        None => println!("{rendered}"),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{upgrade_file, version_line, Cli, Command};
    use clap::Parser;
    use idevice_core::{latest_version, GenericIdevice};
    use std::fs;
    use std::path::Path;

    #[test]
    fn parses_upgrade_arguments() {
        let cli = Cli::try_parse_from([
            "idevice",
            "upgrade",
            "node.json",
            "--output",
            "out.json",
            "--strict",
            "--log-level",
            "debug",
        ])
        .expect("valid arguments");

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Upgrade {
                snapshot,
                output,
                strict,
                config,
            } => {
                assert_eq!(snapshot.to_str(), Some("node.json"));
                assert_eq!(output.as_deref().and_then(Path::to_str), Some("out.json"));
                assert!(strict);
                assert!(config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_version_subcommand() {
        let cli = Cli::try_parse_from(["idevice", "version"]).expect("valid arguments");
        assert!(matches!(cli.command, Command::Version));
        let line = version_line();
        assert!(line.starts_with("idevice "));
        assert!(line.ends_with(&format!("schema {})", latest_version())));
    }

    #[test]
    fn upgrade_file_writes_current_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("node.json");
        let output = dir.path().join("upgraded.json");
        fs::write(
            &input,
            r#"{
                "id": "n",
                "title": "Reading Activity 0.11",
                "class": "reading",
                "legacy_fields": [
                    { "field_type": "TextArea", "name": "Feedback", "content": "Nice" },
                    { "field_type": "Puzzle", "name": "Broken" }
                ]
            }"#,
        )
        .expect("write snapshot");

        let report =
            upgrade_file(&input, None, Some(output.as_path())).expect("upgrade succeeds");

        assert!(report.is_degraded());
        let written: GenericIdevice =
            serde_json::from_str(&fs::read_to_string(&output).expect("read output"))
                .expect("output is a snapshot");
        assert_eq!(written.stored_version, latest_version());
        assert_eq!(written.len(), 1);
        assert_eq!(written.title, "Reading Activity");
    }

    #[test]
    fn upgrade_file_reports_unreadable_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = upgrade_file(&dir.path().join("missing.json"), None, None)
            .expect_err("missing snapshot fails");
        assert!(format!("{err:#}").contains("failed to read snapshot"));
    }
}
