use std::process::ExitCode;

use cadence_core::config::CadenceConfig;
use cadence_core::CadenceError;
use cadence_scheduler::SqliteStore;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod commands;
mod work;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let (config, fallback) = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.code());
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .init();

    if let Some(e) = fallback {
        tracing::warn!("Config load failed ({}), using defaults", e);
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.database.path.clone());
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = SqliteStore::new(db)?;

    let outcome = match cli.command {
        Commands::Task(cmd) => commands::task::execute(cmd, &store).map(|()| ExitCode::SUCCESS),
        Commands::Dep(cmd) => commands::dep::execute(cmd, &store).map(|()| ExitCode::SUCCESS),
        Commands::Ledger(args) => commands::ledger::execute(args, &store).map(|()| ExitCode::SUCCESS),
        Commands::Run(args) => commands::run::execute(args, store, &config.scheduler)
            .await
            .and_then(|report| {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(if report.is_scope_mismatch() || report.has_failures() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                })
            }),
    };

    match outcome {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(code = e.code(), "{e}");
            eprintln!("error [{}]: {e}", e.code());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load the config. A file named with `--config` must load; the implicit
/// locations fall back to defaults and hand back the error to log once
/// tracing is up.
fn load_config(
    explicit: Option<&str>,
) -> cadence_core::Result<(CadenceConfig, Option<CadenceError>)> {
    match CadenceConfig::load(explicit) {
        Ok(config) => Ok((config, None)),
        Err(e) if explicit.is_some() => Err(e),
        Err(e) => Ok((CadenceConfig::default(), Some(e))),
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn explicit_config_error_is_fatal() {
        let file = config_file("[scheduler]\nwork_timeout_secs = 0\n");
        let err = load_config(file.path().to_str()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn explicit_config_is_used() {
        let file = config_file("[scheduler]\ndefault_lookback = 5\n");
        let (config, fallback) = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.scheduler.default_lookback, 5);
        assert!(fallback.is_none());
    }
}
