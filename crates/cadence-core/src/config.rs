use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG";
/// Prefix of environment overrides; nested keys are joined with `__`,
/// e.g. `CADENCE_SCHEDULER__DEFAULT_LOOKBACK=3`.
pub const ENV_PREFIX: &str = "CADENCE_";

pub const DEFAULT_LOOKBACK: u32 = 7;
pub const DEFAULT_WORK_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_LOG_FILTER: &str = "cadence_cli=info,cadence_scheduler=info";

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Run defaults used by the CLI when flags are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Periods to look back when `--lookback` is not given.
    #[serde(default = "default_lookback")]
    pub default_lookback: u32,
    /// Upper bound on one work invocation; exceeding it fails the delta.
    #[serde(default = "default_work_timeout_secs")]
    pub work_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_lookback: DEFAULT_LOOKBACK,
            work_timeout_secs: DEFAULT_WORK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK
}
fn default_work_timeout_secs() -> u64 {
    DEFAULT_WORK_TIMEOUT_SECS
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// The file is taken from, in order:
    ///   1. Explicit path argument
    ///   2. `$CADENCE_CONFIG`
    ///   3. ~/.cadence/cadence.toml
    ///
    /// A missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");

        let config: CadenceConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
            .extract()
            .map_err(|e| crate::error::CadenceError::Config(e.to_string()))?;

        if config.scheduler.work_timeout_secs == 0 {
            return Err(crate::error::CadenceError::Config(
                "scheduler.work_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = CadenceConfig::load(Some("does-not-exist.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.default_lookback, DEFAULT_LOOKBACK);
            assert_eq!(config.scheduler.work_timeout_secs, DEFAULT_WORK_TIMEOUT_SECS);
            assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
            assert!(config.database.path.ends_with("/.cadence/cadence.db"));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                [database]
                path = "/var/lib/cadence/file.db"

                [scheduler]
                default_lookback = 24
                "#,
            )?;
            jail.set_env("CADENCE_SCHEDULER__DEFAULT_LOOKBACK", "3");

            let config = CadenceConfig::load(Some("cadence.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.database.path, "/var/lib/cadence/file.db");
            assert_eq!(config.scheduler.default_lookback, 3);
            Ok(())
        });
    }

    #[test]
    fn config_env_var_selects_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file("alt.toml", "[log]\nfilter = \"debug\"\n")?;
            jail.set_env(CONFIG_PATH_ENV, "alt.toml");

            let config = CadenceConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.log.filter, "debug");
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("cadence.toml", "[scheduler]\nwork_timeout_secs = 0\n")?;
            let err = CadenceConfig::load(Some("cadence.toml")).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
            Ok(())
        });
    }
}
