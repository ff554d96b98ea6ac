//! Daemon configuration
//!
//! Layered: built-in defaults, then an optional `cadence.toml`, then
//! `CADENCE_*` environment variables (`__` separates nested keys).

use anyhow::{bail, Context, Result};
use cadence_core::application::retry::{DEFAULT_STORE_ATTEMPTS, DEFAULT_STORE_BASE_DELAY_MS};
use cadence_core::application::scheduler::constants::{
    DEFAULT_JITTER_MAX_MS, DEFAULT_JITTER_MIN_MS, DEFAULT_RECORD_SLACK_MS,
};
use cadence_core::application::{SchedulerConfig, StoreRetry};
use cadence_core::domain::ScheduleExpr;
use cadence_core::port::ConfigSource;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CADENCE";
const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG";
const CONFIG_FILE_NAME: &str = "cadence.toml";
const DEFAULT_DB_FILE: &str = "locks.db";
const DEFAULT_MAINTENANCE_SCHEDULE: &str = "0 */10 * * * *";

/// Configuration key the built-in maintenance task reads its schedule from
pub const MAINTENANCE_SCHEDULE_KEY: &str = "maintenance_schedule";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Shared SQLite lock store; every instance of a fleet points at the same file
    pub db_path: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    /// Replaces the detected host name in this instance's identity
    pub instance_host: Option<String>,
    pub log_format: String,
    pub log_dir: Option<PathBuf>,
    /// Notify command run for every alert; alerts are only logged when unset
    pub alert_command: Option<String>,
    pub dispatcher_threads: usize,
    pub lock_retry_attempts: u32,
    pub lock_retry_base_delay_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub record_slack_ms: i64,
    pub maintenance_schedule: String,
    /// Per-task schedule overrides keyed by task id
    #[serde(default)]
    pub schedules: HashMap<String, String>,
}

impl Settings {
    /// Load from `CADENCE_CONFIG` or the per-user config directory
    pub fn load() -> Result<(Self, SettingsSource)> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME)));
        Self::load_from(path.as_deref())
    }

    /// Load with `path` as the (optional) config file
    pub fn load_from(path: Option<&Path>) -> Result<(Self, SettingsSource)> {
        let mut builder = Config::builder()
            .set_default("db_path", default_db_path().to_string_lossy().to_string())?
            .set_default("rpc_host", cadence_api_rpc::server::DEFAULT_RPC_HOST)?
            .set_default("rpc_port", i64::from(cadence_api_rpc::server::DEFAULT_RPC_PORT))?
            .set_default("log_format", "pretty")?
            .set_default(
                "dispatcher_threads",
                SchedulerConfig::default().dispatcher_threads as i64,
            )?
            .set_default("lock_retry_attempts", i64::from(DEFAULT_STORE_ATTEMPTS))?
            .set_default("lock_retry_base_delay_ms", DEFAULT_STORE_BASE_DELAY_MS as i64)?
            .set_default("jitter_min_ms", DEFAULT_JITTER_MIN_MS as i64)?
            .set_default("jitter_max_ms", DEFAULT_JITTER_MAX_MS as i64)?
            .set_default("record_slack_ms", DEFAULT_RECORD_SLACK_MS)?
            .set_default(MAINTENANCE_SCHEDULE_KEY, DEFAULT_MAINTENANCE_SCHEDULE)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let settings: Settings = config
            .clone()
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;

        let source = SettingsSource {
            config,
            schedules: settings.schedules.clone(),
        };
        Ok((settings, source))
    }

    /// Reject values the scheduler cannot run with, naming the key
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher_threads == 0 {
            bail!("dispatcher_threads must be at least 1");
        }
        if self.lock_retry_attempts == 0 {
            bail!("lock_retry_attempts must be at least 1");
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            bail!(
                "jitter_min_ms ({}) must not exceed jitter_max_ms ({})",
                self.jitter_min_ms,
                self.jitter_max_ms
            );
        }
        if self.record_slack_ms < 0 {
            bail!("record_slack_ms must not be negative");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            bail!("log_format must be 'json' or 'pretty', got '{}'", self.log_format);
        }
        ScheduleExpr::parse(&self.maintenance_schedule)
            .with_context(|| format!("Invalid {}", MAINTENANCE_SCHEDULE_KEY))?;
        for (task_id, expr) in &self.schedules {
            ScheduleExpr::parse(expr).with_context(|| format!("Invalid schedules.\"{}\"", task_id))?;
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            dispatcher_threads: self.dispatcher_threads,
            store_retry: StoreRetry::new(self.lock_retry_attempts, self.lock_retry_base_delay_ms),
            jitter_min_ms: self.jitter_min_ms,
            jitter_max_ms: self.jitter_max_ms,
            record_slack_ms: self.record_slack_ms,
        }
    }
}

/// `ConfigSource` over the loaded configuration
#[derive(Debug)]
pub struct SettingsSource {
    config: Config,
    schedules: HashMap<String, String>,
}

impl ConfigSource for SettingsSource {
    fn get_string(&self, key: &str) -> Option<String> {
        // Task ids contain dots, so overrides are matched against the table directly
        if let Some(task_id) = key.strip_prefix("schedules.") {
            return self
                .schedules
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(task_id))
                .map(|(_, v)| v.clone());
        }
        self.config.get_string(key).ok()
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "cadence", "cadence")
}

fn default_db_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let missing = std::env::temp_dir().join("cadence-no-such-config.toml");
        let (settings, source) = Settings::load_from(Some(&missing)).unwrap();

        assert_eq!(settings.rpc_host, "127.0.0.1");
        assert_eq!(settings.maintenance_schedule, DEFAULT_MAINTENANCE_SCHEDULE);
        assert!(settings.dispatcher_threads >= 1);
        assert_eq!(
            source.get_string(MAINTENANCE_SCHEDULE_KEY).as_deref(),
            Some(DEFAULT_MAINTENANCE_SCHEDULE)
        );
    }

    #[test]
    fn test_file_values_and_schedule_overrides() {
        let file = write_config(
            r#"
            rpc_port = 9600
            jitter_min_ms = 5
            jitter_max_ms = 50
            report_period = "0 0 * * * *"

            [schedules]
            "lockStore.purgeExpired" = "0 */1 * * * *"
            "#,
        );
        let (settings, source) = Settings::load_from(Some(file.path())).unwrap();

        assert_eq!(settings.rpc_port, 9600);
        assert_eq!(settings.scheduler_config().jitter_max_ms, 50);
        assert_eq!(source.get_string("report_period").as_deref(), Some("0 0 * * * *"));
        assert_eq!(
            source.get_string("schedules.lockStore.purgeExpired").as_deref(),
            Some("0 */1 * * * *")
        );
        assert_eq!(source.get_string("schedules.other.task"), None);
    }

    #[test]
    fn test_inverted_jitter_is_rejected() {
        let file = write_config("jitter_min_ms = 500\njitter_max_ms = 10\n");
        let err = Settings::load_from(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("jitter_min_ms"));
    }

    #[test]
    fn test_bad_override_names_task() {
        let file = write_config("[schedules]\n\"billing.sweep\" = \"not a cron\"\n");
        let err = Settings::load_from(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("billing.sweep"));
    }
}
