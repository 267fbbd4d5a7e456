use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::AggregatorConfig;
use crate::supervisor::SupervisorConfig;

const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Directory holding the worker and its manifest.
    pub path: PathBuf,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub should_restart: bool,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Don't echo worker output to the log.
    #[serde(default)]
    pub suppress_console: bool,
}

fn default_manifest() -> String {
    "package.json".into()
}

fn default_command() -> String {
    "node".into()
}

fn default_args() -> Vec<String> {
    vec![".".into()]
}

fn default_restart_delay_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Skip persisting rollups to disk.
    #[serde(default)]
    pub disable_logs: bool,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            disable_logs: false,
            logs_dir: default_logs_dir(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    30_000
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Boolean gate for the authenticated query variants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub require_api_key: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ApiConfig {
    /// Whether a request presenting `key` gets raw (non-normalized) values.
    pub fn is_authorized(&self, key: Option<&str>) -> bool {
        if !self.require_api_key {
            return true;
        }
        match (self.api_key.as_deref(), key) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.worker.path.as_os_str().is_empty(),
            "worker.path must be non-empty"
        );
        anyhow::ensure!(
            !self.worker.manifest.is_empty(),
            "worker.manifest must be non-empty"
        );
        anyhow::ensure!(
            !self.worker.command.is_empty(),
            "worker.command must be non-empty"
        );
        anyhow::ensure!(
            self.worker.restart_delay_ms > 0,
            "worker.restart_delay_ms must be > 0, got {}",
            self.worker.restart_delay_ms
        );
        anyhow::ensure!(
            self.analytics.tick_interval_ms >= 1000,
            "analytics.tick_interval_ms must be >= 1000, got {}",
            self.analytics.tick_interval_ms
        );
        anyhow::ensure!(
            MS_PER_HOUR % self.analytics.tick_interval_ms == 0,
            "analytics.tick_interval_ms must divide one hour evenly, got {}",
            self.analytics.tick_interval_ms
        );
        anyhow::ensure!(
            !self.analytics.logs_dir.as_os_str().is_empty(),
            "analytics.logs_dir must be non-empty"
        );
        anyhow::ensure!(
            !self.api.require_api_key || self.api.api_key.as_deref().is_some_and(|k| !k.is_empty()),
            "api.api_key must be set when api.require_api_key is true"
        );
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            tick_interval: Duration::from_millis(self.analytics.tick_interval_ms),
            logs_dir: self.analytics.logs_dir.clone(),
            disable_logs: self.analytics.disable_logs,
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            worker_path: self.worker.path.clone(),
            manifest_file: self.worker.manifest.clone(),
            should_restart: self.worker.should_restart,
            restart_delay: Duration::from_millis(self.worker.restart_delay_ms),
            suppress_console: self.worker.suppress_console,
            logs_dir: self.analytics.logs_dir.clone(),
        }
    }
}
