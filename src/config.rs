//! Server configuration
//!
//! Loaded from a TOML file (path in `INGEST_CONFIG`, or `./ingest.toml` when
//! present), then overridden field by field from `INGEST_*` environment
//! variables. Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! listen_addr = "0.0.0.0:8000"
//! database_path = "./data/events.db"
//! api_key = "demo-key"
//! tenant = "demo-tenant"
//! probe_mode = "backoff"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::auth::TenantAuth;
use crate::error::ConfigError;
use crate::pipeline::{millis, FlushConfig, MonitorConfig, PipelineConfig, ProbeSchedule};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "INGEST_CONFIG";

/// Config file picked up from the working directory when `INGEST_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "ingest.toml";

/// How the health monitor spaces its probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    Fixed,
    Backoff,
}

impl FromStr for ProbeMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ProbeMode::Fixed),
            "backoff" => Ok(ProbeMode::Backoff),
            _ => Err(()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name reported in logs
    pub app_name: String,

    /// HTTP server address
    pub listen_addr: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// How long a SQLite session waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,

    /// Expected `X-API-Key`; unset disables enforcement
    pub api_key: Option<String>,

    /// Tenant bound to the API key; unset disables enforcement
    pub tenant: Option<String>,

    /// HS256 secret for bearer tokens; unset disables bearer auth
    pub jwt_secret: Option<String>,

    /// Deployment environment label
    pub env: String,

    /// Maximum events per flush transaction
    pub batch_size: usize,

    /// Pause between flush iterations, in milliseconds
    pub flush_interval_ms: u64,

    /// Concurrent storage sessions (flush + reads)
    pub max_sessions: usize,

    /// Per-request event limit
    pub max_events_per_request: usize,

    pub probe_mode: ProbeMode,

    /// Probe period in fixed mode, and the slow period in backoff mode
    pub probe_interval_secs: u64,

    pub probe_fast_interval_secs: u64,

    /// Consecutive failures probed at the fast period before slowing down
    pub probe_fast_attempts: u32,

    pub probe_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_name: "Temporallayr".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            database_path: PathBuf::from("./data/events.db"),
            busy_timeout_ms: 5000,
            api_key: Some("demo-key".to_string()),
            tenant: Some("demo-tenant".to_string()),
            jwt_secret: None,
            env: "development".to_string(),
            batch_size: 100,
            flush_interval_ms: 1000,
            max_sessions: 10,
            max_events_per_request: 100,
            probe_mode: ProbeMode::Backoff,
            probe_interval_secs: 30,
            probe_fast_interval_secs: 10,
            probe_fast_attempts: 5,
            probe_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load from file and process environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path_str.clone(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?;
        info!(path = %path_str, "Loaded configuration from file");
        Ok(config)
    }

    /// Apply `INGEST_*` overrides using `lookup` to read variables
    ///
    /// An empty `INGEST_API_KEY`, `INGEST_TENANT` or `INGEST_JWT_SECRET`
    /// clears the setting.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INGEST_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = lookup("INGEST_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("INGEST_API_KEY") {
            self.api_key = non_empty(v);
        }
        if let Some(v) = lookup("INGEST_TENANT") {
            self.tenant = non_empty(v);
        }
        if let Some(v) = lookup("INGEST_JWT_SECRET") {
            self.jwt_secret = non_empty(v);
        }
        if let Some(v) = lookup("INGEST_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = parse_env("INGEST_BUSY_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("INGEST_ENV") {
            self.env = v;
        }
        if let Some(v) = lookup("INGEST_MAX_SESSIONS") {
            self.max_sessions = parse_env("INGEST_MAX_SESSIONS", v)?;
        }
        if let Some(v) = lookup("INGEST_BATCH_SIZE") {
            self.batch_size = parse_env("INGEST_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("INGEST_FLUSH_INTERVAL_MS") {
            self.flush_interval_ms = parse_env("INGEST_FLUSH_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("INGEST_PROBE_MODE") {
            self.probe_mode = parse_env("INGEST_PROBE_MODE", v)?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.batch_size, "batch_size"),
            (self.max_sessions, "max_sessions"),
            (self.max_events_per_request, "max_events_per_request"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe_timeout_secs must be greater than 0".to_string(),
            ));
        }
        match self.probe_mode {
            ProbeMode::Fixed if self.probe_interval_secs == 0 => Err(ConfigError::Invalid(
                "probe_interval_secs must be greater than 0".to_string(),
            )),
            ProbeMode::Backoff
                if self.probe_interval_secs == 0 || self.probe_fast_interval_secs == 0 =>
            {
                Err(ConfigError::Invalid(
                    "probe intervals must be greater than 0".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Subsystem knobs derived from this config
    pub fn pipeline_config(&self) -> PipelineConfig {
        let schedule = match self.probe_mode {
            ProbeMode::Fixed => ProbeSchedule::Fixed {
                interval: Duration::from_secs(self.probe_interval_secs),
            },
            ProbeMode::Backoff => ProbeSchedule::Backoff {
                fast_interval: Duration::from_secs(self.probe_fast_interval_secs),
                slow_interval: Duration::from_secs(self.probe_interval_secs),
                fast_attempts: self.probe_fast_attempts,
            },
        };

        PipelineConfig {
            flush: FlushConfig {
                batch_size: self.batch_size,
                idle_interval: millis(self.flush_interval_ms),
            },
            monitor: MonitorConfig {
                schedule,
                probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            },
            max_sessions: self.max_sessions,
            max_events_per_request: self.max_events_per_request,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        millis(self.busy_timeout_ms)
    }

    /// Tenant resolver for the HTTP layer
    pub fn tenant_auth(&self) -> TenantAuth {
        let auth = TenantAuth::new(self.api_key.clone(), self.tenant.clone());
        match &self.jwt_secret {
            Some(secret) => auth.with_jwt_secret(secret),
            None => auth,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
