//! Configuration for the PD client

use crate::common::{Error, Result};
use crate::pd::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix (`MINIPD_PD_ADDRS`, `MINIPD_TIMEOUT_MS`, ...)
pub const ENV_PREFIX: &str = "MINIPD";

/// PD client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdConfig {
    /// Seed addresses of the PD cluster, tried in order
    #[serde(default)]
    pub pd_addrs: Vec<String>,

    /// Deadline applied to every unary call attempt
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Connection establishment timeout for new channels
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Total attempts per call before the last error is surfaced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Period of the background leader refresh
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// How long a newly installed leader is trusted before another
    /// failover may replace it; defaults to the refresh interval
    #[serde(default)]
    pub failover_gate_ms: Option<u64>,

    /// Isolation level attached to resolved regions
    #[serde(default)]
    pub isolation_level: IsolationLevel,

    /// PEM CA bundle; when set, PD is reached over TLS
    #[serde(default)]
    pub tls_ca_path: Option<PathBuf>,

    /// Server name checked against the PD certificate
    #[serde(default)]
    pub tls_domain: Option<String>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_timeout() -> u64 {
    2_000
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_max_attempts() -> usize {
    3
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PdConfig {
    fn default() -> Self {
        Self {
            pd_addrs: vec!["127.0.0.1:2379".to_string()],
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            max_attempts: default_max_attempts(),
            refresh_interval_secs: default_refresh_interval(),
            failover_gate_ms: None,
            isolation_level: IsolationLevel::default(),
            tls_ca_path: None,
            tls_domain: None,
            log_level: default_log_level(),
        }
    }
}

impl PdConfig {
    /// Config pointing at the given seeds, defaults elsewhere.
    pub fn new<I, S>(pd_addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pd_addrs: pd_addrs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Load configuration from an optional TOML file, then `MINIPD_*`
    /// environment variables (environment wins).
    ///
    /// The result is not validated; [`PdConfig::validate`] runs when a
    /// client connects.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pd_addrs"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject configurations the client cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.pd_addrs.iter().all(|addr| addr.trim().is_empty()) {
            return Err(Error::InvalidConfig("no PD address specified".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be at least 1".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "refresh_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn failover_gate(&self) -> Duration {
        self.failover_gate_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.refresh_interval())
    }
}
