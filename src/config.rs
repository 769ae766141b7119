use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::store::{DEFAULT_HISTORY_CAPACITY, DEFAULT_LIMIT};
use crate::telemetry::WireLayout;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            bind: default_bind(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_udp_host")]
    pub host: String,
    #[serde(default = "default_pvt_port")]
    pub pvt_port: u16,
    #[serde(default = "default_observables_port")]
    pub observables_port: u16,
    /// Schema of both streams.
    #[serde(default)]
    pub layout: WireLayout,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl TelemetryConfig {
    pub fn pvt_addr(&self) -> String {
        format!("{}:{}", self.host, self.pvt_port)
    }

    pub fn observables_addr(&self) -> String {
        format!("{}:{}", self.host, self.observables_port)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            host: default_udp_host(),
            pvt_port: default_pvt_port(),
            observables_port: default_observables_port(),
            layout: WireLayout::default(),
            history_capacity: default_history_capacity(),
            default_limit: default_limit(),
        }
    }
}

fn default_udp_host() -> String {
    "0.0.0.0".to_string()
}

fn default_pvt_port() -> u16 {
    1234
}

fn default_observables_port() -> u16 {
    1111
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Frames queued per client before it is dropped as too slow.
    #[serde(default = "default_backlog")]
    pub backlog: usize,
    #[serde(default = "default_write_timeout", deserialize_with = "humantime_duration")]
    pub write_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            backlog: default_backlog(),
            write_timeout: default_write_timeout(),
        }
    }
}

fn default_backlog() -> usize {
    64
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_stop_timeout", deserialize_with = "humantime_duration")]
    pub stop_timeout: Duration,
    /// Child stdout/stderr are written here when set.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            program: default_program(),
            stop_timeout: default_stop_timeout(),
            log_dir: None,
            profiles: BTreeMap::new(),
        }
    }
}

fn default_program() -> String {
    "gnss-sdr".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// Overrides `supervisor.program` for this profile.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.telemetry;
        if t.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.history_capacity must be at least 1".into(),
            ));
        }
        if t.pvt_port != 0 && t.pvt_port == t.observables_port {
            return Err(ConfigError::Invalid(format!(
                "pvt and observables streams cannot share port {}",
                t.pvt_port
            )));
        }
        if self.broadcast.backlog == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.backlog must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_str("{}").unwrap();
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.telemetry.pvt_port, 1234);
        assert_eq!(config.telemetry.observables_port, 1111);
        assert_eq!(config.telemetry.default_limit, 64);
        assert_eq!(config.supervisor.program, "gnss-sdr");
        assert_eq!(config.supervisor.stop_timeout, Duration::from_secs(5));
        assert!(config.supervisor.profiles.is_empty());
    }

    #[test]
    fn parses_profiles_and_durations() {
        let yaml = r#"
telemetry:
  layout: gnss_sdr_protobuf
  history_capacity: 32
broadcast:
  backlog: 8
  write_timeout: 1500ms
supervisor:
  stop_timeout: 2s
  log_dir: /tmp/gnss
  profiles:
    conf1:
      config_file: conf/gps_l1.conf
    conf3:
      program: /opt/gnss-sdr/bin/gnss-sdr
      config_file: conf/leo.conf
      args: ["--log_dir=/tmp"]
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.telemetry.layout, WireLayout::GnssSdrProtobuf);
        assert_eq!(config.broadcast.write_timeout, Duration::from_millis(1500));
        assert_eq!(config.supervisor.stop_timeout, Duration::from_secs(2));
        let leo = &config.supervisor.profiles["conf3"];
        assert_eq!(leo.program.as_deref(), Some("/opt/gnss-sdr/bin/gnss-sdr"));
        assert_eq!(leo.args, vec!["--log_dir=/tmp".to_string()]);
    }

    #[test]
    fn rejects_shared_ports() {
        let yaml = "telemetry:\n  pvt_port: 2000\n  observables_port: 2000\n";
        assert!(matches!(
            Config::from_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_layout() {
        let yaml = "telemetry:\n  layout: gs_v1\n";
        assert!(matches!(Config::from_str(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_bad_duration() {
        let yaml = "supervisor:\n  stop_timeout: soon\n";
        assert!(matches!(Config::from_str(yaml), Err(ConfigError::Yaml(_))));
    }
}
