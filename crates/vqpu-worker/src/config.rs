//! Worker configuration.
//!
//! Sources, highest precedence first:
//! 1. Environment variables (`VQPU_` prefix, plus the SLURM step port range)
//! 2. A YAML configuration file
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vqpu_comm::{DEFAULT_MAX_FRAME, RouterOptions, WaitPolicy, default_discovery_path};
use vqpu_hal::EngineConfig;

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Classical channel settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Endpoint discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Simulation engine.
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Which classical channel a worker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Socket-addressed TCP channel.
    Router,
    /// In-process rank fabric.
    Rank,
}

impl std::str::FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "router" => Ok(TransportKind::Router),
            "rank" => Ok(TransportKind::Rank),
            other => Err(ConfigError::Validation(format!(
                "Unknown transport: {other}"
            ))),
        }
    }
}

/// Classical channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Channel implementation.
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    /// Interface the router binds.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Host advertised to peers when it differs from `bind_host`.
    #[serde(default)]
    pub advertise_host: Option<String>,

    /// Port to bind; 0 picks an ephemeral port.
    #[serde(default)]
    pub port: u16,

    /// Dial attempts per peer.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Delay between dial attempts in milliseconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Largest accepted frame in bytes.
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: usize,
}

/// Endpoint discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Communications file; defaults to `~/.vqpu/communications.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Delay between discovery polls in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up after this many polls; unset waits forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Simulation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Registered engine name.
    #[serde(default = "default_engine")]
    pub name: String,

    /// Seed used when a task carries none.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Largest combined register the engine accepts.
    #[serde(default)]
    pub max_qubits: Option<usize>,
}

fn default_transport_kind() -> TransportKind {
    TransportKind::Router
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_retries() -> u32 {
    50
}

fn default_retry_interval() -> u64 {
    100
}

fn default_max_frame() -> usize {
    DEFAULT_MAX_FRAME
}

fn default_poll_interval() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_engine() -> String {
    "statevector".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            bind_host: default_bind_host(),
            advertise_host: None,
            port: 0,
            connect_retries: default_connect_retries(),
            retry_interval_ms: default_retry_interval(),
            max_frame_bytes: default_max_frame(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: default_poll_interval(),
            max_attempts: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            name: default_engine(),
            seed: None,
            max_qubits: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.as_ref().display())))?;
        serde_yaml_ng::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// File (or defaults), then the process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Transport
        if let Some(v) = lookup("VQPU_TRANSPORT") {
            self.transport.kind = v.parse()?;
        }
        if let Some(v) = lookup("VQPU_BIND_HOST") {
            self.transport.bind_host = v;
        }
        if let Some(v) = lookup("VQPU_ADVERTISE_HOST") {
            self.transport.advertise_host = Some(v);
        }
        if let Some(v) = lookup("VQPU_PORT") {
            self.transport.port = parse_var("VQPU_PORT", &v)?;
        }
        if let Some(v) = lookup("VQPU_CONNECT_RETRIES") {
            self.transport.connect_retries = parse_var("VQPU_CONNECT_RETRIES", &v)?;
        }

        // A SLURM step reserves a port range for its tasks.
        if self.transport.port == 0 {
            if let (Some(ports), Some(local_id)) =
                (lookup("SLURM_STEP_RESV_PORTS"), lookup("SLURM_LOCALID"))
            {
                let local_id = parse_var("SLURM_LOCALID", &local_id)?;
                self.transport.port = slurm_port(&ports, local_id)?;
            }
        }

        // Discovery
        if let Some(v) = lookup("VQPU_DISCOVERY_PATH") {
            self.discovery.path = Some(PathBuf::from(v));
        }

        // Logging
        if let Some(v) = lookup("VQPU_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("VQPU_LOG_FORMAT") {
            self.logging.format = v;
        }

        // Engine
        if let Some(v) = lookup("VQPU_ENGINE") {
            self.engine.name = v;
        }
        if let Some(v) = lookup("VQPU_SEED") {
            self.engine.seed = Some(parse_var("VQPU_SEED", &v)?);
        }

        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "Invalid log level: {other}"
                )));
            }
        }

        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        if self.transport.bind_host.is_empty() {
            return Err(ConfigError::Validation(
                "bind_host must not be empty".to_string(),
            ));
        }

        if self.transport.connect_retries == 0 {
            return Err(ConfigError::Validation(
                "connect_retries must be greater than 0".to_string(),
            ));
        }

        if self.discovery.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.engine.name.is_empty() {
            return Err(ConfigError::Validation(
                "engine name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Options for binding a router channel.
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            bind_host: self.transport.bind_host.clone(),
            advertise_host: self.transport.advertise_host.clone(),
            port: self.transport.port,
            connect_retries: self.transport.connect_retries,
            retry_interval: Duration::from_millis(self.transport.retry_interval_ms),
            max_frame: self.transport.max_frame_bytes,
        }
    }

    /// Location of the communications file.
    pub fn discovery_path(&self) -> PathBuf {
        self.discovery
            .path
            .clone()
            .unwrap_or_else(default_discovery_path)
    }

    /// Polling behavior for discovery lookups.
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(self.discovery.poll_interval_ms),
            max_attempts: self.discovery.max_attempts,
        }
    }

    /// Engine construction settings.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(&self.engine.name);
        if let Some(seed) = self.engine.seed {
            config = config.with_seed(seed);
        }
        if let Some(max) = self.engine.max_qubits {
            config = config.with_extra("max_qubits", serde_json::json!(max));
        }
        config
    }
}

/// Port for a task of a SLURM step: the top of the reserved range `lo-hi`
/// minus the task's local id.
pub fn slurm_port(ports: &str, local_id: u16) -> Result<u16, ConfigError> {
    let invalid = || ConfigError::Validation(format!("Invalid SLURM port range: {ports}"));
    let (lo, hi) = match ports.split_once('-') {
        Some((lo, hi)) => (lo, hi),
        None => (ports, ports),
    };
    let lo: u16 = lo.trim().parse().map_err(|_| invalid())?;
    let hi: u16 = hi.trim().parse().map_err(|_| invalid())?;
    if lo > hi {
        return Err(invalid());
    }
    hi.checked_sub(local_id)
        .filter(|port| *port >= lo)
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "SLURM_LOCALID {local_id} is outside the reserved range {ports}"
            ))
        })
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid value for {key}: {value}")))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.transport.kind, TransportKind::Router);
        assert_eq!(config.transport.port, 0);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.name, "statevector");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = WorkerConfig::default()
            .merge_vars(vars(&[
                ("VQPU_TRANSPORT", "rank"),
                ("VQPU_PORT", "6100"),
                ("VQPU_LOG_FORMAT", "json"),
                ("VQPU_SEED", "42"),
                ("VQPU_DISCOVERY_PATH", "/shared/comm.json"),
            ]))
            .unwrap();
        assert_eq!(config.transport.kind, TransportKind::Rank);
        assert_eq!(config.transport.port, 6100);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.engine.seed, Some(42));
        assert_eq!(config.discovery_path(), PathBuf::from("/shared/comm.json"));
    }

    #[test]
    fn test_invalid_env_value() {
        let result = WorkerConfig::default().merge_vars(vars(&[("VQPU_PORT", "high")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let result = WorkerConfig::default().merge_vars(vars(&[("VQPU_TRANSPORT", "mpi")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_slurm_port_derivation() {
        let config = WorkerConfig::default()
            .merge_vars(vars(&[
                ("SLURM_STEP_RESV_PORTS", "12000-12007"),
                ("SLURM_LOCALID", "3"),
            ]))
            .unwrap();
        assert_eq!(config.transport.port, 12004);
    }

    #[test]
    fn test_explicit_port_wins_over_slurm() {
        let config = WorkerConfig::default()
            .merge_vars(vars(&[
                ("VQPU_PORT", "7000"),
                ("SLURM_STEP_RESV_PORTS", "12000-12007"),
                ("SLURM_LOCALID", "3"),
            ]))
            .unwrap();
        assert_eq!(config.transport.port, 7000);
    }

    #[test]
    fn test_slurm_port_bounds() {
        assert_eq!(slurm_port("12000-12007", 0).unwrap(), 12007);
        assert_eq!(slurm_port("12000", 0).unwrap(), 12000);
        assert!(slurm_port("12000-12007", 8).is_err());
        assert!(slurm_port("12007-12000", 0).is_err());
        assert!(slurm_port("ports", 0).is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = WorkerConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_retries() {
        let mut config = WorkerConfig::default();
        config.transport.connect_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_router_options() {
        let mut config = WorkerConfig::default();
        config.transport.bind_host = "0.0.0.0".to_string();
        config.transport.advertise_host = Some("node17".to_string());
        config.transport.retry_interval_ms = 250;
        let options = config.router_options();
        assert_eq!(options.bind_host, "0.0.0.0");
        assert_eq!(options.advertise_host.as_deref(), Some("node17"));
        assert_eq!(options.retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_engine_config() {
        let mut config = WorkerConfig::default();
        config.engine.seed = Some(9);
        config.engine.max_qubits = Some(12);
        let engine = config.engine_config();
        assert_eq!(engine.name, "statevector");
        assert_eq!(engine.seed, Some(9));
        assert_eq!(engine.extra["max_qubits"], 12);
    }
}
