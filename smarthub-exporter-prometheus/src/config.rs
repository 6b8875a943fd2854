//! Configuration for the Prometheus exporter.

use serde::{Deserialize, Serialize};
use smarthub_common::LoggingConfig;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Router connection settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Metric filtering settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Router endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Router host name or address, e.g. "192.168.1.254".
    #[serde(default)]
    pub host: String,

    /// HTTP request timeout (default: 10 seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Whether to scrape the LAN device list (default: true).
    #[serde(default = "default_scrape_lan")]
    pub scrape_lan: bool,
}

fn default_timeout() -> u64 {
    10
}

fn default_scrape_lan() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_secs: default_timeout(),
            scrape_lan: default_scrape_lan(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9101").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Metric name prefix (default: "smarthub").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9101".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "smarthub".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            prefix: default_prefix(),
        }
    }
}

/// Metric filtering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns for metric names to include (empty = all).
    #[serde(default)]
    pub include_metrics: Vec<String>,

    /// Glob patterns for metric names to exclude.
    #[serde(default)]
    pub exclude_metrics: Vec<String>,

    /// Glob patterns matched against device hostname or MAC.
    #[serde(default)]
    pub exclude_devices: Vec<String>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// Not validated: command-line overrides are applied first, then
    /// [`validate`](Self::validate) is called.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "router host must be set (config router.host, --host or SMARTHUB_HOST)"
                    .to_string(),
            ));
        }

        if self.router.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        for pattern in self
            .filters
            .include_metrics
            .iter()
            .chain(&self.filters.exclude_metrics)
            .chain(&self.filters.exclude_devices)
        {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid glob pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smarthub_common::LogFormat;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{ router: { host: "192.168.1.254" } }"#;
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.router.host, "192.168.1.254");
        assert_eq!(config.router.timeout_secs, 10);
        assert!(config.router.scrape_lan);
        assert_eq!(config.prometheus.listen, "0.0.0.0:9101");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "smarthub");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            router: {
                host: "bthub.home",
                timeout_secs: 3,
                scrape_lan: false
            },
            prometheus: {
                listen: "127.0.0.1:9102",
                path: "/prometheus/metrics",
                prefix: "hub",
                default_labels: {
                    site: "home",
                }
            },
            filters: {
                exclude_metrics: ["*_rate"],
                exclude_devices: ["android-*"]
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.router.host, "bthub.home");
        assert_eq!(config.router.timeout_secs, 3);
        assert!(!config.router.scrape_lan);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9102");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.prometheus.prefix, "hub");
        assert_eq!(
            config.prometheus.default_labels.get("site"),
            Some(&"home".to_string())
        );
        assert_eq!(config.filters.exclude_metrics, vec!["*_rate"]);
        assert_eq!(config.filters.exclude_devices, vec!["android-*"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_missing_host() {
        let result = ExporterConfig::parse("{}");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("router host must be set")
        );
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            router: { host: "hub" },
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            router: { host: "hub" },
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        let json = r#"{
            router: { host: "hub", timeout_secs: 0 }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_bad_glob() {
        let json = r#"{
            router: { host: "hub" },
            filters: { exclude_devices: ["[unclosed"] }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.unwrap_err().to_string().contains("Invalid glob"));
    }

    #[test]
    fn test_load_from_file_defers_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ prometheus: {{ prefix: 'bt' }} }}").unwrap();

        let mut config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.prometheus.prefix, "bt");
        assert!(config.validate().is_err());

        config.router.host = "192.168.1.254".to_string();
        assert!(config.validate().is_ok());
    }
}
