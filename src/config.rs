//! Configuration management for Chargegate
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The file location may be overridden with the
//! `CHARGEGATE_CONFIG` environment variable.

use crate::error::{ChargeGateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Device web-service path appended to every station base URL
pub const DEFAULT_SERVICE_PATH: &str = "/typebased_WS_EVSE/EVSEWebService/Toppen_EVSE";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station device API parameters
    pub station: StationConfig,

    /// Snapshot refresh policy
    pub poller: PollerConfig,

    /// Budget-metered charge control parameters
    pub controller: ControllerConfig,

    /// Background reconciliation loops
    pub monitor: MonitorConfig,

    /// Price and carbon-intensity feed
    pub market: MarketConfig,

    /// Payment rail used for balances and settlement
    pub payment: PaymentConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Station device API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Path of the device web service, replacing the path of the given base URL
    pub service_path: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Snapshot refresh policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Maximum snapshot age before a device read is required
    pub staleness_secs: f64,

    /// Fetch attempts per reconcile
    pub max_attempts: u32,

    /// Delay between failed attempts in milliseconds
    pub retry_delay_ms: u64,
}

/// Charge controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Upper bound on a single control cycle; bounds budget overshoot
    pub max_cycle_secs: f64,

    /// Draw at or below this level is charger overhead, not consumption
    pub idle_power_threshold_kw: f64,

    /// Consecutive idle cycles, after the vehicle has drawn power, that end the run
    pub idle_cycles_before_stop: u32,
}

/// A station whose reconciliation loop starts at boot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationEntry {
    /// Station identifier (also its payment account)
    pub id: String,

    /// Base URL of the station, e.g. `http://10.0.0.20:8080`
    pub url: String,
}

/// Background reconciliation loops
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between reconciliation cycles in seconds
    pub interval_secs: f64,

    /// Stations monitored from startup
    pub stations: Vec<StationEntry>,
}

/// Market feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Base URL of the market variable service
    pub base_url: String,

    /// Price in cents per kWh used when the feed is unavailable
    pub fallback_price: f64,

    /// Carbon intensity used when the feed is unavailable
    pub fallback_co2: Option<f64>,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Which payment rail implementation to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Log transfers without moving funds
    DryRun,
    /// Talk to a settlement gateway over HTTP
    Http,
}

/// Payment rail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Rail implementation
    pub mode: PaymentMode,

    /// Settlement gateway base URL (http mode)
    pub gateway_url: String,

    /// Account credited with the cost of completed sessions
    pub operator_account: String,

    /// Remainders below this amount are not refunded
    pub dust_threshold: f64,

    /// Balance reported by the dry-run rail for every account
    pub dry_run_balance: f64,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console level override
    pub console_level: Option<String>,

    /// Optional file level override
    pub file_level: Option<String>,

    /// Path to log file (its directory is used for rotation)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl PollerConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs_f64(self.staleness_secs.max(0.0))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ControllerConfig {
    pub fn max_cycle(&self) -> Duration {
        Duration::from_secs_f64(self.max_cycle_secs.max(0.0))
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(0.0))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("CHARGEGATE_CONFIG") {
            let config = Self::from_file(&path)?;
            config.validate()?;
            return Ok(config);
        }

        let default_paths = ["chargegate.yaml", "/etc/chargegate/config.yaml"];
        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.station.service_path.starts_with('/') {
            return Err(ChargeGateError::validation(
                "station.service_path",
                "Must start with '/'",
            ));
        }

        if self.station.request_timeout_ms == 0 {
            return Err(ChargeGateError::validation(
                "station.request_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.poller.max_attempts == 0 {
            return Err(ChargeGateError::validation(
                "poller.max_attempts",
                "Must be at least 1",
            ));
        }

        if !self.poller.staleness_secs.is_finite() || self.poller.staleness_secs < 0.0 {
            return Err(ChargeGateError::validation(
                "poller.staleness_secs",
                "Must be a non-negative number",
            ));
        }

        if !self.controller.max_cycle_secs.is_finite() || self.controller.max_cycle_secs <= 0.0 {
            return Err(ChargeGateError::validation(
                "controller.max_cycle_secs",
                "Must be positive",
            ));
        }

        if !self.controller.idle_power_threshold_kw.is_finite()
            || self.controller.idle_power_threshold_kw < 0.0
        {
            return Err(ChargeGateError::validation(
                "controller.idle_power_threshold_kw",
                "Must be a non-negative number",
            ));
        }

        if !self.monitor.interval_secs.is_finite() || self.monitor.interval_secs <= 0.0 {
            return Err(ChargeGateError::validation(
                "monitor.interval_secs",
                "Must be positive",
            ));
        }

        for station in &self.monitor.stations {
            if station.id.trim().is_empty() {
                return Err(ChargeGateError::validation(
                    "monitor.stations.id",
                    "Station id cannot be empty",
                ));
            }
            if station.url.trim().is_empty() {
                return Err(ChargeGateError::validation(
                    "monitor.stations.url",
                    format!("Station {} has no url", station.id),
                ));
            }
        }

        if !self.market.fallback_price.is_finite() || self.market.fallback_price <= 0.0 {
            return Err(ChargeGateError::validation(
                "market.fallback_price",
                "Must be positive",
            ));
        }

        if self.payment.mode == PaymentMode::Http && self.payment.gateway_url.trim().is_empty() {
            return Err(ChargeGateError::validation(
                "payment.gateway_url",
                "Required when payment.mode is http",
            ));
        }

        if self.web.port == 0 {
            return Err(ChargeGateError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}
