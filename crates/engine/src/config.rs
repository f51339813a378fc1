//! Engine configuration: request limits, timeouts, data rates and buffer sizes.
//!
//! Every struct implements [`Default`] with the values a production server would start from,
//! and [`serde::Deserialize`] with `#[serde(default)]` so a host can load a partial config.
//! Durations are read as (possibly fractional) seconds.
//!
//! ```
//! use micro_engine::config::{EngineConfig, Limits};
//! use std::time::Duration;
//!
//! let config = EngineConfig {
//!     limits: Limits { keep_alive_timeout: Duration::from_secs(10), ..Limits::default() },
//!     ..EngineConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::utils::ensure;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("the data rate must be positive, got {0}")]
    NonPositiveRate(f64),

    #[error("the grace period {grace_period:?} must be at least the heartbeat interval {heartbeat_interval:?}")]
    GracePeriodTooShort { grace_period: Duration, heartbeat_interval: Duration },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// A minimum transfer rate enforced after a grace period.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MinDataRate {
    bytes_per_second: f64,
    #[serde(with = "seconds")]
    grace_period: Duration,
}

impl MinDataRate {
    pub fn new(bytes_per_second: f64, grace_period: Duration) -> Result<Self, ConfigError> {
        let rate = Self { bytes_per_second, grace_period };
        rate.validate(DEFAULT_HEARTBEAT_INTERVAL)?;
        Ok(rate)
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.bytes_per_second
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn validate(&self, heartbeat_interval: Duration) -> Result<(), ConfigError> {
        ensure!(self.bytes_per_second > 0.0, ConfigError::NonPositiveRate(self.bytes_per_second));
        ensure!(
            self.grace_period >= heartbeat_interval,
            ConfigError::GracePeriodTooShort { grace_period: self.grace_period, heartbeat_interval }
        );
        Ok(())
    }
}

/// Limits applied to every connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Request line length including the trailing CRLF.
    pub max_request_line_size: usize,
    pub max_request_headers_count: usize,
    /// Cumulative size of all header lines including their CRLFs and the blank line.
    pub max_request_headers_total_size: usize,
    /// `None` disables the check.
    pub max_request_body_size: Option<u64>,

    #[serde(with = "seconds")]
    pub keep_alive_timeout: Duration,
    #[serde(with = "seconds")]
    pub request_headers_timeout: Duration,
    #[serde(with = "seconds")]
    pub request_body_drain_timeout: Duration,

    pub min_request_body_data_rate: Option<MinDataRate>,
    pub min_response_data_rate: Option<MinDataRate>,

    /// Unconsumed request bytes that pause reading from the socket. `None` never pauses.
    pub max_request_buffer_size: Option<usize>,
    /// Unflushed response bytes that make the application wait. `None` never waits.
    pub max_response_buffer_size: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        let default_rate = MinDataRate { bytes_per_second: 240.0, grace_period: Duration::from_secs(5) };
        Self {
            max_request_line_size: 8 * 1024,
            max_request_headers_count: 100,
            max_request_headers_total_size: 32 * 1024,
            max_request_body_size: Some(30_000_000),
            keep_alive_timeout: Duration::from_secs(130),
            request_headers_timeout: Duration::from_secs(30),
            request_body_drain_timeout: Duration::from_secs(5),
            min_request_body_data_rate: Some(default_rate),
            min_response_data_rate: Some(default_rate),
            max_request_buffer_size: Some(1024 * 1024),
            max_response_buffer_size: Some(64 * 1024),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub add_server_header: bool,
    /// Prefix stripped from the decoded path when it matches on a segment boundary.
    pub path_base: Option<String>,
    pub block_size: usize,
    #[serde(with = "seconds")]
    pub shutdown_timeout: Duration,
    #[serde(with = "seconds")]
    pub heartbeat_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            add_server_header: true,
            path_base: None,
            block_size: 4096,
            shutdown_timeout: Duration::from_secs(5),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Checks the invariants a deserialized config may have skipped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        ensure!(self.block_size > 0, ConfigError::Zero { name: "block_size" });
        ensure!(!self.heartbeat_interval.is_zero(), ConfigError::Zero { name: "heartbeat_interval" });
        ensure!(limits.max_request_line_size > 0, ConfigError::Zero { name: "max_request_line_size" });
        ensure!(limits.max_request_headers_count > 0, ConfigError::Zero { name: "max_request_headers_count" });
        ensure!(limits.max_request_headers_total_size > 0, ConfigError::Zero { name: "max_request_headers_total_size" });
        ensure!(limits.max_request_buffer_size != Some(0), ConfigError::Zero { name: "max_request_buffer_size" });
        ensure!(limits.max_response_buffer_size != Some(0), ConfigError::Zero { name: "max_response_buffer_size" });
        for rate in [limits.min_request_body_data_rate, limits.min_response_data_rate].into_iter().flatten() {
            rate.validate(self.heartbeat_interval)?;
        }
        Ok(())
    }
}

/// (De)serializes a [`Duration`] as a number of seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_request_line_size, 8192);
        assert_eq!(config.limits.keep_alive_timeout, Duration::from_secs(130));
        assert_eq!(config.block_size, 4096);
    }

    #[test]
    fn min_data_rate_rejects_non_positive_rate() {
        assert_eq!(MinDataRate::new(0.0, Duration::from_secs(5)), Err(ConfigError::NonPositiveRate(0.0)));
    }

    #[test]
    fn min_data_rate_rejects_short_grace_period() {
        let result = MinDataRate::new(100.0, Duration::from_millis(500));
        assert!(matches!(result, Err(ConfigError::GracePeriodTooShort { .. })));
    }

    #[test]
    fn deserialize_partial_config() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "add_server_header": false,
                "limits": {
                    "keep_alive_timeout": 2.5,
                    "max_request_body_size": null,
                    "min_response_data_rate": { "bytes_per_second": 100.0, "grace_period": 2 }
                }
            }"#,
        )
        .unwrap();

        assert!(!config.add_server_header);
        assert_eq!(config.limits.keep_alive_timeout, Duration::from_millis(2500));
        assert_eq!(config.limits.max_request_body_size, None);
        assert_eq!(config.limits.min_response_data_rate, Some(MinDataRate::new(100.0, Duration::from_secs(2)).unwrap()));
        assert_eq!(config.limits.request_headers_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_block_size() {
        let config = EngineConfig { block_size: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::Zero { name: "block_size" }));
    }
}
