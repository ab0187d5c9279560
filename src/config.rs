//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::dshot::protocol::{DshotSpeed, TELEMETRY_MOTORS};
use crate::error::{DshotError, Result};
use crate::timer::topology::Topology;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub dshot: DshotConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub topology: Topology,

    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub bench: BenchConfig,
}

/// DShot output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DshotConfig {
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,

    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,

    #[serde(default = "default_channel_mask")]
    pub channel_mask: u32,
}

/// Telemetry capture timing
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_settle_delay_us")]
    pub settle_delay_us: u64,
}

/// Telemetry recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Loopback bench configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    #[serde(default = "default_loop_rate_hz")]
    pub loop_rate_hz: u32,

    #[serde(default = "default_throttle")]
    pub throttle: u16,

    #[serde(default = "default_esc_periods")]
    pub esc_periods: Vec<u32>,

    #[serde(default = "default_summary_interval_batches")]
    pub summary_interval_batches: u64,
}

// Default value functions
fn default_frequency_hz() -> u32 { 600_000 }
fn default_bidirectional() -> bool { true }
fn default_channel_mask() -> u32 { 0x0F }

fn default_settle_delay_us() -> u64 { 150 }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_loop_rate_hz() -> u32 { 1000 }
fn default_throttle() -> u16 { 48 }
fn default_esc_periods() -> Vec<u32> { vec![1000, 1100, 1200, 1300] }
fn default_summary_interval_batches() -> u64 { 250 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_us: default_settle_delay_us(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            loop_rate_hz: default_loop_rate_hz(),
            throttle: default_throttle(),
            esc_periods: default_esc_periods(),
            summary_interval_batches: default_summary_interval_batches(),
        }
    }
}

impl CaptureConfig {
    /// Settle delay as a `Duration`
    pub fn settle_delay(&self) -> Duration {
        Duration::from_micros(self.settle_delay_us)
    }
}

fn invalid(message: impl std::fmt::Display) -> DshotError {
    DshotError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dshot_engine::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate DShot rate
        if DshotSpeed::from_frequency(self.dshot.frequency_hz).is_err() {
            return Err(invalid(
                "frequency_hz must be one of: 150000, 300000, 600000, 1200000",
            ));
        }

        if self.dshot.channel_mask == 0 {
            return Err(invalid("channel_mask must select at least one channel"));
        }

        // Validate capture timing
        if self.capture.settle_delay_us == 0 || self.capture.settle_delay_us > 1000 {
            return Err(invalid("settle_delay_us must be between 1 and 1000"));
        }

        // Layout problems are reported with their own error kinds
        self.topology.validate()?;

        // Validate telemetry recording
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        // Validate bench
        if self.bench.loop_rate_hz == 0 || self.bench.loop_rate_hz > 8000 {
            return Err(invalid("loop_rate_hz must be between 1 and 8000"));
        }

        if self.bench.throttle > 2047 {
            return Err(invalid("bench throttle must be between 0 and 2047"));
        }

        if self.bench.esc_periods.len() != TELEMETRY_MOTORS {
            return Err(invalid(format!(
                "esc_periods must list exactly {} periods",
                TELEMETRY_MOTORS
            )));
        }

        if self.bench.esc_periods.iter().any(|&period| period > 511 << 7) {
            return Err(invalid("esc_periods must not exceed 65408"));
        }

        if self.bench.summary_interval_batches == 0 {
            return Err(invalid("summary_interval_batches must be greater than 0"));
        }

        Ok(())
    }
}
