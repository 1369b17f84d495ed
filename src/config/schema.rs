//! Configuration file layout.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes.

use crate::port::{DataBits, Parity, PortError, PortSettings, ReadOptions, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port defaults and read tuning
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// `[serial]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port used when none is given on the command line
    pub default_port: Option<String>,
    /// Default baud rate for new connections
    pub default_baud: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity: "none", "odd", "even", "mark" or "space"
    pub parity: Parity,
    /// Largest frame a single read poll returns
    pub read_buffer_size: usize,
    /// Sleep between empty polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on one blocking read, in milliseconds
    pub read_timeout_ms: u64,
    /// Frames buffered ahead of a slow consumer
    pub channel_capacity: usize,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let options = ReadOptions::default();
        Self {
            default_port: None,
            default_baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_buffer_size: options.buffer_size,
            poll_interval_ms: options.poll_interval.as_millis() as u64,
            read_timeout_ms: options.read_timeout.as_millis() as u64,
            channel_capacity: options.channel_capacity,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Connection parameters described by this section.
    pub fn port_settings(&self) -> Result<PortSettings, PortError> {
        let settings = PortSettings {
            baud_rate: self.default_baud,
            data_bits: DataBits::try_from(self.data_bits)?,
            stop_bits: StopBits::try_from(self.stop_bits)?,
            parity: self.parity,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Read-loop tuning described by this section.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            buffer_size: self.read_buffer_size.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "portkit=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.default_baud, 9600);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.serial.read_options(), ReadOptions::default());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("board".to_string(), "/dev/ttyWK0".to_string());

        assert_eq!(config.resolve_port("board"), "/dev/ttyWK0");
        assert_eq!(config.resolve_port("COM5"), "COM5");
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            default_baud = 115200
            parity = "mark"
            stop_bits = 2

            [logging]
            format = "json"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let settings = config.serial.port_settings().unwrap();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.parity, Parity::Mark);
        assert_eq!(settings.stop_bits, StopBits::Two);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_data_bits_rejected() {
        let config = SerialConfig {
            data_bits: 9,
            ..SerialConfig::default()
        };
        assert!(config.port_settings().is_err());
    }

    #[test]
    fn test_read_options_clamped() {
        let config = SerialConfig {
            read_buffer_size: 0,
            channel_capacity: 0,
            read_timeout_ms: 0,
            poll_interval_ms: 0,
            ..SerialConfig::default()
        };
        let options = config.read_options();
        assert_eq!(options.buffer_size, 1);
        assert_eq!(options.channel_capacity, 1);
        assert_eq!(options.read_timeout, Duration::from_millis(1));
        assert_eq!(options.poll_interval, Duration::from_millis(1));
    }
}
