//! Configuration module for portkit.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `PORTKIT_CONFIG` environment variable (explicit path)
//! 2. `./portkit.toml` (current directory)
//! 3. `~/.config/portkit/portkit.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\portkit\portkit.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `PORTKIT_<SECTION>_<KEY>`:
//! - `PORTKIT_SERIAL_DEFAULT_PORT=/dev/ttyUSB0`
//! - `PORTKIT_SERIAL_DEFAULT_BAUD=115200`
//! - `PORTKIT_SERIAL_PARITY=even`
//! - `PORTKIT_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use portkit::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let settings = loader.config().serial.port_settings()?;
//! println!("Default baud: {}", settings.baud_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
