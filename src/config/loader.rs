//! Configuration loader with file resolution and environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "PORTKIT";

/// Config file name
const CONFIG_FILE_NAME: &str = "portkit.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "PORTKIT_CONFIG";

/// Directory name under the user config dir
const APP_DIR_NAME: &str = "portkit";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `PORTKIT_CONFIG` environment variable (explicit path)
    /// 2. `./portkit.toml` (current directory)
    /// 3. `~/.config/portkit/portkit.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\portkit\portkit.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides are still applied; malformed ones are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if apply_env_overrides(&mut config).is_err() || validate(&config).is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|p| p.exists())
}

/// The per-user config file path, whether or not it exists.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate(config: &Config) -> ConfigResult<()> {
    config
        .serial
        .port_settings()
        .map(|_| ())
        .map_err(|e| ConfigError::validation("serial", e.to_string()))
}

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{ENV_PREFIX}_{key}");
    std::env::var(&name).ok().map(|v| (name, v))
}

fn parse_env<T: FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(name, format!("Invalid {what}: '{value}'")))
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `PORTKIT_<SECTION>_<KEY>`, for example
/// `PORTKIT_SERIAL_DEFAULT_BAUD=115200` or `PORTKIT_LOGGING_LEVEL=debug`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let serial = &mut config.serial;

    if let Some((_, val)) = env_var("SERIAL_DEFAULT_PORT") {
        serial.default_port = Some(val);
    }
    if let Some((name, val)) = env_var("SERIAL_DEFAULT_BAUD") {
        serial.default_baud = parse_env(&name, &val, "baud rate")?;
    }
    if let Some((name, val)) = env_var("SERIAL_DATA_BITS") {
        serial.data_bits = parse_env(&name, &val, "data bits")?;
    }
    if let Some((name, val)) = env_var("SERIAL_STOP_BITS") {
        serial.stop_bits = parse_env(&name, &val, "stop bits")?;
    }
    if let Some((name, val)) = env_var("SERIAL_PARITY") {
        serial.parity = parse_env(&name, &val, "parity")?;
    }
    if let Some((name, val)) = env_var("SERIAL_READ_TIMEOUT_MS") {
        serial.read_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("SERIAL_POLL_INTERVAL_MS") {
        serial.poll_interval_ms = parse_env(&name, &val, "interval")?;
    }

    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((name, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => return Err(ConfigError::env_parse(name, format!("Invalid log format: '{val}'"))),
        };
    }

    Ok(())
}
