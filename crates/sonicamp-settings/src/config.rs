//! Application configuration
//!
//! Stored as JSON or TOML, chosen by file extension, in the platform config
//! directory unless a path is given. Every section has defaults, so a file
//! only needs the values it changes.
//!
//! Configuration is organized into sections:
//! - Connection settings (port, baud rates, timeouts, retries)
//! - Logging (filter, log directory)
//! - Procedure timing

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sonicamp_communication::{
    ChannelEncoding, DeviceBuilderConfig, LegacyCommunicatorConfig, SonicCommunicatorConfig,
    LEGACY_BAUD_RATE, SONIC_BAUD_RATE,
};
use sonicamp_procedures::ProcedureConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SettingsError, SettingsResult};

/// Directory name below the platform config directory
pub const APP_DIR: &str = "sonicamp";

/// Platform config directory of the application, created if missing
pub fn config_dir() -> SettingsResult<PathBuf> {
    let mut path = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| SettingsError::ConfigDirectory("no config directory".to_string()))?;
    path.push(APP_DIR);
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

/// File formats understood by [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// Format named by the extension of `path`
    pub fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(SettingsError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub(crate) fn read<T: DeserializeOwned>(self, path: &Path) -> SettingsResult<T> {
        let content = std::fs::read_to_string(path)?;
        Ok(match self {
            Self::Json => serde_json::from_str(&content)?,
            Self::Toml => toml::from_str(&content)?,
        })
    }

    pub(crate) fn write<T: Serialize>(self, path: &Path, value: &T) -> SettingsResult<()> {
        let content = match self {
            Self::Json => serde_json::to_string_pretty(value)?,
            Self::Toml => toml::to_string_pretty(value)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Text encoding on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Windows-1252 on Windows, UTF-8 elsewhere
    #[default]
    Platform,
    Utf8,
    Windows1252,
}

impl Encoding {
    /// The channel encoding this setting selects
    pub fn channel_encoding(self) -> ChannelEncoding {
        match self {
            Self::Platform => ChannelEncoding::platform_default(),
            Self::Utf8 => ChannelEncoding::Utf8,
            Self::Windows1252 => ChannelEncoding::Windows1252,
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port, or path to an executable speaking the protocol on stdio
    pub url: String,
    /// Baud rate of the framed protocol
    pub sonic_baud_rate: u32,
    /// Baud rate of the legacy protocol
    pub legacy_baud_rate: u32,
    /// Per-attempt answer timeout of the framed protocol in milliseconds
    pub timeout_ms: u64,
    /// Attempts per framed request, including the first
    pub max_attempts: u32,
    /// Answer timeout of the legacy protocol in milliseconds
    pub legacy_timeout_ms: u64,
    /// Extra attempts after a legacy timeout
    pub legacy_max_retries: u32,
    /// How long the legacy banner is read after opening, in milliseconds
    pub handshake_ms: u64,
    /// Channel encoding
    pub encoding: Encoding,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            sonic_baud_rate: SONIC_BAUD_RATE,
            legacy_baud_rate: LEGACY_BAUD_RATE,
            timeout_ms: 3000,
            max_attempts: 3,
            legacy_timeout_ms: 10_000,
            legacy_max_retries: 0,
            handshake_ms: 6000,
            encoding: Encoding::Platform,
        }
    }
}

impl ConnectionSettings {
    /// Settings of framed communicators
    pub fn sonic_config(&self) -> SonicCommunicatorConfig {
        SonicCommunicatorConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts,
            encoding: self.encoding.channel_encoding(),
            baud_rate: self.sonic_baud_rate,
            ..SonicCommunicatorConfig::default()
        }
    }

    /// Settings of legacy communicators
    pub fn legacy_config(&self) -> LegacyCommunicatorConfig {
        LegacyCommunicatorConfig {
            timeout: Duration::from_millis(self.legacy_timeout_ms),
            max_retries: self.legacy_max_retries,
            handshake_duration: Duration::from_millis(self.handshake_ms),
            encoding: self.encoding.channel_encoding(),
            baud_rate: self.legacy_baud_rate,
            ..LegacyCommunicatorConfig::default()
        }
    }

    fn validate(&self) -> SettingsResult<()> {
        if self.sonic_baud_rate == 0 || self.legacy_baud_rate == 0 {
            return Err(SettingsError::invalid(
                "connection.baud_rate",
                "baud rates must be > 0",
            ));
        }
        if self.timeout_ms == 0 || self.legacy_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.timeout_ms",
                "timeouts must be > 0",
            ));
        }
        if self.max_attempts == 0 {
            return Err(SettingsError::invalid(
                "connection.max_attempts",
                "at least one attempt is needed",
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `sonicamp=debug`; `RUST_LOG` wins
    pub level: String,
    /// Directory for daily rolling log files; none logs to stdout only
    pub directory: Option<PathBuf>,
    /// Write log files as JSON lines
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Drop debug-only commands from the contract tables
    pub release: bool,
    /// JSON document with the known transducers
    pub transducer_library: Option<PathBuf>,
    /// Transducer applied after connecting
    pub transducer: Option<String>,
    /// Start the status updater once connected
    pub autostart_updater: bool,
    pub connection: ConnectionSettings,
    pub logging: LoggingSettings,
    pub procedures: ProcedureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            release: true,
            transducer_library: None,
            transducer: None,
            autostart_updater: true,
            connection: ConnectionSettings::default(),
            logging: LoggingSettings::default(),
            procedures: ProcedureConfig::default(),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `config.toml` in the platform config directory
    pub fn default_path() -> SettingsResult<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let config: Self = FileFormat::from_path(path)?.read(path)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        FileFormat::from_path(path)?.write(path, self)
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        self.connection.validate()?;

        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::invalid(
                "logging.level",
                "filter must not be empty",
            ));
        }

        if self.procedures.poll_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "procedures.poll_interval_ms",
                "must be > 0",
            ));
        }
        if self.procedures.finish_timeout_ms == Some(0) {
            return Err(SettingsError::invalid(
                "procedures.finish_timeout_ms",
                "must be > 0 or absent",
            ));
        }

        if self.transducer.is_some() && self.transducer_library.is_none() {
            return Err(SettingsError::invalid(
                "transducer",
                "a transducer needs a transducer_library",
            ));
        }
        Ok(())
    }

    /// Handshake settings derived from this configuration
    pub fn device_builder_config(&self) -> DeviceBuilderConfig {
        DeviceBuilderConfig {
            legacy: self.connection.legacy_config(),
            sonic: self.connection.sonic_config(),
            release: self.release,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.release);
        assert_eq!(config.connection.sonic_baud_rate, 9600);
        assert_eq!(config.connection.legacy_baud_rate, 115_200);
    }

    #[test]
    fn test_communicator_configs() {
        let connection = ConnectionSettings {
            timeout_ms: 500,
            max_attempts: 5,
            legacy_max_retries: 2,
            handshake_ms: 1000,
            encoding: Encoding::Windows1252,
            ..ConnectionSettings::default()
        };

        let sonic = connection.sonic_config();
        assert_eq!(sonic.timeout, Duration::from_millis(500));
        assert_eq!(sonic.max_attempts, 5);
        assert_eq!(sonic.encoding, ChannelEncoding::Windows1252);

        let legacy = connection.legacy_config();
        assert_eq!(legacy.timeout, Duration::from_secs(10));
        assert_eq!(legacy.max_retries, 2);
        assert_eq!(legacy.handshake_duration, Duration::from_secs(1));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.connection.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "connection.max_attempts"
        ));

        let mut config = Config::default();
        config.transducer = Some("probe".to_string());
        assert!(config.validate().is_err());
        config.transducer_library = Some(PathBuf::from("transducers.json"));
        config.validate().unwrap();

        let mut config = Config::default();
        config.procedures.finish_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/config.toml")).unwrap(),
            FileFormat::Toml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("config.json")).unwrap(),
            FileFormat::Json
        );
        assert!(FileFormat::from_path(Path::new("config.yaml")).is_err());
        assert!(FileFormat::from_path(Path::new("config")).is_err());
    }
}
