//! Error types for the settings crate.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving or validating settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The file extension does not name a supported format.
    #[error("Unsupported settings format for {}: expected .json or .toml", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The configuration directory could not be found or created.
    #[error("Config directory error: {0}")]
    ConfigDirectory(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

impl SettingsError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<SettingsError> for sonicamp_core::Error {
    fn from(err: SettingsError) -> Self {
        sonicamp_core::Error::external(err)
    }
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::invalid("connection.timeout_ms", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'connection.timeout_ms': must be > 0"
        );

        let err = SettingsError::UnsupportedFormat {
            path: PathBuf::from("settings.yaml"),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported settings format for settings.yaml: expected .json or .toml"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SettingsError = io_err.into();
        assert!(matches!(err, SettingsError::IoError(_)));

        let core: sonicamp_core::Error = SettingsError::invalid("release", "bad").into();
        assert_eq!(core.to_string(), "Invalid setting 'release': bad");
    }

    #[test]
    fn test_core_conversion_keeps_source() {
        use std::error::Error as _;

        let parse = toml::from_str::<toml::Table>("release = ").unwrap_err();
        let core: sonicamp_core::Error = SettingsError::from(parse).into();
        assert!(core.to_string().starts_with("TOML error: "));
        assert!(core.source().is_some());
        match &core {
            sonicamp_core::Error::External(shared) => assert!(matches!(
                shared.downcast_ref::<SettingsError>(),
                Some(SettingsError::TomlError(_))
            )),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
