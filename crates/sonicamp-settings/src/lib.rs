//! SonicAmp Settings Crate
//!
//! Application configuration and the transducer library, persisted in the
//! platform config directory.

pub mod config;
pub mod error;
pub mod transducer;

pub use config::{
    config_dir, Config, ConnectionSettings, Encoding, FileFormat, LoggingSettings, APP_DIR,
};
pub use error::{SettingsError, SettingsResult};
pub use transducer::{AtConfig, TransducerConfig, TransducerLibrary, AT_SLOTS};
