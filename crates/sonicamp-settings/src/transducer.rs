//! Transducer library
//!
//! A JSON array of named transducer configurations. Each configuration holds
//! up to four auto-tune slots (`atf`/`atk`/`att`/`aton` per slot, numbered
//! from 1 on the device) and optionally a script to run after applying it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{config_dir, FileFormat};
use crate::error::{SettingsError, SettingsResult};

/// Auto-tune slots a device offers
pub const AT_SLOTS: usize = 4;

/// One auto-tune slot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AtConfig {
    /// Temperature coefficient
    pub atk: f64,
    /// Resonance frequency in Hz
    pub atf: u32,
    /// Temperature in degree Celsius
    pub att: f64,
    /// On-time in milliseconds
    #[serde(default)]
    pub aton: u32,
}

/// A named transducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransducerConfig {
    pub name: String,
    pub atconfigs: Vec<AtConfig>,
    /// Script executed after the slots were written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_script_path: Option<PathBuf>,
}

impl TransducerConfig {
    pub fn new(name: impl Into<String>, atconfigs: Vec<AtConfig>) -> Self {
        Self {
            name: name.into(),
            atconfigs,
            init_script_path: None,
        }
    }

    /// Slots paired with their one-based device index
    pub fn slots(&self) -> impl Iterator<Item = (u32, &AtConfig)> {
        (1..).zip(self.atconfigs.iter())
    }

    fn validate(&self) -> SettingsResult<()> {
        if self.name.trim().is_empty() {
            return Err(SettingsError::invalid("name", "must not be empty"));
        }
        if self.atconfigs.len() > AT_SLOTS {
            return Err(SettingsError::invalid(
                "atconfigs",
                format!(
                    "{} has {} slots, devices offer {}",
                    self.name,
                    self.atconfigs.len(),
                    AT_SLOTS
                ),
            ));
        }
        Ok(())
    }
}

/// All known transducers, in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransducerLibrary {
    transducers: Vec<TransducerConfig>,
}

impl TransducerLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// `transducers.json` in the platform config directory
    pub fn default_path() -> SettingsResult<PathBuf> {
        Ok(config_dir()?.join("transducers.json"))
    }

    /// Load a library document
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let library: Self = FileFormat::Json.read(path)?;
        library.validate()?;
        tracing::debug!(
            path = %path.display(),
            transducers = library.len(),
            "Transducer library loaded"
        );
        Ok(library)
    }

    /// Load a library document, or an empty library if it does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save as a JSON document
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        FileFormat::Json.write(path, self)
    }

    /// Transducer called `name`
    pub fn get(&self, name: &str) -> Option<&TransducerConfig> {
        self.transducers.iter().find(|t| t.name == name)
    }

    /// Add a transducer or replace the one with the same name
    pub fn upsert(&mut self, transducer: TransducerConfig) -> SettingsResult<()> {
        transducer.validate()?;
        match self.transducers.iter_mut().find(|t| t.name == transducer.name) {
            Some(existing) => *existing = transducer,
            None => self.transducers.push(transducer),
        }
        Ok(())
    }

    /// Remove the transducer called `name`
    pub fn remove(&mut self, name: &str) -> Option<TransducerConfig> {
        let index = self.transducers.iter().position(|t| t.name == name)?;
        Some(self.transducers.remove(index))
    }

    pub fn names(&self) -> Vec<&str> {
        self.transducers.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransducerConfig> {
        self.transducers.iter()
    }

    pub fn len(&self) -> usize {
        self.transducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transducers.is_empty()
    }

    /// Validate every entry and reject duplicate names
    pub fn validate(&self) -> SettingsResult<()> {
        for (i, transducer) in self.transducers.iter().enumerate() {
            transducer.validate()?;
            if self.transducers[..i]
                .iter()
                .any(|other| other.name == transducer.name)
            {
                return Err(SettingsError::invalid(
                    "name",
                    format!("duplicate transducer {}", transducer.name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(atf: u32) -> AtConfig {
        AtConfig {
            atk: 0.5,
            atf,
            att: 23.0,
            aton: 100,
        }
    }

    #[test]
    fn test_document_shape() {
        let json = r#"[
            {"name": "probe", "atconfigs": [{"atk": 1.5, "atf": 1000000, "att": 20.0, "aton": 50}],
             "init_script_path": "init.txt"},
            {"name": "bath", "atconfigs": []}
        ]"#;
        let library: TransducerLibrary = serde_json::from_str(json).unwrap();
        assert_eq!(library.names(), ["probe", "bath"]);

        let probe = library.get("probe").unwrap();
        assert_eq!(probe.init_script_path, Some(PathBuf::from("init.txt")));
        assert_eq!(
            probe.slots().collect::<Vec<_>>(),
            [(
                1,
                &AtConfig {
                    atk: 1.5,
                    atf: 1_000_000,
                    att: 20.0,
                    aton: 50
                }
            )]
        );
        assert_eq!(library.get("bath").unwrap().init_script_path, None);
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let mut library = TransducerLibrary::new();
        library
            .upsert(TransducerConfig::new("probe", vec![slot(1)]))
            .unwrap();
        library
            .upsert(TransducerConfig::new("bath", vec![slot(2)]))
            .unwrap();
        library
            .upsert(TransducerConfig::new("probe", vec![slot(3), slot(4)]))
            .unwrap();

        assert_eq!(library.names(), ["probe", "bath"]);
        assert_eq!(library.get("probe").unwrap().atconfigs.len(), 2);
        assert!(library.remove("bath").is_some());
        assert!(library.remove("bath").is_none());
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_invalid_entries_are_rejected() {
        let mut library = TransducerLibrary::new();
        assert!(library
            .upsert(TransducerConfig::new("  ", Vec::new()))
            .is_err());
        assert!(library
            .upsert(TransducerConfig::new("big", vec![slot(1); 5]))
            .is_err());

        let json = r#"[{"name": "a", "atconfigs": []}, {"name": "a", "atconfigs": []}]"#;
        let duplicated: TransducerLibrary = serde_json::from_str(json).unwrap();
        assert!(duplicated.validate().is_err());
    }
}
