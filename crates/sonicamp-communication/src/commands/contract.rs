//! Command contracts
//!
//! A contract describes one [`CommandCode`] across firmware generations:
//! every spelling of the command ([`CommandDef`]) and every answer layout
//! ([`AnswerDef`]), each gated by a [`MetaExport`]. The protocol builder
//! picks the one definition of each that applies to a concrete device.

use sonicamp_core::{DeviceType, Version};

use super::codes::CommandCode;
use super::fields::{AnswerField, FieldType};

/// Gating metadata around an exported definition
#[derive(Debug, Clone, PartialEq)]
pub struct MetaExport<T> {
    /// The gated definition.
    pub exports: T,
    /// First protocol version that has it.
    pub min_protocol_version: Version,
    /// First protocol version that no longer has it.
    pub deprecated_protocol_version: Option<Version>,
    /// If set, only these device types have it.
    pub included_device_types: Option<Vec<DeviceType>>,
    /// Device types that never have it.
    pub excluded_device_types: Vec<DeviceType>,
    /// False for definitions only available in debug builds.
    pub is_release: bool,
}

impl<T> MetaExport<T> {
    /// Export available on every version and device
    pub fn new(exports: T) -> Self {
        Self {
            exports,
            min_protocol_version: Version::new(0, 0, 0),
            deprecated_protocol_version: None,
            included_device_types: None,
            excluded_device_types: Vec::new(),
            is_release: true,
        }
    }

    /// Available from `version` on
    pub fn since(mut self, version: Version) -> Self {
        self.min_protocol_version = version;
        self
    }

    /// Gone from `version` on
    pub fn until(mut self, version: Version) -> Self {
        self.deprecated_protocol_version = Some(version);
        self
    }

    /// Only for the given device types
    pub fn only_for(mut self, device_types: &[DeviceType]) -> Self {
        self.included_device_types = Some(device_types.to_vec());
        self
    }

    /// Not for the given device types
    pub fn except(mut self, device_types: &[DeviceType]) -> Self {
        self.excluded_device_types = device_types.to_vec();
        self
    }

    /// Dropped from release builds
    pub fn debug_only(mut self) -> Self {
        self.is_release = false;
        self
    }

    /// Whether the export applies to the given target
    pub fn admits(&self, device_type: DeviceType, version: Version, release: bool) -> bool {
        if version < self.min_protocol_version {
            return false;
        }
        if self
            .deprecated_protocol_version
            .is_some_and(|deprecated| version >= deprecated)
        {
            return false;
        }
        if self.excluded_device_types.contains(&device_type) {
            return false;
        }
        if let Some(included) = &self.included_device_types {
            if !included.contains(&device_type) {
                return false;
            }
        }
        !(release && !self.is_release)
    }
}

/// A named, typed command parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name.
    pub name: String,
    /// Legal values.
    pub field_type: FieldType,
}

impl ParamDef {
    /// Create a parameter
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// How a command is spelled on the wire
///
/// `<identifier>[<index>][=<value>]`, e.g. `!atf2=1200000`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDef {
    /// Primary spelling.
    pub identifier: String,
    /// Alternative spellings accepted when parsing.
    pub aliases: Vec<String>,
    /// Parameter written right after the identifier.
    pub index_param: Option<ParamDef>,
    /// Parameter written after `=`.
    pub setter_param: Option<ParamDef>,
}

impl CommandDef {
    /// Command without parameters
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            aliases: Vec::new(),
            index_param: None,
            setter_param: None,
        }
    }

    /// Add an alias
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// Add the index parameter
    pub fn index(mut self, name: &str, field_type: FieldType) -> Self {
        self.index_param = Some(ParamDef::new(name, field_type));
        self
    }

    /// Add the setter parameter
    pub fn setter(mut self, name: &str, field_type: FieldType) -> Self {
        self.setter_param = Some(ParamDef::new(name, field_type));
        self
    }

    /// Primary spelling followed by the aliases
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.identifier.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Layout of an answer
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerDef {
    /// Fields in wire order.
    pub fields: Vec<AnswerField>,
    /// Text between fields.
    pub separator: String,
    /// Whether the body starts with `<code>#`.
    pub code_prefixed: bool,
    /// Whether the answer may span several lines.
    pub multiline: bool,
}

impl AnswerDef {
    /// Answer made of the given fields, `#` separated
    pub fn new(fields: Vec<AnswerField>) -> Self {
        Self {
            fields,
            separator: "#".to_string(),
            code_prefixed: false,
            multiline: false,
        }
    }

    /// Answer without fields; any body is accepted
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Use a different field separator
    pub fn separated_by(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// The body starts with the echoed command code
    pub fn code_prefixed(mut self) -> Self {
        self.code_prefixed = true;
        self
    }

    /// The answer may span several lines
    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }
}

/// Every known definition of one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContract {
    /// Command code.
    pub code: CommandCode,
    /// Gated spellings.
    pub command_defs: Vec<MetaExport<CommandDef>>,
    /// Gated answer layouts.
    pub answer_defs: Vec<MetaExport<AnswerDef>>,
    /// Short description for help texts.
    pub description: String,
}

impl CommandContract {
    /// Create an empty contract
    pub fn new(code: CommandCode, description: &str) -> Self {
        Self {
            code,
            command_defs: Vec::new(),
            answer_defs: Vec::new(),
            description: description.to_string(),
        }
    }

    /// Add a gated command definition
    pub fn command(mut self, def: MetaExport<CommandDef>) -> Self {
        self.command_defs.push(def);
        self
    }

    /// Add a gated answer definition
    pub fn answer(mut self, def: MetaExport<AnswerDef>) -> Self {
        self.answer_defs.push(def);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_window() {
        let legacy = MetaExport::new(()).until(Version::new(1, 0, 0));
        assert!(legacy.admits(DeviceType::Catch, Version::new(0, 4, 0), true));
        assert!(!legacy.admits(DeviceType::Catch, Version::new(1, 0, 0), true));

        let sonic = MetaExport::new(()).since(Version::new(1, 0, 0));
        assert!(!sonic.admits(DeviceType::Catch, Version::new(0, 9, 9), true));
        assert!(sonic.admits(DeviceType::Catch, Version::new(1, 2, 0), true));
    }

    #[test]
    fn test_device_type_and_release_gates() {
        let descale = MetaExport::new(()).only_for(&[DeviceType::Descale]);
        assert!(descale.admits(DeviceType::Descale, Version::default(), true));
        assert!(!descale.admits(DeviceType::Wipe, Version::default(), true));

        let not_wipe = MetaExport::new(()).except(&[DeviceType::Wipe]);
        assert!(!not_wipe.admits(DeviceType::Wipe, Version::default(), true));
        assert!(not_wipe.admits(DeviceType::Unknown, Version::default(), true));

        let debug = MetaExport::new(()).debug_only();
        assert!(!debug.admits(DeviceType::Catch, Version::default(), true));
        assert!(debug.admits(DeviceType::Catch, Version::default(), false));
    }
}
