//! Protocol builder
//!
//! Narrows a [`Protocol`] to the commands one device understands.

use sonicamp_core::{DeviceType, ProtocolError, Version};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::codes::CommandCode;
use super::command::{BoundCommand, CommandArgs};
use super::contract::{CommandContract, MetaExport};
use super::protocol::Protocol;

/// Compiles command tables for concrete devices
#[derive(Debug, Clone, Default)]
pub struct ProtocolBuilder {
    protocol: Protocol,
}

/// The admitted definition with the highest minimum version
///
/// Among definitions sharing that version the last declared one wins, so a
/// later entry overrides an earlier one.
fn select<'a, T>(
    defs: &'a [MetaExport<T>],
    device_type: DeviceType,
    version: Version,
    release: bool,
) -> Result<&'a T, &'static str> {
    defs.iter()
        .filter(|def| def.admits(device_type, version, release))
        .max_by_key(|def| def.min_protocol_version)
        .map(|def| &def.exports)
        .ok_or("no definition admitted")
}

impl ProtocolBuilder {
    /// Builder over the given contracts
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    /// The underlying contracts
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Bind one contract, or explain why it does not apply
    fn bind(
        contract: &CommandContract,
        device_type: DeviceType,
        version: Version,
        release: bool,
    ) -> Result<BoundCommand, String> {
        let command_def = select(&contract.command_defs, device_type, version, release)
            .map_err(|e| format!("command: {e}"))?;
        let answer_def = select(&contract.answer_defs, device_type, version, release)
            .map_err(|e| format!("answer: {e}"))?;
        BoundCommand::new(contract.code, command_def.clone(), answer_def.clone())
            .map_err(|e| format!("answer regex: {e}"))
    }

    /// Build the command table for a device
    ///
    /// Contracts in groups that do not admit the device are skipped silently.
    /// Within an admitted group, a contract with commands but no applicable
    /// answer definition is dropped with a warning.
    pub fn build(&self, device_type: DeviceType, version: Version, release: bool) -> CommandTable {
        let mut commands = HashMap::new();
        for group in &self.protocol.exports {
            if !group.admits(device_type, version, release) {
                continue;
            }
            for contract in &group.exports {
                let has_any_command = contract
                    .command_defs
                    .iter()
                    .any(|def| def.admits(device_type, version, release));
                if !has_any_command {
                    tracing::debug!(
                        command = %contract.code,
                        device_type = %device_type,
                        version = %version,
                        "Command not available"
                    );
                    continue;
                }
                match Self::bind(contract, device_type, version, release) {
                    Ok(bound) => {
                        commands.insert(contract.code, Arc::new(bound));
                    }
                    Err(reason) => tracing::warn!(
                        command = %contract.code,
                        device_type = %device_type,
                        version = %version,
                        %reason,
                        "Dropping command contract"
                    ),
                }
            }
        }
        tracing::debug!(
            device_type = %device_type,
            version = %version,
            commands = commands.len(),
            "Built command table"
        );
        CommandTable { commands }
    }
}

/// The commands bound for one device
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: HashMap<CommandCode, Arc<BoundCommand>>,
}

impl CommandTable {
    /// Look a command up
    pub fn get(&self, code: CommandCode) -> Option<Arc<BoundCommand>> {
        self.commands.get(&code).cloned()
    }

    /// Whether a command is available
    pub fn contains(&self, code: CommandCode) -> bool {
        self.commands.contains_key(&code)
    }

    /// Available codes in ascending order
    pub fn codes(&self) -> Vec<CommandCode> {
        let mut codes: Vec<CommandCode> = self.commands.keys().copied().collect();
        codes.sort();
        codes
    }

    /// Number of bound commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command is bound
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Keep only the given codes
    pub fn restricted_to(&self, codes: &BTreeSet<CommandCode>) -> Self {
        Self {
            commands: self
                .commands
                .iter()
                .filter(|(code, _)| codes.contains(code))
                .map(|(code, bound)| (*code, Arc::clone(bound)))
                .collect(),
        }
    }

    /// Recognize a command written as text, e.g. `!atf2=1200000`
    ///
    /// Spellings are tried longest first so that `!freq` wins over `!f`.
    /// The first spelling whose remainder parses as valid arguments is
    /// taken; if every matching spelling rejects its arguments, the error of
    /// the longest one is returned.
    pub fn match_text(&self, text: &str) -> Result<(Arc<BoundCommand>, CommandArgs), ProtocolError> {
        let text = text.trim();
        let mut candidates: Vec<(&str, &Arc<BoundCommand>)> = self
            .commands
            .values()
            .flat_map(|bound| {
                bound
                    .command_def
                    .spellings()
                    .filter(move |spelling| text.starts_with(spelling))
                    .map(move |spelling| (spelling, bound))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut first_error = None;
        for (spelling, bound) in candidates {
            match bound.parse_arguments(&text[spelling.len()..]) {
                Ok(args) => return Ok((Arc::clone(bound), args)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| ProtocolError::UnknownCommand {
            text: text.to_string(),
        }))
    }
}
