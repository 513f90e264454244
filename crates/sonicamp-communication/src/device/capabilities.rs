//! Command sets of legacy firmware
//!
//! Legacy firmware cannot list its commands, so the supported set is derived
//! from the device type and the firmware version in the banner.

use sonicamp_core::{DeviceType, Version};
use std::collections::BTreeSet;

use crate::commands::CommandCode;

const BASIC: &[CommandCode] = &[
    CommandCode::GetInfo,
    CommandCode::GetType,
    CommandCode::GetOverview,
    CommandCode::Dash,
    CommandCode::GetModules,
    CommandCode::SetFrequency,
    CommandCode::SetGain,
    CommandCode::SetOn,
    CommandCode::SetOff,
    CommandCode::SetAuto,
    CommandCode::SetSerialMode,
    CommandCode::SetAnalogMode,
];

const SINCE_0_4: &[CommandCode] = &[
    CommandCode::GetFrequency,
    CommandCode::GetGain,
    CommandCode::GetTemperature,
    CommandCode::GetAtf,
    CommandCode::GetAtk,
    CommandCode::GetAtt,
    CommandCode::SetAtf,
    CommandCode::SetAtk,
    CommandCode::SetAtt,
];

const SINCE_0_5: &[CommandCode] = &[CommandCode::GetSensors];

const RELAY: &[CommandCode] = &[CommandCode::SetKhzMode, CommandCode::SetMhzMode];

/// Wipe firmware only drives the frequency
const WIPE: &[CommandCode] = &[
    CommandCode::GetInfo,
    CommandCode::GetType,
    CommandCode::GetOverview,
    CommandCode::Dash,
    CommandCode::SetFrequency,
    CommandCode::GetFrequency,
    CommandCode::SetOn,
    CommandCode::SetOff,
    CommandCode::SetSerialMode,
    CommandCode::SetAnalogMode,
];

/// Commands of a legacy device
pub fn legacy_commands(device_type: DeviceType, version: Version) -> BTreeSet<CommandCode> {
    if device_type == DeviceType::Wipe {
        return WIPE.iter().copied().collect();
    }

    let mut commands: BTreeSet<CommandCode> = BASIC.iter().copied().collect();
    if version >= Version::new(0, 4, 0) {
        commands.extend(SINCE_0_4);
    }
    if version >= Version::new(0, 5, 0) {
        commands.extend(SINCE_0_5);
    }
    match device_type {
        DeviceType::Catch => commands.extend(RELAY),
        DeviceType::Descale => {
            commands.remove(&CommandCode::SetFrequency);
            commands.insert(CommandCode::SetSwitchingFrequency);
        }
        _ => {}
    }
    commands
}

/// Codes listed by `?list_commands`, `#` or whitespace separated
///
/// Unknown numbers are skipped.
pub fn parse_command_list(text: &str) -> BTreeSet<CommandCode> {
    text.split(|c: char| c == '#' || c.is_whitespace())
        .filter_map(|token| token.trim().parse::<i32>().ok())
        .filter_map(|value| {
            let code = CommandCode::from_value(value);
            if code.is_none() {
                tracing::debug!(value, "Ignoring unknown command code");
            }
            code
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_tables_grow_with_version() {
        let v3 = legacy_commands(DeviceType::Catch, Version::new(0, 3, 0));
        let v4 = legacy_commands(DeviceType::Catch, Version::new(0, 4, 1));
        let v5 = legacy_commands(DeviceType::Catch, Version::new(0, 5, 0));
        assert!(v3.contains(&CommandCode::SetKhzMode));
        assert!(!v3.contains(&CommandCode::SetAtf));
        assert!(v4.contains(&CommandCode::SetAtf));
        assert!(!v4.contains(&CommandCode::GetSensors));
        assert!(v5.contains(&CommandCode::GetSensors));
    }

    #[test]
    fn test_device_specific_tables() {
        let descale = legacy_commands(DeviceType::Descale, Version::new(0, 4, 0));
        assert!(descale.contains(&CommandCode::SetSwitchingFrequency));
        assert!(!descale.contains(&CommandCode::SetFrequency));

        let wipe = legacy_commands(DeviceType::Wipe, Version::new(0, 5, 0));
        assert!(wipe.contains(&CommandCode::SetFrequency));
        assert!(!wipe.contains(&CommandCode::SetGain));
    }

    #[test]
    fn test_parse_command_list() {
        let codes = parse_command_list("20#21#1050#99999\n1060");
        assert!(codes.contains(&CommandCode::GetInfo));
        assert!(codes.contains(&CommandCode::SetOn));
        assert_eq!(codes.len(), 4);
    }
}
