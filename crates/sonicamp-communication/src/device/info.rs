//! Device identity gathered during the handshake

use serde::{Deserialize, Serialize};
use sonicamp_core::{DeviceType, ProtocolKind, Version};
use std::collections::BTreeSet;

use crate::commands::CommandCode;

/// What the handshake learned about a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Amplifier variant.
    pub device_type: DeviceType,
    /// Firmware version, `0.0.0` if the banner had none.
    pub firmware_version: Version,
    /// Raw firmware banner.
    pub firmware_info: String,
    /// Protocol the connection speaks.
    pub protocol: ProtocolKind,
    /// Commands the device accepts.
    pub supported_commands: BTreeSet<CommandCode>,
}

impl Info {
    /// Identify a device from its banner
    pub fn from_banner(banner: &str, protocol: ProtocolKind) -> Self {
        let firmware_info = banner.trim().to_string();
        Self {
            device_type: DeviceType::from_banner(&firmware_info),
            firmware_version: Version::find_in(&firmware_info).unwrap_or_default(),
            firmware_info,
            protocol,
            supported_commands: BTreeSet::new(),
        }
    }

    /// Whether a command is in the supported set
    pub fn supports(&self, code: CommandCode) -> bool {
        self.supported_commands.contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_banner() {
        let info = Info::from_banner("mvp_worker v1.0.0 (build 42)\n", ProtocolKind::Sonic);
        assert_eq!(info.device_type, DeviceType::MvpWorker);
        assert_eq!(info.firmware_version, Version::new(1, 0, 0));
        assert_eq!(info.firmware_info, "mvp_worker v1.0.0 (build 42)");
        assert!(!info.supports(CommandCode::SetOn));
    }

    #[test]
    fn test_banner_without_version() {
        let info = Info::from_banner("Welcome\n\ncatch amp", ProtocolKind::Legacy);
        assert_eq!(info.device_type, DeviceType::Catch);
        assert_eq!(info.firmware_version, Version::default());
    }
}
