//! Device identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Amplifier variant
///
/// Variant order matters: banner matching picks the first variant, in this
/// order, whose name occurs in the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Not identified
    #[default]
    Unknown,
    /// Descale amplifier
    Descale,
    /// Catch amplifier
    Catch,
    /// Wipe amplifier
    Wipe,
    /// MVP worker
    MvpWorker,
}

impl DeviceType {
    /// All identified variants in declaration order
    pub const IDENTIFIED: [DeviceType; 4] = [
        DeviceType::Descale,
        DeviceType::Catch,
        DeviceType::Wipe,
        DeviceType::MvpWorker,
    ];

    /// Name used by the firmware
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Descale => "descale",
            Self::Catch => "catch",
            Self::Wipe => "wipe",
            Self::MvpWorker => "mvp_worker",
        }
    }

    /// Identify the device from a firmware banner by substring
    pub fn from_banner(banner: &str) -> Self {
        let banner = banner.to_lowercase();
        Self::IDENTIFIED
            .into_iter()
            .find(|device_type| banner.contains(device_type.as_str()))
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "descale" => Ok(Self::Descale),
            "catch" => Ok(Self::Catch),
            "wipe" => Ok(Self::Wipe),
            "mvp_worker" => Ok(Self::MvpWorker),
            _ => Err(format!("Unknown device type: {}", s)),
        }
    }
}

/// Which wire protocol a connection speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Unframed line protocol of older firmware
    Legacy,
    /// Framed protocol with correlation ids
    Sonic,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Sonic => write!(f, "sonic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_from_banner() {
        assert_eq!(
            DeviceType::from_banner("mvp_worker v1.0.0 (build 42)"),
            DeviceType::MvpWorker
        );
        assert_eq!(DeviceType::from_banner("CATCH 0.4"), DeviceType::Catch);
        assert_eq!(DeviceType::from_banner("hello"), DeviceType::Unknown);
    }

    #[test]
    fn test_device_type_tie_break_uses_declaration_order() {
        // both names occur; descale is declared before wipe
        assert_eq!(
            DeviceType::from_banner("wipe-capable descale unit"),
            DeviceType::Descale
        );
    }
}
