//! Procedure identifiers shared by the controller and its events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of long-running procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    /// Frequency ramp
    Ramp,
    /// Frequency scan
    Scan,
    /// Resonance tuning
    Tune,
    /// Wipe cycle
    Wipe,
    /// Automatic tuning
    Auto,
    /// Local spectrum measurement
    SpectrumMeasure,
}

impl ProcedureKind {
    /// All procedure kinds
    pub const ALL: [ProcedureKind; 6] = [
        ProcedureKind::Ramp,
        ProcedureKind::Scan,
        ProcedureKind::Tune,
        ProcedureKind::Wipe,
        ProcedureKind::Auto,
        ProcedureKind::SpectrumMeasure,
    ];
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ramp => write!(f, "Ramp"),
            Self::Scan => write!(f, "Scan"),
            Self::Tune => write!(f, "Tune"),
            Self::Wipe => write!(f, "Wipe"),
            Self::Auto => write!(f, "Auto"),
            Self::SpectrumMeasure => write!(f, "SpectrumMeasure"),
        }
    }
}

impl FromStr for ProcedureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ramp" => Ok(Self::Ramp),
            "scan" => Ok(Self::Scan),
            "tune" => Ok(Self::Tune),
            "wipe" => Ok(Self::Wipe),
            "auto" => Ok(Self::Auto),
            "spectrum_measure" | "spectrummeasure" | "spectrum" => Ok(Self::SpectrumMeasure),
            _ => Err(format!("Unknown procedure: {}", s)),
        }
    }
}
