//! Typed values carried by answer fields and command arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic version triple reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl Version {
    /// Create a version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Find the first `X.Y` or `X.Y.Z` sequence (optionally prefixed by `v`) in `text`
    pub fn find_in(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            if bytes[start].is_ascii_digit() && (start == 0 || !bytes[start - 1].is_ascii_digit()) {
                let end = text[start..]
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .map(|offset| start + offset)
                    .unwrap_or(text.len());
                let candidate = text[start..end].trim_end_matches('.');
                if candidate.contains('.') {
                    if let Ok(version) = candidate.parse() {
                        return Some(version);
                    }
                }
                start = end;
            } else {
                start += 1;
            }
        }
        None
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(format!("Invalid version: {}", s));
        }
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("Invalid version: {}", s))
        };
        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: match parts.get(2) {
                Some(part) => parse(part)?,
                None => 0,
            },
        })
    }
}

/// A decoded answer field or command argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean (also signals)
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Firmware version
    Version(Version),
    /// Free text or enum member
    Str(String),
}

impl FieldValue {
    /// Integer view; floats are rounded
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(v.round() as i64),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Unsigned 32-bit view, `None` when out of range
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|v| u32::try_from(v).ok())
    }

    /// Floating point view
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// String view for text values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Self::Float(v) => write!(f, "{}", v),
            Self::Version(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Version> for FieldValue {
    fn from(v: Version) -> Self {
        Self::Version(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!("1.0.0".parse::<Version>().unwrap(), Version::new(1, 0, 0));
        assert_eq!("v0.4".parse::<Version>().unwrap(), Version::new(0, 4, 0));
        assert!("1".parse::<Version>().is_err());
        assert!("1.x.0".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_find_in_banner() {
        assert_eq!(
            Version::find_in("mvp_worker v1.0.0 (build 42)"),
            Some(Version::new(1, 0, 0))
        );
        assert_eq!(
            Version::find_in("Welcome to catch firmware 0.4."),
            Some(Version::new(0, 4, 0))
        );
        assert_eq!(Version::find_in("no version here 42"), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(0, 5, 0) < Version::new(1, 0, 0));
        assert!(Version::new(1, 0, 1) > Version::new(1, 0, 0));
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::Float(1_000_000.0).as_u32(), Some(1_000_000));
        assert_eq!(FieldValue::Int(-1).as_u32(), None);
        assert_eq!(FieldValue::Int(1).as_bool(), Some(true));
        assert_eq!(FieldValue::Float(998000.0).to_string(), "998000");
        assert_eq!(FieldValue::Float(0.5).to_string(), "0.5");
    }
}
