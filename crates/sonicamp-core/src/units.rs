//! Unit handling
//!
//! SI units and prefixes that appear in device answers (`1000 kHz`,
//! `35.2 °C`) and the hold-time units used by procedures and scripts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Physical unit attached to a device answer field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiUnit {
    /// Hertz
    Hertz,
    /// Percent (gain)
    Percent,
    /// Degree Celsius
    Celsius,
    /// Volt
    Volt,
    /// Ampere
    Ampere,
    /// Degree (phase)
    Degree,
    /// Second
    Second,
}

impl SiUnit {
    /// Unit symbol as written by the firmware
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Hertz => "Hz",
            Self::Percent => "%",
            Self::Celsius => "°C",
            Self::Volt => "V",
            Self::Ampere => "A",
            Self::Degree => "°",
            Self::Second => "s",
        }
    }
}

impl fmt::Display for SiUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Decimal SI prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiPrefix {
    /// 10^-9
    Nano,
    /// 10^-6
    Micro,
    /// 10^-3
    Milli,
    /// 10^0, written as nothing
    None,
    /// 10^3
    Kilo,
    /// 10^6
    Mega,
}

impl SiPrefix {
    /// Prefix symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Nano => "n",
            Self::Micro => "u",
            Self::Milli => "m",
            Self::None => "",
            Self::Kilo => "k",
            Self::Mega => "M",
        }
    }

    /// Parse a prefix symbol; `µ` is accepted for micro
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "n" => Some(Self::Nano),
            "u" | "µ" => Some(Self::Micro),
            "m" => Some(Self::Milli),
            "" => Some(Self::None),
            "k" => Some(Self::Kilo),
            "M" => Some(Self::Mega),
            _ => None,
        }
    }

    /// Power of ten this prefix stands for
    pub fn exponent(&self) -> i32 {
        match self {
            Self::Nano => -9,
            Self::Micro => -6,
            Self::Milli => -3,
            Self::None => 0,
            Self::Kilo => 3,
            Self::Mega => 6,
        }
    }

    /// Multiplier from prefixed to base unit
    pub fn factor(&self) -> f64 {
        10f64.powi(self.exponent())
    }

    /// Convert a prefixed value to the base unit
    pub fn to_base(&self, value: f64) -> f64 {
        value * self.factor()
    }

    /// Convert a base-unit value to this prefix
    pub fn from_base(&self, value: f64) -> f64 {
        value / self.factor()
    }
}

impl fmt::Display for SiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unit of a hold time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds
    #[serde(rename = "s")]
    Seconds,
    /// Milliseconds
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds => write!(f, "s"),
            Self::Milliseconds => write!(f, "ms"),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Self::Seconds),
            "ms" => Ok(Self::Milliseconds),
            _ => Err(format!("Unknown time unit: {}", s)),
        }
    }
}

/// A duration as the user wrote it: a value and its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldTime {
    /// Magnitude in `unit`.
    pub value: f64,
    /// Unit of `value`.
    pub unit: TimeUnit,
}

impl HoldTime {
    /// Create a hold time
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Hold time in milliseconds
    pub fn ms(value: f64) -> Self {
        Self::new(value, TimeUnit::Milliseconds)
    }

    /// Hold time in seconds
    pub fn secs(value: f64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    /// Zero hold time
    pub fn zero() -> Self {
        Self::ms(0.0)
    }

    /// Value converted to milliseconds
    pub fn as_millis(&self) -> f64 {
        match self.unit {
            TimeUnit::Seconds => self.value * 1000.0,
            TimeUnit::Milliseconds => self.value,
        }
    }

    /// Whether this hold time is zero (or negative)
    pub fn is_zero(&self) -> bool {
        self.as_millis() <= 0.0
    }

    /// Convert to a [`Duration`]; negative values clamp to zero
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs_f64(self.as_millis().max(0.0) / 1000.0)
    }
}

impl Default for HoldTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for HoldTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

impl FromStr for HoldTime {
    type Err = String;

    /// Parse `5ms`, `2s`, `1.5s`. A bare number is taken as milliseconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (number, unit) = if let Some(number) = s.strip_suffix("ms") {
            (number, TimeUnit::Milliseconds)
        } else if let Some(number) = s.strip_suffix('s') {
            (number, TimeUnit::Seconds)
        } else {
            (s, TimeUnit::Milliseconds)
        };

        let value: f64 = number
            .parse()
            .map_err(|_| format!("Invalid duration: {}", s))?;
        if !value.is_finite() || value < 0.0 {
            return Err(format!("Invalid duration: {}", s));
        }
        Ok(Self::new(value, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scaling() {
        assert_eq!(SiPrefix::Kilo.to_base(1000.0), 1_000_000.0);
        assert_eq!(SiPrefix::Mega.from_base(2_000_000.0), 2.0);
        assert!((SiPrefix::Milli.to_base(500.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_hold_time_parsing() {
        assert_eq!("5ms".parse::<HoldTime>().unwrap(), HoldTime::ms(5.0));
        assert_eq!("2s".parse::<HoldTime>().unwrap(), HoldTime::secs(2.0));
        assert_eq!("250".parse::<HoldTime>().unwrap(), HoldTime::ms(250.0));
        assert!("fast".parse::<HoldTime>().is_err());
        assert!("-1s".parse::<HoldTime>().is_err());
    }

    #[test]
    fn test_hold_time_duration() {
        assert_eq!(HoldTime::secs(1.5).to_duration(), Duration::from_millis(1500));
        assert_eq!(HoldTime::ms(10.0).to_duration(), Duration::from_millis(10));
        assert!(HoldTime::zero().is_zero());
    }
}
