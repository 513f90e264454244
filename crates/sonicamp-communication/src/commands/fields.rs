//! Field types, paths and answer fields
//!
//! A [`FieldType`] describes one value on the wire: how to capture it with a
//! regex, how to convert the captured text, and which values are legal. The
//! same type checks command arguments on the way out.

use sonicamp_core::{FieldValue, SiPrefix, SiUnit, Version};
use std::fmt;

/// Primitive shape of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Signed integer
    Int,
    /// Decimal number
    Float,
    /// `true|false|0|1`
    Bool,
    /// Free text
    Str,
    /// Firmware version `X.Y[.Z]`
    Version,
    /// Output signal, `on|off` or a boolean
    Signal,
    /// One of a fixed set of names
    Enum(Vec<String>),
}

/// Value type of a parameter or answer field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    /// Primitive shape.
    pub kind: FieldKind,
    /// Physical unit written after the value, if any.
    pub unit: Option<SiUnit>,
    /// Prefix assumed when a value carries no unit suffix.
    pub prefix: SiPrefix,
    /// Legal values; anything else is rejected.
    pub allowed_values: Option<Vec<FieldValue>>,
    /// Inclusive lower bound in the base unit.
    pub min: Option<f64>,
    /// Inclusive upper bound in the base unit.
    pub max: Option<f64>,
}

impl FieldType {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            unit: None,
            prefix: SiPrefix::None,
            allowed_values: None,
            min: None,
            max: None,
        }
    }

    /// Integer field
    pub fn int() -> Self {
        Self::of(FieldKind::Int)
    }

    /// Decimal field
    pub fn float() -> Self {
        Self::of(FieldKind::Float)
    }

    /// Boolean field
    pub fn boolean() -> Self {
        Self::of(FieldKind::Bool)
    }

    /// Text field
    pub fn string() -> Self {
        Self::of(FieldKind::Str)
    }

    /// Version field
    pub fn version() -> Self {
        Self::of(FieldKind::Version)
    }

    /// Signal field
    pub fn signal() -> Self {
        Self::of(FieldKind::Signal)
    }

    /// Enumeration field
    pub fn enumeration(members: &[&str]) -> Self {
        Self::of(FieldKind::Enum(
            members.iter().map(|m| m.to_string()).collect(),
        ))
    }

    /// Attach a unit
    pub fn with_unit(mut self, unit: SiUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Prefix assumed for bare values
    pub fn with_prefix(mut self, prefix: SiPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Restrict to a set of values
    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to an inclusive range
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Regex fragment capturing the value text
    pub fn capture_pattern(&self) -> &'static str {
        match self.kind {
            FieldKind::Int => r"[+-]?\d+",
            FieldKind::Float => r"[+-]?\d+(?:\.\d+)?",
            FieldKind::Bool => "true|false|0|1",
            FieldKind::Str | FieldKind::Version | FieldKind::Signal | FieldKind::Enum(_) => ".*?",
        }
    }

    /// Regex fragment for the optional unit suffix, capturing the prefix
    /// symbol into `group`
    pub fn unit_pattern(&self, group: &str) -> Option<String> {
        self.unit.map(|unit| {
            format!(
                r"(?:\s*(?P<{}>[nuµmkM])?{})?",
                group,
                regex::escape(unit.symbol())
            )
        })
    }

    /// Convert captured answer text into a value in the base unit
    ///
    /// `written_prefix` is the prefix symbol that followed the value, if a
    /// unit suffix was present.
    pub fn convert(
        &self,
        raw: &str,
        written_prefix: Option<&str>,
    ) -> Result<FieldValue, String> {
        let raw = raw.trim();
        let prefix = match written_prefix {
            Some(symbol) => {
                SiPrefix::from_symbol(symbol).ok_or_else(|| format!("unknown prefix {symbol}"))?
            }
            None => self.prefix,
        };

        let value = match &self.kind {
            FieldKind::Int => {
                let v: i64 = raw.parse().map_err(|_| format!("not an integer: {raw:?}"))?;
                if prefix == SiPrefix::None {
                    FieldValue::Int(v)
                } else {
                    FieldValue::Int(prefix.to_base(v as f64).round() as i64)
                }
            }
            FieldKind::Float => {
                let v: f64 = raw.parse().map_err(|_| format!("not a number: {raw:?}"))?;
                FieldValue::Float(prefix.to_base(v))
            }
            FieldKind::Bool => FieldValue::Bool(parse_bool(raw)?),
            FieldKind::Signal => FieldValue::Bool(parse_signal(raw)?),
            FieldKind::Str => FieldValue::Str(raw.to_string()),
            FieldKind::Version => FieldValue::Version(raw.parse::<Version>()?),
            FieldKind::Enum(members) => {
                if !members.iter().any(|m| m == raw) {
                    return Err(format!("{raw:?} is not one of {}", members.join(", ")));
                }
                FieldValue::Str(raw.to_string())
            }
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Parse a command argument written by a user or a script
    pub fn parse_argument(&self, raw: &str) -> Result<FieldValue, String> {
        self.convert(raw, None)
    }

    /// Check a value against the kind, the allowed set and the range
    pub fn check(&self, value: &FieldValue) -> Result<(), String> {
        let kind_fits = match (&self.kind, value) {
            (FieldKind::Int, FieldValue::Int(_)) => true,
            (FieldKind::Int, FieldValue::Float(v)) => v.fract() == 0.0,
            (FieldKind::Float, FieldValue::Int(_) | FieldValue::Float(_)) => true,
            (FieldKind::Bool | FieldKind::Signal, FieldValue::Bool(_)) => true,
            (FieldKind::Str, FieldValue::Str(_)) => true,
            (FieldKind::Version, FieldValue::Version(_)) => true,
            (FieldKind::Enum(members), FieldValue::Str(v)) => members.contains(v),
            _ => false,
        };
        if !kind_fits {
            return Err(format!("{value} does not fit {:?}", self.kind));
        }

        if let Some(allowed) = &self.allowed_values {
            let is_allowed = allowed.iter().any(|a| match (a.as_f64(), value.as_f64()) {
                (Some(a), Some(v)) => a == v,
                _ => a == value,
            });
            if !is_allowed {
                let listed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
                return Err(format!("{value} is not one of {}", listed.join(", ")));
            }
        }

        if let Some(v) = value.as_f64() {
            if self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max) {
                return Err(format!(
                    "{value} is outside {}..={}",
                    self.min.map(|m| m.to_string()).unwrap_or_default(),
                    self.max.map(|m| m.to_string()).unwrap_or_default()
                ));
            }
        }
        Ok(())
    }

    /// Spell a value the way the firmware expects it
    pub fn format_argument(&self, value: &FieldValue) -> String {
        match (&self.kind, value) {
            (FieldKind::Int, v) => v
                .as_i64()
                .map(|v| v.to_string())
                .unwrap_or_else(|| v.to_string()),
            (FieldKind::Bool, FieldValue::Bool(v)) => (if *v { "1" } else { "0" }).to_string(),
            (FieldKind::Signal, FieldValue::Bool(v)) => (if *v { "on" } else { "off" }).to_string(),
            (_, v) => v.to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("not a boolean: {other:?}")),
    }
}

fn parse_signal(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("not a signal state: {other:?}")),
    }
}

/// Which command parameter a derived path segment stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    /// The index parameter, e.g. the `1` in `!atf1=...`
    Index,
    /// The setter parameter, the value after `=`
    Setter,
}

impl ParamRole {
    /// Lower case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Setter => "setter",
        }
    }
}

/// One segment of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A fixed name
    Name(String),
    /// Replaced by a request parameter once the request is known
    DerivedFromParam(ParamRole),
}

/// Key of an answer field in the status record
///
/// Paths such as `atf.<index>` stay symbolic in the contract and are
/// resolved with the arguments of the request that produced the answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Single name path
    pub fn name(name: &str) -> Self {
        Self(vec![PathSegment::Name(name.to_string())])
    }

    /// `name.<param>` path
    pub fn derived(name: &str, role: ParamRole) -> Self {
        Self(vec![
            PathSegment::Name(name.to_string()),
            PathSegment::DerivedFromParam(role),
        ])
    }

    /// Path segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Whether any segment depends on a request parameter
    pub fn is_derived(&self) -> bool {
        self.0
            .iter()
            .any(|s| matches!(s, PathSegment::DerivedFromParam(_)))
    }

    /// Regex group name: `x_foo`, `x_foo__x_bar`, `d_index`
    pub fn alias(&self) -> String {
        self.0
            .iter()
            .map(|segment| match segment {
                PathSegment::Name(name) => format!("x_{name}"),
                PathSegment::DerivedFromParam(role) => format!("d_{}", role.as_str()),
            })
            .collect::<Vec<_>>()
            .join("__")
    }

    /// Dotted key with derived segments substituted
    ///
    /// Returns `None` when a derived segment has no matching parameter.
    pub fn resolve(&self, index: Option<&FieldValue>, setter: Option<&FieldValue>) -> Option<String> {
        let parts = self
            .0
            .iter()
            .map(|segment| match segment {
                PathSegment::Name(name) => Some(name.clone()),
                PathSegment::DerivedFromParam(ParamRole::Index) => index.map(|v| v.to_string()),
                PathSegment::DerivedFromParam(ParamRole::Setter) => setter.map(|v| v.to_string()),
            })
            .collect::<Option<Vec<String>>>()?;
        Some(parts.join("."))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|segment| match segment {
                PathSegment::Name(name) => name.clone(),
                PathSegment::DerivedFromParam(role) => format!("<{}>", role.as_str()),
            })
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// One field of an answer
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerField {
    /// Where the value is stored.
    pub path: FieldPath,
    /// How the value is captured and converted.
    pub field_type: FieldType,
    /// Literal text before the value.
    pub prefix: String,
    /// Literal text after the value (and its unit).
    pub postfix: String,
}

impl AnswerField {
    /// Field stored under a plain name
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self::at(FieldPath::name(name), field_type)
    }

    /// Field stored under an arbitrary path
    pub fn at(path: FieldPath, field_type: FieldType) -> Self {
        Self {
            path,
            field_type,
            prefix: String::new(),
            postfix: String::new(),
        }
    }

    /// Literal text before the value
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Literal text after the value
    pub fn with_postfix(mut self, postfix: &str) -> Self {
        self.postfix = postfix.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scaling() {
        let frequency = FieldType::float().with_unit(SiUnit::Hertz);
        assert_eq!(
            frequency.convert("1000", Some("k")).unwrap(),
            FieldValue::Float(1_000_000.0)
        );
        assert_eq!(frequency.convert("5", None).unwrap(), FieldValue::Float(5.0));

        let ms = FieldType::int().with_prefix(SiPrefix::Milli);
        assert_eq!(ms.convert("1500", None).unwrap(), FieldValue::Int(2));
    }

    #[test]
    fn test_allowed_values_and_range() {
        let index = FieldType::int().allowed([1, 2, 3]);
        assert!(index.parse_argument("2").is_ok());
        assert!(index.parse_argument("4").is_err());

        let gain = FieldType::int().range(0.0, 150.0);
        assert!(gain.parse_argument("150").is_ok());
        assert!(gain.parse_argument("151").is_err());
        assert!(gain.parse_argument("high").is_err());
    }

    #[test]
    fn test_signal_and_enum() {
        assert_eq!(
            FieldType::signal().convert("ON", None).unwrap(),
            FieldValue::Bool(true)
        );
        let relay = FieldType::enumeration(&["kHz", "MHz"]);
        assert!(relay.convert("MHz", None).is_ok());
        assert!(relay.convert("GHz", None).is_err());
        assert_eq!(
            FieldType::signal().format_argument(&FieldValue::Bool(false)),
            "off"
        );
    }

    #[test]
    fn test_path_alias_and_resolution() {
        let path = FieldPath::derived("atf", ParamRole::Index);
        assert_eq!(path.alias(), "x_atf__d_index");
        assert!(path.is_derived());
        assert_eq!(
            path.resolve(Some(&FieldValue::Int(2)), None).as_deref(),
            Some("atf.2")
        );
        assert_eq!(path.resolve(None, None), None);
        assert_eq!(FieldPath::name("frequency").alias(), "x_frequency");
    }
}
