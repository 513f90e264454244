//! Procedure argument records and their schemas
//!
//! Every procedure takes a typed record. The matching [`ArgSchema`] lists the
//! fields with their kind and bounds so front ends and scripts can enumerate
//! them; records decoded from JSON are checked against it.

use serde::{Deserialize, Deserializer, Serialize};
use sonicamp_core::{HoldTime, ProcedureError, ProcedureKind, TimeUnit};

const MAX_FREQUENCY: f64 = 10_000_000.0;
const MAX_MILLIS: f64 = u32::MAX as f64;
const MAX_GAIN: f64 = 150.0;

/// Kind of value an argument holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// Frequency in Hz.
    Frequency,
    /// Plain integer, e.g. a gain in percent.
    Integer,
    /// Duration, written as `10ms`, `2s` or a number of milliseconds.
    Time,
}

/// One field of an argument schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgField {
    /// Field name as used in JSON.
    pub name: String,
    /// Value kind.
    pub kind: ArgKind,
    /// Unit the bounds are expressed in.
    pub unit: Option<String>,
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
    /// Whether the field may be omitted.
    pub optional: bool,
    /// Short help text.
    pub description: String,
}

impl ArgField {
    fn new(name: &str, kind: ArgKind, min: f64, max: f64, description: &str) -> Self {
        let unit = match kind {
            ArgKind::Frequency => Some("Hz".to_string()),
            ArgKind::Time => Some("ms".to_string()),
            ArgKind::Integer => None,
        };
        Self {
            name: name.to_string(),
            kind,
            unit,
            min,
            max,
            optional: false,
            description: description.to_string(),
        }
    }

    fn frequency(name: &str, min: f64, description: &str) -> Self {
        Self::new(name, ArgKind::Frequency, min, MAX_FREQUENCY, description)
    }

    fn time(name: &str, description: &str) -> Self {
        Self::new(name, ArgKind::Time, 0.0, MAX_MILLIS, description).optional()
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Fields a procedure accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    /// Procedure the schema belongs to.
    pub procedure: ProcedureKind,
    /// Accepted fields.
    pub fields: Vec<ArgField>,
}

impl ArgSchema {
    /// Schema of a procedure kind
    pub fn for_kind(kind: ProcedureKind) -> Self {
        let fields = match kind {
            ProcedureKind::Ramp => vec![
                ArgField::frequency("start", 0.0, "First frequency"),
                ArgField::frequency("stop", 0.0, "Last frequency, inclusive"),
                ArgField::frequency("step", 1.0, "Distance between frequencies"),
                ArgField::time("hold_on", "Time at each frequency"),
                ArgField::time("hold_off", "Pause with the signal off; 0 keeps the signal on"),
            ],
            ProcedureKind::Scan => vec![
                ArgField::frequency("center", 0.0, "Center of the scanned band"),
                ArgField::frequency("range", 0.0, "Half width of the band"),
                ArgField::frequency("step", 1.0, "Distance between frequencies"),
                ArgField::time("hold", "Time at each frequency"),
            ],
            ProcedureKind::Tune => vec![
                ArgField::frequency("step", 1.0, "Frequency step while tracking"),
                ArgField::time("time", "Duration of one tuning cycle"),
                ArgField::time("hold", "Time at each step"),
            ],
            ProcedureKind::Wipe => vec![
                ArgField::frequency("range", 0.0, "Half width of the wiped band"),
                ArgField::frequency("step", 1.0, "Distance between frequencies"),
                ArgField::time("hold_on", "Time with the signal on"),
                ArgField::time("hold_off", "Time with the signal off"),
                ArgField::time("pause", "Pause between wipe cycles"),
            ],
            ProcedureKind::Auto => Vec::new(),
            ProcedureKind::SpectrumMeasure => vec![
                ArgField::frequency("start", 0.0, "First frequency"),
                ArgField::frequency("stop", 0.0, "Last frequency, inclusive"),
                ArgField::frequency("step", 1.0, "Distance between frequencies"),
                ArgField::time("hold", "Settle time before each measurement"),
                ArgField::new("gain", ArgKind::Integer, 0.0, MAX_GAIN, "Gain during the sweep")
                    .optional(),
            ],
        };
        Self {
            procedure: kind,
            fields,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&ArgField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a value against the bounds of the named field
    pub fn check(&self, name: &str, value: f64) -> Result<(), ProcedureError> {
        let field = self.field(name).ok_or_else(|| self.invalid(name, "unknown field"))?;
        if !value.is_finite() || value < field.min || value > field.max {
            return Err(self.invalid(
                name,
                &format!("{} is outside {}..={}", value, field.min, field.max),
            ));
        }
        Ok(())
    }

    fn check_time(&self, name: &str, value: &HoldTime) -> Result<(), ProcedureError> {
        self.check(name, value.as_millis())
    }

    fn invalid(&self, field: &str, reason: &str) -> ProcedureError {
        ProcedureError::InvalidArgs {
            procedure: self.procedure.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Inclusive list of frequencies from `start` towards `stop`
///
/// Runs downwards when `stop < start`. Values never pass `stop`.
pub fn sweep_values(start: u32, stop: u32, step: u32) -> Vec<u32> {
    let step = step.max(1);
    let mut values = Vec::new();
    let mut frequency = start;
    loop {
        values.push(frequency);
        let next = if start <= stop {
            frequency.checked_add(step).filter(|f| *f <= stop)
        } else {
            frequency.checked_sub(step).filter(|f| *f >= stop)
        };
        match next {
            Some(next) => frequency = next,
            None => break,
        }
    }
    values
}

/// Accepts `10`, `"10ms"`, `"2s"` or `{"value": 10, "unit": "ms"}`
fn hold_time<'de, D>(deserializer: D) -> Result<HoldTime, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(f64),
        Text(String),
        Full { value: f64, unit: TimeUnit },
    }

    match Repr::deserialize(deserializer)? {
        Repr::Millis(ms) => Ok(HoldTime::ms(ms)),
        Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        Repr::Full { value, unit } => Ok(HoldTime::new(value, unit)),
    }
}

/// Frequency ramp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampArgs {
    /// First frequency in Hz.
    pub start: u32,
    /// Last frequency in Hz, inclusive.
    pub stop: u32,
    /// Distance between frequencies in Hz.
    pub step: u32,
    /// Time at each frequency.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold_on: HoldTime,
    /// Pause with the signal off after each frequency; zero keeps the
    /// signal untouched.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold_off: HoldTime,
}

impl RampArgs {
    /// Ramp over `[center - half_range, center + half_range]`
    pub fn centered(
        center: u32,
        half_range: u32,
        step: u32,
        hold_on: HoldTime,
        hold_off: HoldTime,
    ) -> Self {
        Self {
            start: center.saturating_sub(half_range),
            stop: center.saturating_add(half_range),
            step,
            hold_on,
            hold_off,
        }
    }

    /// Frequencies visited, in order
    pub fn values(&self) -> Vec<u32> {
        sweep_values(self.start, self.stop, self.step)
    }

    fn validate(&self, schema: &ArgSchema) -> Result<(), ProcedureError> {
        schema.check("start", f64::from(self.start))?;
        schema.check("stop", f64::from(self.stop))?;
        schema.check("step", f64::from(self.step))?;
        schema.check_time("hold_on", &self.hold_on)?;
        schema.check_time("hold_off", &self.hold_off)
    }
}

/// Frequency scan around a center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanArgs {
    /// Center frequency in Hz.
    pub center: u32,
    /// Half width of the band in Hz.
    pub range: u32,
    /// Step in Hz.
    pub step: u32,
    /// Time at each frequency.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold: HoldTime,
}

/// Resonance tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneArgs {
    /// Step in Hz.
    pub step: u32,
    /// Duration of one tuning cycle.
    #[serde(default, deserialize_with = "hold_time")]
    pub time: HoldTime,
    /// Time at each step.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold: HoldTime,
}

/// Wipe cycle around the current frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeArgs {
    /// Half width of the band in Hz.
    pub range: u32,
    /// Step in Hz.
    pub step: u32,
    /// Time with the signal on.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold_on: HoldTime,
    /// Time with the signal off.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold_off: HoldTime,
    /// Pause between cycles.
    #[serde(default, deserialize_with = "hold_time")]
    pub pause: HoldTime,
}

/// Automatic tuning; the device uses its stored scan and tune parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoArgs {}

/// Local sweep that records the status at each frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumArgs {
    /// First frequency in Hz.
    pub start: u32,
    /// Last frequency in Hz, inclusive.
    pub stop: u32,
    /// Step in Hz.
    pub step: u32,
    /// Settle time before each measurement.
    #[serde(default, deserialize_with = "hold_time")]
    pub hold: HoldTime,
    /// Gain set before the sweep.
    #[serde(default)]
    pub gain: Option<u32>,
}

impl SpectrumArgs {
    /// Frequencies visited, in order
    pub fn values(&self) -> Vec<u32> {
        sweep_values(self.start, self.stop, self.step)
    }
}

/// Arguments of any procedure, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "procedure", content = "args", rename_all = "snake_case")]
pub enum ProcedureArgs {
    /// Frequency ramp.
    Ramp(RampArgs),
    /// Frequency scan.
    Scan(ScanArgs),
    /// Resonance tracking.
    Tune(TuneArgs),
    /// Wipe cycle.
    Wipe(WipeArgs),
    /// Automatic tuning.
    Auto(AutoArgs),
    /// Spectrum measurement.
    SpectrumMeasure(SpectrumArgs),
}

impl ProcedureArgs {
    /// Procedure these arguments are for
    pub fn kind(&self) -> ProcedureKind {
        match self {
            Self::Ramp(_) => ProcedureKind::Ramp,
            Self::Scan(_) => ProcedureKind::Scan,
            Self::Tune(_) => ProcedureKind::Tune,
            Self::Wipe(_) => ProcedureKind::Wipe,
            Self::Auto(_) => ProcedureKind::Auto,
            Self::SpectrumMeasure(_) => ProcedureKind::SpectrumMeasure,
        }
    }

    /// Check every field against the schema
    pub fn validate(&self) -> Result<(), ProcedureError> {
        let schema = ArgSchema::for_kind(self.kind());
        match self {
            Self::Ramp(args) => args.validate(&schema),
            Self::Scan(args) => {
                schema.check("center", f64::from(args.center))?;
                schema.check("range", f64::from(args.range))?;
                schema.check("step", f64::from(args.step))?;
                schema.check_time("hold", &args.hold)
            }
            Self::Tune(args) => {
                schema.check("step", f64::from(args.step))?;
                schema.check_time("time", &args.time)?;
                schema.check_time("hold", &args.hold)
            }
            Self::Wipe(args) => {
                schema.check("range", f64::from(args.range))?;
                schema.check("step", f64::from(args.step))?;
                schema.check_time("hold_on", &args.hold_on)?;
                schema.check_time("hold_off", &args.hold_off)?;
                schema.check_time("pause", &args.pause)
            }
            Self::Auto(_) => Ok(()),
            Self::SpectrumMeasure(args) => {
                schema.check("start", f64::from(args.start))?;
                schema.check("stop", f64::from(args.stop))?;
                schema.check("step", f64::from(args.step))?;
                schema.check_time("hold", &args.hold)?;
                match args.gain {
                    Some(gain) => schema.check("gain", f64::from(gain)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Decode the arguments of `kind` from a JSON object and validate them
    pub fn from_json(kind: ProcedureKind, value: serde_json::Value) -> Result<Self, ProcedureError> {
        let decode_error = |e: serde_json::Error| ProcedureError::InvalidArgs {
            procedure: kind.to_string(),
            field: String::new(),
            reason: e.to_string(),
        };
        let args = match kind {
            ProcedureKind::Ramp => Self::Ramp(serde_json::from_value(value).map_err(decode_error)?),
            ProcedureKind::Scan => Self::Scan(serde_json::from_value(value).map_err(decode_error)?),
            ProcedureKind::Tune => Self::Tune(serde_json::from_value(value).map_err(decode_error)?),
            ProcedureKind::Wipe => Self::Wipe(serde_json::from_value(value).map_err(decode_error)?),
            ProcedureKind::Auto => {
                let value = if value.is_null() {
                    serde_json::json!({})
                } else {
                    value
                };
                Self::Auto(serde_json::from_value(value).map_err(decode_error)?)
            }
            ProcedureKind::SpectrumMeasure => {
                Self::SpectrumMeasure(serde_json::from_value(value).map_err(decode_error)?)
            }
        };
        args.validate()?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sweep_values() {
        assert_eq!(
            sweep_values(998_000, 1_002_000, 1000),
            vec![998_000, 999_000, 1_000_000, 1_001_000, 1_002_000]
        );
        assert_eq!(sweep_values(10, 3, 4), vec![10, 6]);
        assert_eq!(sweep_values(5, 5, 1), vec![5]);
        assert_eq!(sweep_values(0, 7, 3), vec![0, 3, 6]);
    }

    #[test]
    fn test_centered_ramp() {
        let args = RampArgs::centered(1_000_000, 2000, 1000, HoldTime::ms(10.0), HoldTime::zero());
        assert_eq!(args.start, 998_000);
        assert_eq!(args.stop, 1_002_000);
        assert_eq!(args.values().len(), 5);
    }

    #[test]
    fn test_ramp_from_json() {
        let args = ProcedureArgs::from_json(
            ProcedureKind::Ramp,
            json!({"start": 100000, "stop": 120000, "step": 500, "hold_on": "1s", "hold_off": 20}),
        )
        .unwrap();
        match args {
            ProcedureArgs::Ramp(ramp) => {
                assert_eq!(ramp.hold_on, HoldTime::secs(1.0));
                assert_eq!(ramp.hold_off, HoldTime::ms(20.0));
            }
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let err = ProcedureArgs::from_json(
            ProcedureKind::Ramp,
            json!({"start": 100000, "stop": 120000, "step": 0}),
        )
        .unwrap_err();
        match err {
            ProcedureError::InvalidArgs { field, .. } => assert_eq!(field, "step"),
            other => panic!("unexpected error: {other}"),
        }

        let err = ProcedureArgs::from_json(
            ProcedureKind::SpectrumMeasure,
            json!({"start": 1, "stop": 2, "step": 1, "gain": 151}),
        )
        .unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidArgs { .. }));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = ProcedureArgs::from_json(ProcedureKind::Scan, json!({"center": 1})).unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidArgs { .. }));
    }

    #[test]
    fn test_auto_takes_no_arguments() {
        let args = ProcedureArgs::from_json(ProcedureKind::Auto, serde_json::Value::Null).unwrap();
        assert_eq!(args, ProcedureArgs::Auto(AutoArgs {}));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = ArgSchema::for_kind(ProcedureKind::Wipe);
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["range", "step", "hold_on", "hold_off", "pause"]);
        assert_eq!(schema.field("step").unwrap().unit.as_deref(), Some("Hz"));
        assert!(schema.field("pause").unwrap().optional);
    }
}
