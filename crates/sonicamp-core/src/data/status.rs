//! Last known device state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::value::FieldValue;

/// A single property that changed while ingesting an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Property name, e.g. `frequency` or `atf.1`.
    pub name: String,
    /// Value before the change, `None` if it was never set.
    pub old: Option<FieldValue>,
    /// Value after the change.
    pub new: FieldValue,
    /// Component that caused the change.
    pub sender: String,
}

/// Flat record of the last known device state
///
/// Updated by ingesting the field dictionaries of validated answers. Fields
/// the record does not model by name (transducer tables, procedure
/// parameters, ...) are kept in `extra`, keyed by their dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Status {
    /// Relay mode (`kHz` or `MHz`) on devices that have one.
    pub relay_mode: Option<String>,
    /// Output frequency in Hz.
    pub frequency: u32,
    /// Gain in percent.
    pub gain: u32,
    /// Whether the output signal is on.
    pub signal: bool,
    /// Wipe mode flag.
    pub wipe_mode: bool,
    /// Index of the running procedure (protocol index).
    pub procedure: i64,
    /// Temperature in degree Celsius.
    pub temperature: f64,
    /// RMS voltage.
    pub urms: f64,
    /// RMS current.
    pub irms: f64,
    /// Phase.
    pub phase: f64,
    /// Set by the device when a remote procedure completed.
    pub remote_proc_finished: bool,
    /// Error code reported by the status line, 0 when healthy.
    pub error: i64,
    /// Remaining fields by dotted path.
    pub extra: BTreeMap<String, FieldValue>,
    /// When the last ingested answer arrived.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Status {
    /// Names of the properties modelled as named fields
    pub const PROPERTIES: [&'static str; 12] = [
        "relay_mode",
        "frequency",
        "gain",
        "signal",
        "wipe_mode",
        "procedure",
        "temperature",
        "urms",
        "irms",
        "phase",
        "remote_proc_finished",
        "error",
    ];

    /// Read a property by name
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        match name {
            "relay_mode" => self.relay_mode.clone().map(FieldValue::Str),
            "frequency" => Some(FieldValue::from(self.frequency)),
            "gain" => Some(FieldValue::from(self.gain)),
            "signal" => Some(FieldValue::Bool(self.signal)),
            "wipe_mode" => Some(FieldValue::Bool(self.wipe_mode)),
            "procedure" => Some(FieldValue::Int(self.procedure)),
            "temperature" => Some(FieldValue::Float(self.temperature)),
            "urms" => Some(FieldValue::Float(self.urms)),
            "irms" => Some(FieldValue::Float(self.irms)),
            "phase" => Some(FieldValue::Float(self.phase)),
            "remote_proc_finished" => Some(FieldValue::Bool(self.remote_proc_finished)),
            "error" => Some(FieldValue::Int(self.error)),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Write a property by name, returning the change if the value differs
    ///
    /// Values whose type does not fit a named property are rejected with a
    /// warning and leave the status untouched.
    pub fn set(&mut self, name: &str, value: FieldValue, sender: &str) -> Option<PropertyChange> {
        let old = self.get(name);
        let applied = match name {
            "relay_mode" => value.as_str().map(|v| self.relay_mode = Some(v.to_string())),
            "frequency" => value.as_u32().map(|v| self.frequency = v),
            "gain" => value.as_u32().map(|v| self.gain = v),
            "signal" => value.as_bool().map(|v| self.signal = v),
            "wipe_mode" => value.as_bool().map(|v| self.wipe_mode = v),
            "procedure" => value.as_i64().map(|v| self.procedure = v),
            "temperature" => value.as_f64().map(|v| self.temperature = v),
            "urms" => value.as_f64().map(|v| self.urms = v),
            "irms" => value.as_f64().map(|v| self.irms = v),
            "phase" => value.as_f64().map(|v| self.phase = v),
            "remote_proc_finished" => value.as_bool().map(|v| self.remote_proc_finished = v),
            "error" => value.as_i64().map(|v| self.error = v),
            other => {
                self.extra.insert(other.to_string(), value.clone());
                Some(())
            }
        };

        if applied.is_none() {
            tracing::warn!(property = name, value = %value, "Ignoring value of unexpected type");
            return None;
        }

        let new = self.get(name)?;
        if old.as_ref() == Some(&new) {
            return None;
        }
        Some(PropertyChange {
            name: name.to_string(),
            old,
            new,
            sender: sender.to_string(),
        })
    }

    /// Merge an answer's field dictionary into the status
    ///
    /// Returns every property whose value changed, in dictionary order.
    pub fn ingest<I>(&mut self, fields: I, sender: &str) -> Vec<PropertyChange>
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let changes = fields
            .into_iter()
            .filter_map(|(name, value)| self.set(&name, value, sender))
            .collect();
        self.timestamp = Some(Utc::now());
        changes
    }
}
