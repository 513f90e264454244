//! # SonicAmp Procedures
//!
//! Long-running device work built from atomic commands: frequency ramps
//! (local and remote), scan, tune, wipe, auto and spectrum measurement.
//! The [`ProcedureController`] runs at most one procedure at a time and
//! publishes its lifecycle on the event bus; the [`Updater`] polls the
//! device status while no procedure needs the line.

pub mod args;
pub mod controller;
pub mod procedure;
pub mod ramp;
pub mod remote;
pub mod spectrum;
pub mod time_series;
pub mod updater;

pub use args::{
    ArgField, ArgKind, ArgSchema, AutoArgs, ProcedureArgs, RampArgs, ScanArgs, SpectrumArgs,
    TuneArgs, WipeArgs,
};
pub use controller::{ProcedureController, ProcedureHandle, RampBinding};
pub use procedure::{Procedure, ProcedureConfig, ProcedureContext};
pub use ramp::LocalRamp;
pub use remote::RemoteProcedure;
pub use spectrum::{SpectrumMeasure, SpectrumPoint};
pub use time_series::{Sample, TimeSeries, DEFAULT_CAPACITY};
pub use updater::Updater;
