//! # SonicAmp Core
//!
//! Core types shared by every layer of the SonicAmp control stack:
//! the error taxonomy, the device data model (status, versions, field
//! values), SI and time units, and the event bus used to decouple the
//! communicators, the device, the procedures and the script sequencer.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod units;

pub use data::{
    DeviceType, FieldValue, ProcedureKind, PropertyChange, ProtocolKind, Status, Version,
};

pub use error::{
    ConnectionError, Error, ProcedureError, ProtocolError, Result, ScriptError, SharedError,
};

pub use event_bus::{
    ConnectionEvent, DeviceEvent, DisconnectReason, EventBus, EventBusConfig, EventCategory,
    EventKind, ProcedureEvent, ScriptEvent, SonicEvent, SubscriptionId,
};

pub use units::{HoldTime, SiPrefix, SiUnit, TimeUnit};
