//! Event type definitions for the event bus.
//!
//! Events are organised by category and carry a fine grained [`EventKind`]
//! tag used for subscriptions. Events are cloneable and serializable for
//! logging.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{ProcedureKind, PropertyChange, ProtocolKind, Status};

/// Root event enum for all control stack events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SonicEvent {
    /// Transport lifecycle
    Connection(ConnectionEvent),
    /// Device state
    Device(DeviceEvent),
    /// Procedure lifecycle
    Procedure(ProcedureEvent),
    /// Script sequencer progress
    Script(ScriptEvent),
}

impl SonicEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            SonicEvent::Connection(_) => EventCategory::Connection,
            SonicEvent::Device(_) => EventCategory::Device,
            SonicEvent::Procedure(_) => EventCategory::Procedure,
            SonicEvent::Script(_) => EventCategory::Script,
        }
    }

    /// Get the type tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            SonicEvent::Connection(ConnectionEvent::Opened { .. }) => EventKind::ConnectionOpened,
            SonicEvent::Connection(ConnectionEvent::Disconnected { .. }) => EventKind::Disconnected,
            SonicEvent::Device(DeviceEvent::StatusUpdated(_)) => EventKind::StatusUpdated,
            SonicEvent::Device(DeviceEvent::PropertyChanged(_)) => EventKind::PropertyChanged,
            SonicEvent::Device(DeviceEvent::Update(_)) => EventKind::Update,
            SonicEvent::Procedure(ProcedureEvent::Running { .. }) => EventKind::ProcedureRunning,
            SonicEvent::Procedure(ProcedureEvent::Stopped { .. }) => EventKind::ProcedureStopped,
            SonicEvent::Script(ScriptEvent::Started { .. }) => EventKind::ScriptStarted,
            SonicEvent::Script(ScriptEvent::LineAdvanced { .. }) => EventKind::LineAdvanced,
            SonicEvent::Script(ScriptEvent::Finished { .. }) => EventKind::ScriptFinished,
        }
    }

    /// Property name for property-change events
    pub fn property(&self) -> Option<&str> {
        match self {
            SonicEvent::Device(DeviceEvent::PropertyChanged(change)) => Some(&change.name),
            _ => None,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            SonicEvent::Connection(e) => e.description(),
            SonicEvent::Device(e) => e.description(),
            SonicEvent::Procedure(e) => e.description(),
            SonicEvent::Script(e) => e.description(),
        }
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Connection events.
    Connection,
    /// Device state events.
    Device,
    /// Procedure lifecycle events.
    Procedure,
    /// Script sequencer events.
    Script,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Device => write!(f, "Device"),
            EventCategory::Procedure => write!(f, "Procedure"),
            EventCategory::Script => write!(f, "Script"),
        }
    }
}

/// Type tag of an event, the key subscribers register under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `connection-opened`
    ConnectionOpened,
    /// `disconnected`
    Disconnected,
    /// `status-updated`
    StatusUpdated,
    /// `property-changed`
    PropertyChanged,
    /// `update`
    Update,
    /// `procedure-running`
    ProcedureRunning,
    /// `procedure-stopped`
    ProcedureStopped,
    /// `script-started`
    ScriptStarted,
    /// `line-advanced`
    LineAdvanced,
    /// `script-finished`
    ScriptFinished,
}

impl EventKind {
    /// String tag
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionOpened => "connection-opened",
            EventKind::Disconnected => "disconnected",
            EventKind::StatusUpdated => "status-updated",
            EventKind::PropertyChanged => "property-changed",
            EventKind::Update => "update",
            EventKind::ProcedureRunning => "procedure-running",
            EventKind::ProcedureStopped => "procedure-stopped",
            EventKind::ScriptStarted => "script-started",
            EventKind::LineAdvanced => "line-advanced",
            EventKind::ScriptFinished => "script-finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Closed by the host
    UserRequested,
    /// EOF or I/O failure
    ConnectionLost(String),
    /// The device stopped answering
    Timeout,
}

/// Connection-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Transport opened.
    Opened {
        /// Serial port or executable the connection runs over.
        port: String,
        /// Protocol spoken on the connection.
        protocol: ProtocolKind,
    },
    /// Transport closed; emitted exactly once per connection.
    Disconnected {
        /// Serial port or executable that was disconnected.
        port: String,
        /// Reason for the disconnection.
        reason: DisconnectReason,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Opened { port, protocol } => {
                format!("Opened {} ({})", port, protocol)
            }
            ConnectionEvent::Disconnected { port, reason } => {
                format!("Disconnected from {}: {:?}", port, reason)
            }
        }
    }
}

/// Device state events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// An answer was merged into the status.
    StatusUpdated(Status),
    /// A single status property changed.
    PropertyChanged(PropertyChange),
    /// The updater polled a fresh status.
    Update(Status),
}

impl DeviceEvent {
    fn description(&self) -> String {
        match self {
            DeviceEvent::StatusUpdated(_) => "Status updated".to_string(),
            DeviceEvent::PropertyChanged(change) => format!(
                "{} changed from {} to {}",
                change.name,
                change
                    .old
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                change.new
            ),
            DeviceEvent::Update(status) => format!(
                "Update: {} Hz, {}%, signal {}",
                status.frequency,
                status.gain,
                if status.signal { "on" } else { "off" }
            ),
        }
    }
}

/// Procedure lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcedureEvent {
    /// A procedure started.
    Running {
        /// Which procedure.
        procedure: ProcedureKind,
    },
    /// The procedure reached a terminal state.
    Stopped {
        /// Which procedure.
        procedure: ProcedureKind,
        /// Error message if it failed.
        error: Option<String>,
    },
}

impl ProcedureEvent {
    fn description(&self) -> String {
        match self {
            ProcedureEvent::Running { procedure } => format!("{} running", procedure),
            ProcedureEvent::Stopped {
                procedure,
                error: None,
            } => format!("{} stopped", procedure),
            ProcedureEvent::Stopped {
                procedure,
                error: Some(error),
            } => format!("{} stopped: {}", procedure, error),
        }
    }
}

/// Script sequencer events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScriptEvent {
    /// Execution began.
    Started {
        /// Number of instructions in the script.
        instructions: usize,
    },
    /// The program counter moved to a new instruction.
    LineAdvanced {
        /// One-based source line.
        line: usize,
        /// Human readable description of the instruction.
        task: String,
    },
    /// Execution ended.
    Finished {
        /// Error message if the script failed.
        error: Option<String>,
    },
}

impl ScriptEvent {
    fn description(&self) -> String {
        match self {
            ScriptEvent::Started { instructions } => {
                format!("Script started ({} instructions)", instructions)
            }
            ScriptEvent::LineAdvanced { line, task } => format!("Line {}: {}", line, task),
            ScriptEvent::Finished { error: None } => "Script finished".to_string(),
            ScriptEvent::Finished { error: Some(error) } => {
                format!("Script failed: {}", error)
            }
        }
    }
}
