//! # SonicAmp
//!
//! Host-side control stack for SonicAmp ultrasonic amplifiers:
//! - Framed (`<dst#src#id#len#body>`) and legacy line protocols over serial
//!   ports or child processes
//! - Versioned command contracts with answer validation
//! - Device handshake, status tracking and a status updater
//! - Local and firmware-side procedures (ramp, scan, tune, wipe, auto,
//!   spectrum) behind one controller
//! - A line-oriented script language with nested loops
//!
//! ## Architecture
//!
//! 1. **sonicamp-core** - Errors, units, status types, event bus
//! 2. **sonicamp-communication** - Transports, framing, communicators, contracts, device
//! 3. **sonicamp-procedures** - Procedures, controller, updater
//! 4. **sonicamp-script** - Script parser and sequencer
//! 5. **sonicamp-settings** - Configuration and transducer library
//! 6. **sonicamp** - Logging, session wiring and the command line tool

pub mod logging;
pub mod session;

pub use logging::init_logging;
pub use session::Session;

pub use sonicamp_communication::{
    list_ports, ConnectionFactory, ConnectionParams, DeviceBuilder, Info,
    LoopbackConnectionFactory, SerialPortInfo, SonicAmp,
};
pub use sonicamp_core::{Error, EventBus, EventKind, Result, SonicEvent, Status};
pub use sonicamp_procedures::{ProcedureController, Updater};
pub use sonicamp_script::{Script, Sequencer};
pub use sonicamp_settings::{Config, LoggingSettings, TransducerConfig, TransducerLibrary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
