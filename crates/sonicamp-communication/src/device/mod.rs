//! Device model
//!
//! [`DeviceBuilder`] negotiates the protocol and identifies the device;
//! [`SonicAmp`] is the result, exposing typed setters and getters over the
//! command table bound for that device.

pub mod builder;
pub mod capabilities;
pub mod info;
pub mod sonic_amp;

pub use builder::{DeviceBuilder, DeviceBuilderConfig};
pub use capabilities::{legacy_commands, parse_command_list};
pub use info::Info;
pub use sonic_amp::{CommunicationMode, RelayMode, SonicAmp};
