//! # SonicAmp Communication
//!
//! Transports, framing and communicators for both wire protocols, the
//! command contract registry with its answer validator, and the device model
//! assembled by the handshake.

pub mod commands;
pub mod communication;
pub mod device;

pub use commands::{
    Answer, CommandArgs, CommandCode, CommandTable, Protocol, ProtocolBuilder,
};
pub use communication::{
    list_ports, ChannelEncoding, Communicator, ConnectionDriver, ConnectionFactory,
    ConnectionParams, LegacyCommunicator, LegacyCommunicatorConfig, LoopbackConnectionFactory,
    LoopbackMode, Package, PackageParser, SerialPortInfo, SonicCommunicator,
    SonicCommunicatorConfig, Transport, LEGACY_BAUD_RATE, SONIC_BAUD_RATE,
};
pub use device::{
    CommunicationMode, DeviceBuilder, DeviceBuilderConfig, Info, RelayMode, SonicAmp,
};
