//! Handshake and protocol negotiation
//!
//! The builder first assumes legacy firmware: it reads the banner and sends
//! `?info` as a plain line. A framed reply, a timeout or an I/O failure means
//! the device speaks the framed protocol, so the probe connection is dropped
//! and the port reopened at the framed baud rate.

use sonicamp_core::{DeviceType, EventBus, ProtocolError, ProtocolKind, Result, Version};
use std::sync::Arc;

use crate::commands::{
    Command, CommandArgs, CommandCode, CommandTable, ProtocolBuilder, SONIC_MIN_VERSION,
};
use crate::communication::{
    Communicator, ConnectionFactory, LegacyCommunicator, LegacyCommunicatorConfig,
    PackageParser, SonicCommunicator, SonicCommunicatorConfig,
};

use super::capabilities::{legacy_commands, parse_command_list};
use super::info::Info;
use super::sonic_amp::SonicAmp;

/// Newest legacy firmware table, used when a legacy banner claims a framed
/// version
const NEWEST_LEGACY: Version = Version::new(0, 5, 0);

/// Handshake settings
#[derive(Debug, Clone)]
pub struct DeviceBuilderConfig {
    /// Settings of the legacy probe and legacy connections.
    pub legacy: LegacyCommunicatorConfig,
    /// Settings of framed connections.
    pub sonic: SonicCommunicatorConfig,
    /// Drop debug-only commands.
    pub release: bool,
}

impl Default for DeviceBuilderConfig {
    fn default() -> Self {
        Self {
            legacy: LegacyCommunicatorConfig::default(),
            sonic: SonicCommunicatorConfig::default(),
            release: true,
        }
    }
}

/// Connects to a device and identifies it
#[derive(Debug, Clone, Default)]
pub struct DeviceBuilder {
    config: DeviceBuilderConfig,
    protocols: ProtocolBuilder,
}

/// Outcome of the legacy probe
enum Probe {
    Legacy(LegacyCommunicator, String),
    Framed(&'static str),
}

impl DeviceBuilder {
    /// Builder with the given settings and the standard contracts
    pub fn new(config: DeviceBuilderConfig) -> Self {
        Self {
            config,
            protocols: ProtocolBuilder::default(),
        }
    }

    /// Use a different set of contracts
    pub fn with_protocols(mut self, protocols: ProtocolBuilder) -> Self {
        self.protocols = protocols;
        self
    }

    /// Open, negotiate the protocol and identify the device
    pub async fn connect(
        &self,
        factory: &dyn ConnectionFactory,
        bus: Arc<EventBus>,
    ) -> Result<SonicAmp> {
        tracing::info!(port = %factory.name(), "Connecting");
        match self.probe_legacy(factory, bus.clone()).await {
            Probe::Legacy(communicator, banner) => {
                Ok(self.finish_legacy(communicator, &banner, bus))
            }
            Probe::Framed(reason) => {
                tracing::info!(port = %factory.name(), reason, "Switching to the framed protocol");
                self.connect_sonic(factory, bus).await
            }
        }
    }

    async fn probe_legacy(&self, factory: &dyn ConnectionFactory, bus: Arc<EventBus>) -> Probe {
        let communicator =
            match LegacyCommunicator::open(factory, self.config.legacy.clone(), bus).await {
                Ok(communicator) => communicator,
                Err(e) => {
                    tracing::debug!(error = %e, "Legacy open failed");
                    return Probe::Framed("legacy open failed");
                }
            };

        let parser = PackageParser::new(self.config.legacy.encoding);
        let banner = communicator.handshake_banner();
        if banner.as_deref().is_some_and(|b| looks_framed(&parser, b)) {
            communicator.abandon();
            return Probe::Framed("framed banner");
        }

        match communicator.transceive("?info", true).await {
            Ok(reply) if looks_framed(&parser, &reply) => {
                communicator.abandon();
                Probe::Framed("framed reply to ?info")
            }
            Ok(reply) => {
                let banner = banner.unwrap_or(reply);
                Probe::Legacy(communicator, banner)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Legacy probe failed");
                communicator.abandon();
                Probe::Framed("no reply to ?info")
            }
        }
    }

    fn finish_legacy(
        &self,
        communicator: LegacyCommunicator,
        banner: &str,
        bus: Arc<EventBus>,
    ) -> SonicAmp {
        let mut info = Info::from_banner(banner, ProtocolKind::Legacy);
        let version = if info.firmware_version >= SONIC_MIN_VERSION {
            tracing::warn!(
                version = %info.firmware_version,
                "Legacy firmware reports a framed version; using the newest legacy table"
            );
            NEWEST_LEGACY
        } else {
            info.firmware_version
        };

        let table = self
            .protocols
            .build(info.device_type, version, self.config.release);
        let supported = legacy_commands(info.device_type, version);
        let table = table.restricted_to(&supported);
        info.supported_commands = table.codes().into_iter().collect();
        SonicAmp::new(Arc::new(communicator), info, table, bus)
    }

    async fn connect_sonic(
        &self,
        factory: &dyn ConnectionFactory,
        bus: Arc<EventBus>,
    ) -> Result<SonicAmp> {
        let communicator =
            SonicCommunicator::open(factory, self.config.sonic.clone(), bus.clone()).await?;

        // the device type is unknown until ?info answered
        let bootstrap = self
            .protocols
            .build(DeviceType::Unknown, SONIC_MIN_VERSION, self.config.release);
        let banner = match exchange(&communicator, &bootstrap, CommandCode::GetInfo).await {
            Ok(banner) => banner,
            Err(e) => {
                communicator.close().await;
                return Err(e);
            }
        };

        let mut info = Info::from_banner(&banner, ProtocolKind::Sonic);
        let version = info.firmware_version.max(SONIC_MIN_VERSION);
        let table = self
            .protocols
            .build(info.device_type, version, self.config.release);

        let supported =
            match exchange(&communicator, &table, CommandCode::ListAvailableCommands).await {
                Ok(list) => parse_command_list(&list),
                Err(e) if e.is_fatal() => {
                    communicator.close().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Command list unavailable; assuming all commands");
                    table.codes().into_iter().collect()
                }
            };
        let table = table.restricted_to(&supported);
        info.supported_commands = table.codes().into_iter().collect();
        Ok(SonicAmp::new(Arc::new(communicator), info, table, bus))
    }
}

fn looks_framed(parser: &PackageParser, text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .any(|line| line.starts_with('<') && parser.parse(line).is_ok())
}

/// Send a parameterless handshake command and return its answer body
async fn exchange(
    communicator: &SonicCommunicator,
    table: &CommandTable,
    code: CommandCode,
) -> Result<String> {
    let bound = table.get(code).ok_or_else(|| ProtocolError::CommandNotSupported {
        command: code.to_string(),
    })?;
    let mut command = Command::new(bound, CommandArgs::none())?;
    communicator.send_and_wait(&mut command).await?;
    let answer = command.into_answer().ok_or_else(|| ProtocolError::AnswerInvalid {
        command: code.to_string(),
        answer: String::new(),
    })?;
    if let Some(err) = answer.device_error() {
        return Err(err.into());
    }
    if !answer.valid {
        return Err(ProtocolError::AnswerInvalid {
            command: code.to_string(),
            answer: answer.raw_message,
        }
        .into());
    }
    Ok(answer.raw_message)
}
