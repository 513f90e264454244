//! The connected device
//!
//! [`SonicAmp`] owns the communicator of one connection together with the
//! identity learned in the handshake, the bound command table and the last
//! known [`Status`]. Every answer it receives is merged into the status and
//! announced on the event bus.

use parking_lot::RwLock;
use sonicamp_core::{
    ConnectionError, ConnectionEvent, DeviceEvent, Error, EventBus, EventKind, FieldValue,
    ProtocolError, Result, SonicEvent, Status, SubscriptionId,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commands::{
    parse_error_answer, Answer, BoundCommand, Command, CommandArgs, CommandCode, CommandTable,
};
use crate::communication::Communicator;

use super::info::Info;

const SENDER: &str = "device";

/// Output relay range of catch amplifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Kilohertz range
    Khz,
    /// Megahertz range
    Mhz,
}

impl RelayMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Khz => "kHz",
            Self::Mhz => "MHz",
        }
    }
}

/// Where the device takes its set points from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationMode {
    /// Commands over the serial line
    Serial,
    /// Analog inputs
    Analog,
}

impl CommunicationMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Analog => "analog",
        }
    }
}

/// A SonicAmp behind an open connection
pub struct SonicAmp {
    communicator: Arc<dyn Communicator>,
    commands: CommandTable,
    info: Info,
    status: RwLock<Status>,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    subscription: SubscriptionId,
}

impl SonicAmp {
    /// Wrap a communicator after a successful handshake
    ///
    /// The device watches the bus for the `Disconnected` event of its own
    /// port and refuses further requests once it has been seen.
    pub fn new(
        communicator: Arc<dyn Communicator>,
        info: Info,
        commands: CommandTable,
        bus: Arc<EventBus>,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(communicator.is_connected()));
        let subscription = {
            let connected = connected.clone();
            let port = communicator.port().to_string();
            bus.subscribe(EventKind::Disconnected, move |event| {
                if let SonicEvent::Connection(ConnectionEvent::Disconnected { port: lost, .. }) =
                    event
                {
                    if *lost == port {
                        connected.store(false, Ordering::SeqCst);
                    }
                }
            })
        };

        tracing::info!(
            port = %communicator.port(),
            device_type = %info.device_type,
            version = %info.firmware_version,
            protocol = %info.protocol,
            commands = commands.len(),
            "Device ready"
        );

        Self {
            communicator,
            commands,
            info,
            status: RwLock::new(Status::default()),
            bus,
            connected,
            subscription,
        }
    }

    /// Identity learned in the handshake
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Snapshot of the last known status
    pub fn status(&self) -> Status {
        self.status.read().clone()
    }

    /// Event bus the device publishes on
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The underlying communicator, e.g. for a raw monitor
    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }

    /// Commands bound for this device
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Whether the device accepts a command
    pub fn has_command(&self, code: CommandCode) -> bool {
        self.commands.contains(code)
    }

    /// Whether the connection is still usable
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.communicator.is_connected()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectionError::ConnectionLost {
                reason: format!("{} is disconnected", self.communicator.port()),
            }
            .into())
        }
    }

    fn bound(&self, code: CommandCode) -> Result<Arc<BoundCommand>> {
        self.commands.get(code).ok_or_else(|| {
            ProtocolError::CommandNotSupported {
                command: code.to_string(),
            }
            .into()
        })
    }

    /// Send a command and merge its answer into the status
    ///
    /// Fails with `CommandNotSupported` before any I/O if the device lacks the
    /// command. Error answers surface as `DeviceError`; answers that do not
    /// match the contract are returned with `valid == false`.
    pub async fn execute(&self, code: CommandCode, args: CommandArgs) -> Result<Answer> {
        let bound = self.bound(code)?;
        self.ensure_connected()?;
        let command = Command::new(bound, args)?;
        self.send(command).await
    }

    /// Send a command and return the answer body
    pub async fn execute_command(&self, code: CommandCode, args: CommandArgs) -> Result<String> {
        Ok(self.execute(code, args).await?.raw_message)
    }

    /// Send a command written as text
    ///
    /// Text that matches a bound command is validated and sent like
    /// [`execute_command`](Self::execute_command). Anything else is passed to
    /// the device verbatim.
    pub async fn execute_raw(&self, text: &str) -> Result<String> {
        match self.commands.match_text(text) {
            Ok((bound, args)) => {
                self.ensure_connected()?;
                let command = Command::new(bound, args)?;
                Ok(self.send(command).await?.raw_message)
            }
            Err(ProtocolError::UnknownCommand { .. }) => {
                self.ensure_connected()?;
                tracing::debug!(text, "Passing unknown command through");
                let body = self
                    .communicator
                    .transceive(text.trim(), false)
                    .await
                    .map_err(|e| self.on_error(e))?;
                if let Some(err) = parse_error_answer(&body) {
                    return Err(err.into());
                }
                Ok(body)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&self, mut command: Command) -> Result<Answer> {
        if let Err(e) = self.communicator.send_and_wait(&mut command).await {
            let e = self.on_error(e);
            if e.is_fatal() {
                self.communicator.close().await;
            }
            return Err(e);
        }

        let answer = command
            .into_answer()
            .ok_or_else(|| Error::other("communicator returned without an answer"))?;
        if let Some(err) = answer.device_error() {
            tracing::warn!(answer = %answer.raw_message, "Device reported an error");
            return Err(err.into());
        }
        if answer.valid {
            self.apply(answer.field_value_dict.clone());
        }
        Ok(answer)
    }

    fn on_error(&self, e: Error) -> Error {
        if e.is_fatal() {
            tracing::error!(port = %self.communicator.port(), error = %e, "Device lost");
            self.connected.store(false, Ordering::SeqCst);
        }
        e
    }

    /// Merge fields into the status and announce the changes
    fn apply<I>(&self, fields: I)
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let (changes, snapshot) = {
            let mut status = self.status.write();
            let changes = status.ingest(fields, SENDER);
            (changes, status.clone())
        };
        for change in changes {
            self.bus
                .emit(SonicEvent::Device(DeviceEvent::PropertyChanged(change)));
        }
        self.bus
            .emit(SonicEvent::Device(DeviceEvent::StatusUpdated(snapshot)));
    }

    /// Close the connection
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.communicator.close().await;
    }

    /// Set the output frequency in Hz
    pub async fn set_frequency(&self, frequency: u32) -> Result<Answer> {
        self.execute(CommandCode::SetFrequency, CommandArgs::value(frequency))
            .await
    }

    /// Set the gain in percent
    pub async fn set_gain(&self, gain: u32) -> Result<Answer> {
        self.execute(CommandCode::SetGain, CommandArgs::value(gain))
            .await
    }

    /// Set the switching frequency of descale amplifiers in Hz
    pub async fn set_switching_frequency(&self, frequency: u32) -> Result<Answer> {
        self.execute(
            CommandCode::SetSwitchingFrequency,
            CommandArgs::value(frequency),
        )
        .await
    }

    /// Switch the output signal on
    pub async fn set_signal_on(&self) -> Result<Answer> {
        self.execute(CommandCode::SetOn, CommandArgs::none()).await
    }

    /// Switch the output signal off
    pub async fn set_signal_off(&self) -> Result<Answer> {
        self.execute(CommandCode::SetOff, CommandArgs::none()).await
    }

    /// Let the device tune itself
    pub async fn set_signal_auto(&self) -> Result<Answer> {
        self.execute(CommandCode::SetAuto, CommandArgs::none()).await
    }

    /// Switch the relay range
    pub async fn set_relay_mode(&self, mode: RelayMode) -> Result<Answer> {
        let code = match mode {
            RelayMode::Khz => CommandCode::SetKhzMode,
            RelayMode::Mhz => CommandCode::SetMhzMode,
        };
        let answer = self.execute(code, CommandArgs::none()).await?;
        self.apply([("relay_mode".to_string(), FieldValue::from(mode.as_str()))]);
        Ok(answer)
    }

    /// Choose between serial and analog control
    pub async fn set_communication_mode(&self, mode: CommunicationMode) -> Result<Answer> {
        let code = match mode {
            CommunicationMode::Serial => CommandCode::SetSerialMode,
            CommunicationMode::Analog => CommandCode::SetAnalogMode,
        };
        let answer = self.execute(code, CommandArgs::none()).await?;
        self.apply([(
            "communication_mode".to_string(),
            FieldValue::from(mode.as_str()),
        )]);
        Ok(answer)
    }

    /// Write a transducer frequency entry
    pub async fn set_atf(&self, index: u32, frequency: u32) -> Result<Answer> {
        self.execute(CommandCode::SetAtf, CommandArgs::indexed(index, frequency))
            .await
    }

    /// Write a transducer coefficient entry
    pub async fn set_atk(&self, index: u32, coefficient: f64) -> Result<Answer> {
        self.execute(CommandCode::SetAtk, CommandArgs::indexed(index, coefficient))
            .await
    }

    /// Write a transducer temperature entry
    pub async fn set_att(&self, index: u32, temperature: f64) -> Result<Answer> {
        self.execute(CommandCode::SetAtt, CommandArgs::indexed(index, temperature))
            .await
    }

    /// Write a transducer on-time entry in ms
    pub async fn set_aton(&self, index: u32, millis: u32) -> Result<Answer> {
        self.execute(CommandCode::SetAton, CommandArgs::indexed(index, millis))
            .await
    }

    /// Read a transducer frequency entry
    pub async fn get_atf(&self, index: u32) -> Result<Answer> {
        self.execute(CommandCode::GetAtf, CommandArgs::index(index))
            .await
    }

    /// Read a transducer coefficient entry
    pub async fn get_atk(&self, index: u32) -> Result<Answer> {
        self.execute(CommandCode::GetAtk, CommandArgs::index(index))
            .await
    }

    /// Read a transducer temperature entry
    pub async fn get_att(&self, index: u32) -> Result<Answer> {
        self.execute(CommandCode::GetAtt, CommandArgs::index(index))
            .await
    }

    /// Read a transducer on-time entry
    pub async fn get_aton(&self, index: u32) -> Result<Answer> {
        self.execute(CommandCode::GetAton, CommandArgs::index(index))
            .await
    }

    /// Poll the status line and return the merged status
    pub async fn get_status(&self) -> Result<Status> {
        let answer = self.execute(CommandCode::Dash, CommandArgs::none()).await?;
        if !answer.valid {
            return Err(ProtocolError::AnswerInvalid {
                command: CommandCode::Dash.to_string(),
                answer: answer.raw_message,
            }
            .into());
        }
        Ok(self.status())
    }

    /// Read the sensors
    pub async fn get_sens(&self) -> Result<Answer> {
        self.execute(CommandCode::GetSensors, CommandArgs::none())
            .await
    }

    /// Read the output frequency
    pub async fn get_frequency(&self) -> Result<Answer> {
        self.execute(CommandCode::GetFrequency, CommandArgs::none())
            .await
    }

    /// Read the gain
    pub async fn get_gain(&self) -> Result<Answer> {
        self.execute(CommandCode::GetGain, CommandArgs::none())
            .await
    }

    /// Read the temperature
    pub async fn get_temp(&self) -> Result<Answer> {
        self.execute(CommandCode::GetTemperature, CommandArgs::none())
            .await
    }

    /// Human readable overview
    pub async fn get_overview(&self) -> Result<String> {
        self.execute_command(CommandCode::GetOverview, CommandArgs::none())
            .await
    }

    /// Device type as reported by the firmware
    pub async fn get_type(&self) -> Result<String> {
        self.execute_command(CommandCode::GetType, CommandArgs::none())
            .await
    }

    /// Firmware banner
    pub async fn get_info(&self) -> Result<String> {
        self.execute_command(CommandCode::GetInfo, CommandArgs::none())
            .await
    }

    /// Protocol description of framed firmware
    pub async fn get_protocol(&self) -> Result<String> {
        self.execute_command(CommandCode::GetProtocol, CommandArgs::none())
            .await
    }
}

impl fmt::Debug for SonicAmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SonicAmp")
            .field("port", &self.communicator.port())
            .field("info", &self.info)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for SonicAmp {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}
