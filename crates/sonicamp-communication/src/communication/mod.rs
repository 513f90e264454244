//! Transports and communicators
//!
//! A [`ConnectionFactory`] opens a byte stream (serial port, child process,
//! or in-memory loopback). A [`Communicator`] owns that stream through its
//! reader and writer tasks and exchanges one request at a time with the
//! device, either framed ([`SonicCommunicator`]) or line based
//! ([`LegacyCommunicator`]).

pub mod encoding;
pub mod fetcher;
pub mod legacy;
pub mod loopback;
pub mod package;
pub mod process;
pub mod serial;
pub mod sonic;

use async_trait::async_trait;
use sonicamp_core::{
    ConnectionEvent, DisconnectReason, EventBus, ProtocolKind, Result, SonicEvent,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::commands::Command;

pub use encoding::ChannelEncoding;
pub use fetcher::{DeviceLogLevel, DeviceLogSink, PackageFetcher, TracingLogSink};
pub use legacy::{LegacyCommunicator, LegacyCommunicatorConfig};
pub use loopback::{LoopbackConnectionFactory, LoopbackMode, Responder};
pub use package::{Package, PackageParser};
pub use process::ProcessConnectionFactory;
pub use serial::{list_ports, SerialConnectionFactory, SerialPortInfo};
pub use sonic::{SonicCommunicator, SonicCommunicatorConfig};

/// Baud rate of the framed protocol
pub const SONIC_BAUD_RATE: u32 = 9600;
/// Baud rate of the legacy protocol
pub const LEGACY_BAUD_RATE: u32 = 115_200;

/// Boxed read half of a transport
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a transport
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open byte stream
pub struct Transport {
    /// Bytes from the device.
    pub reader: BoxedReader,
    /// Bytes to the device.
    pub writer: BoxedWriter,
    /// Serial port or executable the stream runs over.
    pub name: String,
    /// Child process to keep alive while the stream is in use.
    pub child: Option<tokio::process::Child>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name)
            .field("child", &self.child.as_ref().and_then(|c| c.id()))
            .finish()
    }
}

/// Opens transports; may be called repeatedly (protocol negotiation reopens)
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a fresh byte stream at the given baud rate
    async fn open(&self, baud_rate: u32) -> Result<Transport>;

    /// Serial port or executable this factory connects to
    fn name(&self) -> String;
}

/// Connection driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDriver {
    /// Serial port
    Serial,
    /// Child process speaking the protocol on stdin/stdout
    Process,
}

/// Connection parameters derived from a connection URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Driver type
    pub driver: ConnectionDriver,
    /// Serial port path or executable path
    pub port: String,
    /// Arguments passed to a child process
    pub args: Vec<String>,
}

impl ConnectionParams {
    /// Classify a connection URL
    ///
    /// An existing regular file outside `/dev` is treated as an executable;
    /// everything else is a serial port.
    pub fn from_url(url: &str) -> Self {
        let path = Path::new(url);
        let is_device_node = url.starts_with("/dev/")
            || (url.starts_with("COM") && url[3..].chars().all(|c| c.is_ascii_digit()));
        let driver = if !is_device_node && path.is_file() {
            ConnectionDriver::Process
        } else {
            ConnectionDriver::Serial
        };
        Self {
            driver,
            port: url.to_string(),
            args: Vec::new(),
        }
    }

    /// Add arguments for a child process
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Create the matching connection factory
    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        match self.driver {
            ConnectionDriver::Serial => Arc::new(SerialConnectionFactory::new(&self.port)),
            ConnectionDriver::Process => Arc::new(ProcessConnectionFactory::new(
                &self.port,
                self.args.clone(),
            )),
        }
    }
}

/// Request/response channel to one device
///
/// Requests are strictly serialized: at most one is outstanding at a time.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Protocol spoken on this connection
    fn protocol(&self) -> ProtocolKind;

    /// Serial port or executable of this connection
    fn port(&self) -> &str;

    /// Whether the connection is still open
    fn is_connected(&self) -> bool;

    /// Send one message and return the answer body
    ///
    /// `multiline` tells line based protocols to collect continuation lines.
    async fn transceive(&self, message: &str, multiline: bool) -> Result<String>;

    /// Pop one buffered raw frame or line that no request consumed
    fn read_message(&self) -> Option<String>;

    /// Banner read while opening, if the protocol has one
    fn handshake_banner(&self) -> Option<String> {
        None
    }

    /// Cancel the reader and writer tasks and close the stream
    ///
    /// Emits `Disconnected` once, however often it is called.
    async fn close(&self);

    /// Send a command and fill in its answer
    async fn send_and_wait(&self, command: &mut Command) -> Result<()> {
        let body = self
            .transceive(command.byte_message(), command.expects_multiline())
            .await?;
        command.receive_answer(&body);
        Ok(())
    }
}

/// Lifecycle shared by a communicator and its tasks
pub(crate) struct Link {
    port: String,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Link {
    pub(crate) fn new(port: String, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            port,
            bus,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn port(&self) -> &str {
        &self.port
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self, protocol: ProtocolKind) {
        tracing::info!(port = %self.port, %protocol, "Connection opened");
        self.bus.emit(SonicEvent::Connection(ConnectionEvent::Opened {
            port: self.port.clone(),
            protocol,
        }));
    }

    /// Cancel all tasks without emitting `Disconnected`
    pub(crate) fn discard(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(port = %self.port, "Connection discarded");
            self.cancel.cancel();
        }
    }

    /// Cancel all tasks and emit `Disconnected` the first time only
    pub(crate) fn shutdown(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        tracing::info!(port = %self.port, ?reason, "Connection closed");
        self.bus.emit(SonicEvent::Connection(ConnectionEvent::Disconnected {
            port: self.port.clone(),
            reason,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_classification() {
        assert_eq!(
            ConnectionParams::from_url("/dev/ttyUSB0").driver,
            ConnectionDriver::Serial
        );
        assert_eq!(ConnectionParams::from_url("COM3").driver, ConnectionDriver::Serial);
        assert_eq!(
            ConnectionParams::from_url("/no/such/file").driver,
            ConnectionDriver::Serial
        );

        let exe = std::env::current_exe().unwrap();
        let params = ConnectionParams::from_url(exe.to_str().unwrap());
        assert_eq!(params.driver, ConnectionDriver::Process);
    }

    #[test]
    fn test_link_disconnects_once() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = count.clone();
        bus.subscribe(sonicamp_core::EventKind::Disconnected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let link = Link::new("loop".to_string(), bus);
        link.shutdown(DisconnectReason::UserRequested);
        link.shutdown(DisconnectReason::Timeout);
        assert!(!link.is_open());
        assert!(link.cancel_token().is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
