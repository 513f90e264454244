//! Serial port transport
//!
//! Opens amplifiers attached over USB or RS-232 with `tokio-serial` and
//! enumerates candidate ports with `serialport`.

use async_trait::async_trait;
use sonicamp_core::{ConnectionError, Error, Result};
use tokio_serial::SerialPortBuilderExt;

use super::{ConnectionFactory, Transport};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,
}

/// List serial ports an amplifier may be attached to
///
/// Keeps Windows `COM*` ports, Linux `/dev/ttyUSB*` and `/dev/ttyACM*`,
/// and macOS `/dev/cu.usbserial-*` and `/dev/cu.usbmodem*`.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_amp_port(&port.port_name))
        .map(|port| {
            let manufacturer = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => usb.manufacturer.clone(),
                _ => None,
            };
            SerialPortInfo {
                port_name: port.port_name.clone(),
                description: describe(port),
                manufacturer,
            }
        })
        .collect())
}

fn is_amp_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    ["/dev/ttyUSB", "/dev/ttyACM", "/dev/cu.usbserial-", "/dev/cu.usbmodem"]
        .iter()
        .any(|prefix| port_name.starts_with(prefix))
}

fn describe(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Opens a serial port, 8N1 without flow control
#[derive(Debug, Clone)]
pub struct SerialConnectionFactory {
    port: String,
}

impl SerialConnectionFactory {
    /// Create a factory for the given port path
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }
}

#[async_trait]
impl ConnectionFactory for SerialConnectionFactory {
    async fn open(&self, baud_rate: u32) -> Result<Transport> {
        tracing::debug!(port = %self.port, baud_rate, "Opening serial port");
        let stream = tokio_serial::new(&self.port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| ConnectionError::FailedToOpen {
                port: self.port.clone(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(Transport {
            reader: Box::new(reader),
            writer: Box::new(writer),
            name: self.port.clone(),
            child: None,
        })
    }

    fn name(&self) -> String {
        self.port.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_filter() {
        assert!(is_amp_port("COM3"));
        assert!(!is_amp_port("COM"));
        assert!(!is_amp_port("COMX"));
        assert!(is_amp_port("/dev/ttyUSB0"));
        assert!(is_amp_port("/dev/cu.usbmodem1101"));
        assert!(!is_amp_port("/dev/ttyS0"));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let factory = SerialConnectionFactory::new("/dev/does-not-exist-sonicamp");
        let err = factory.open(9600).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::FailedToOpen { .. })
        ));
    }
}
