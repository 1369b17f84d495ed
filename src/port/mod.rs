//! Serial port abstraction layer.
//!
//! [`SerialPort`] is the async capability; [`SerialPortFactory`] hands out
//! the variant for the current platform. Each variant is an
//! [`AsyncSerialPort`] over a blocking [`SerialBackend`]:
//!
//! - [`NativeBackend`]: desktop targets, via the `serialport` crate
//! - [`DeviceNodeBackend`]: unix tty device nodes (the Android backend)
//! - [`LoopbackBackend`]: in-memory endpoints for tests and demos

pub mod async_port;
#[cfg(unix)]
pub mod device_node;
pub mod error;
pub mod factory;
pub mod loopback;
pub mod native;
pub mod stream;
pub mod traits;

pub use async_port::{AsyncSerialPort, SerialPort};
#[cfg(unix)]
pub use device_node::DeviceNodeBackend;
pub use error::PortError;
#[cfg(unix)]
pub use factory::DeviceNodeSerialPort;
pub use factory::{DesktopSerialPort, LoopbackSerialPort, SerialPortFactory};
pub use loopback::LoopbackBackend;
pub use native::NativeBackend;
pub use stream::{Frame, ReadStream};
pub use traits::*;

/// Basic information about a serial device present on the system.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Enumerate serial devices known to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    let ports = serialport::available_ports()
        .map_err(|e| PortError::with_source("Failed to enumerate serial ports", e))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    "usb",
                    usb.product.or(usb.manufacturer).or_else(|| {
                        Some(format!("{:04x}:{:04x}", usb.vid, usb.pid))
                    }),
                ),
                serialport::SerialPortType::BluetoothPort => ("bluetooth", None),
                serialport::SerialPortType::PciPort => ("pci", None),
                serialport::SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: p.port_name,
                kind: kind.to_string(),
                description,
            }
        })
        .collect())
}
