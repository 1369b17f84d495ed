//! Compile-time selection of the platform backend.

use super::async_port::{AsyncSerialPort, SerialPort};
use super::traits::ReadOptions;
use crate::config::SerialConfig;

#[cfg(target_os = "android")]
use super::device_node::DeviceNodeBackend as PlatformBackend;

#[cfg(not(target_os = "android"))]
use super::native::NativeBackend as PlatformBackend;

/// Port on the desktop (`serialport` library) backend.
pub type DesktopSerialPort = AsyncSerialPort<super::native::NativeBackend>;

/// Port on the tty device-node backend.
#[cfg(unix)]
pub type DeviceNodeSerialPort = AsyncSerialPort<super::device_node::DeviceNodeBackend>;

/// Port on the in-memory loopback backend.
pub type LoopbackSerialPort = AsyncSerialPort<super::loopback::LoopbackBackend>;

/// Builds closed ports for the platform this crate was compiled for.
///
/// Android targets get the device-node backend; every other target gets
/// the desktop backend.
///
/// # Example
/// ```no_run
/// use portkit::port::{PortSettings, SerialPortFactory};
///
/// # async fn example() -> Result<(), portkit::PortError> {
/// let mut port = SerialPortFactory::create();
/// port.open("/dev/ttyUSB0", PortSettings::new(115_200)).await?;
/// port.write(b"AT\r\n").await?;
/// port.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortFactory;

impl SerialPortFactory {
    /// A closed port with default read tuning.
    pub fn create() -> Box<dyn SerialPort> {
        Self::with_options(ReadOptions::default())
    }

    /// A closed port with custom read tuning.
    pub fn with_options(options: ReadOptions) -> Box<dyn SerialPort> {
        Box::new(AsyncSerialPort::with_options(PlatformBackend, options))
    }

    /// A closed port tuned from the `[serial]` configuration section.
    pub fn from_config(config: &SerialConfig) -> Box<dyn SerialPort> {
        Self::with_options(config.read_options())
    }

    /// Name of the backend `create` selects on this target.
    pub fn platform() -> &'static str {
        use super::traits::SerialBackend;
        PlatformBackend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_port_starts_closed() {
        let port = SerialPortFactory::create();
        assert!(!port.is_open());
        assert!(port.port_name().is_none());
    }

    #[test]
    fn test_platform_name() {
        let expected = if cfg!(target_os = "android") {
            "device-node"
        } else {
            "native"
        };
        assert_eq!(SerialPortFactory::platform(), expected);
    }

    #[tokio::test]
    async fn test_factory_port_rejects_missing_device() {
        let mut port = SerialPortFactory::create();
        let result = port.open_with_baud("/dev/nonexistent_factory_port", 9600).await;
        assert!(result.is_err());
        assert!(!port.is_open());
    }
}
