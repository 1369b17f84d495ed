//! Device-node backend for unix targets.
//!
//! Opens the tty character device directly (`/dev/ttyS*`, `/dev/ttyUSB*`,
//! `/dev/ttyWK*` on Android boards) and reads with a bounded blocking call.
//! A missing device node is reported before any open is attempted.
//!
//! On Linux and Android, mark and space parity are applied through the
//! termios `CMSPAR` flag after the port is configured.

use super::error::PortError;
use super::traits::{Parity, PortHandle, PortSettings, ReadOptions, SerialBackend};
use serialport::{SerialPort, TTYPort};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Backend for device-node platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceNodeBackend;

impl SerialBackend for DeviceNodeBackend {
    fn name(&self) -> &'static str {
        "device-node"
    }

    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
        options: &ReadOptions,
    ) -> Result<Box<dyn PortHandle>, PortError> {
        if !Path::new(port_name).exists() {
            return Err(PortError::not_found(port_name));
        }

        // Sticky parity is opened as the computed parity sharing its PARODD
        // bit, then switched over with CMSPAR.
        let base_parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd | Parity::Mark => serialport::Parity::Odd,
            Parity::Even | Parity::Space => serialport::Parity::Even,
        };

        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .stop_bits(settings.stop_bits.into())
            .parity(base_parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(options.read_timeout)
            .open_native()
            .map_err(|e| PortError::with_source(format!("Failed to open {port_name}"), e))?;

        if settings.parity.is_sticky() {
            apply_sticky_parity(&port, settings.parity)?;
        }

        Ok(Box::new(DeviceNodeHandle {
            port,
            name: port_name.to_string(),
        }))
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn apply_sticky_parity(port: &TTYPort, parity: Parity) -> Result<(), PortError> {
    use std::os::unix::io::AsRawFd;

    let fd = port.as_raw_fd();
    // SAFETY: `fd` is a valid open tty descriptor owned by `port` for the
    // duration of this call, and `termios` is fully initialised by tcgetattr.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            return Err(PortError::with_source(
                "Failed to read terminal attributes",
                std::io::Error::last_os_error(),
            ));
        }

        termios.c_cflag |= libc::PARENB | libc::CMSPAR;
        match parity {
            Parity::Mark => termios.c_cflag |= libc::PARODD,
            _ => termios.c_cflag &= !libc::PARODD,
        }

        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(PortError::with_source(
                "Failed to apply sticky parity",
                std::io::Error::last_os_error(),
            ));
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn apply_sticky_parity(_port: &TTYPort, parity: Parity) -> Result<(), PortError> {
    Err(PortError::config(format!(
        "{parity:?} parity is not supported on this platform"
    )))
}

/// An open tty device.
pub struct DeviceNodeHandle {
    port: TTYPort,
    name: String,
}

impl PortHandle for DeviceNodeHandle {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port
            .write(data)
            .map_err(|e| PortError::with_source("Failed to write data", e))
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port
            .flush()
            .map_err(|e| PortError::with_source("Failed to flush output", e))
    }

    fn read_frame(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(PortError::with_source("Failed to read data", e)),
        }
    }

    fn try_clone(&self) -> Result<Box<dyn PortHandle>, PortError> {
        let port = self
            .port
            .try_clone_native()
            .map_err(|e| PortError::with_source("Failed to clone port handle", e))?;
        Ok(Box::new(DeviceNodeHandle {
            port,
            name: self.name.clone(),
        }))
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| PortError::with_source("Failed to query available bytes", e))
    }
}

impl std::fmt::Debug for DeviceNodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceNodeHandle")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_node_is_not_found() {
        let err = DeviceNodeBackend
            .open(
                "/dev/ttyDOESNOTEXIST99",
                &PortSettings::default(),
                &ReadOptions::default(),
            )
            .expect_err("missing device node");
        assert_eq!(err.to_string(), "Device /dev/ttyDOESNOTEXIST99 not found");
        assert!(!err.has_source());
    }

    #[test]
    fn test_non_tty_file_is_refused() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let err = DeviceNodeBackend
            .open(&path, &PortSettings::default(), &ReadOptions::default())
            .expect_err("a regular file is not a tty");
        assert!(err.to_string().starts_with("Failed to open"));
    }
}
