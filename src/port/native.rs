//! Desktop backend built on the `serialport` crate.
//!
//! Reads are semi-blocking: each poll asks the driver how many bytes are
//! waiting and only reads those, sleeping for the poll interval when the
//! receive buffer is empty. Mark and space parity are not exposed by
//! `serialport` and are rejected at open time.

use super::error::PortError;
use super::traits::{PortHandle, PortSettings, ReadOptions, SerialBackend};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Backend for desktop targets (Windows, macOS, Linux).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl SerialBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
        options: &ReadOptions,
    ) -> Result<Box<dyn PortHandle>, PortError> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .stop_bits(settings.stop_bits.into())
            .parity(settings.parity.try_into()?)
            .flow_control(serialport::FlowControl::None)
            .timeout(options.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::with_source(
                    format!("Device {port_name} not found"),
                    e,
                ),
                _ => PortError::with_source(format!("Failed to open {port_name}"), e),
            })?;

        Ok(Box::new(NativeHandle {
            port,
            name: port_name.to_string(),
            poll_interval: options.poll_interval,
        }))
    }
}

/// An open port from the `serialport` crate.
pub struct NativeHandle {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    poll_interval: Duration,
}

impl PortHandle for NativeHandle {
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
        let available = self.bytes_to_read()?;

        if available == 0 {
            std::thread::sleep(self.poll_interval);
            return Ok(0);
        }

        let len = available.min(buffer.len());
        match self.port.read(&mut buffer[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => Err(PortError::with_source("Failed to read data", e)),
        }
    }

    fn try_clone(&self) -> Result<Box<dyn PortHandle>, PortError> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| PortError::with_source("Failed to clone port handle", e))?;
        Ok(Box::new(NativeHandle {
            port,
            name: self.name.clone(),
            poll_interval: self.poll_interval,
        }))
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| PortError::with_source("Failed to query available bytes", e))
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}
