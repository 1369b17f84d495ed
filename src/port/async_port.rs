//! The async serial port capability.
//!
//! [`SerialPort`] is the surface callers program against. [`AsyncSerialPort`]
//! implements it once for any [`SerialBackend`], running every blocking
//! backend call on tokio's blocking pool via `spawn_blocking` so the
//! caller's worker thread is never blocked.

use super::error::PortError;
use super::stream::ReadStream;
use super::traits::{PortHandle, PortSettings, ReadOptions, SerialBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Async serial port capability.
///
/// A port starts closed. `open` moves it to open, `close` moves it back; a
/// failed `open` leaves it closed. A port is meant to be driven by a single
/// owner, which the `&mut self` receivers enforce.
#[async_trait]
pub trait SerialPort: Send + Sync + std::fmt::Debug {
    /// Acquire the device and apply `settings`.
    ///
    /// Fails if the device does not exist, the OS or driver refuses it, the
    /// settings are invalid, or this port is already open.
    async fn open(&mut self, port_name: &str, settings: PortSettings) -> Result<(), PortError>;

    /// Open with 8 data bits, 1 stop bit and no parity.
    async fn open_with_baud(&mut self, port_name: &str, baud_rate: u32) -> Result<(), PortError> {
        self.open(port_name, PortSettings::new(baud_rate)).await
    }

    /// Release the device. Closing a closed port does nothing.
    async fn close(&mut self) -> Result<(), PortError>;

    /// Write all of `data` and flush.
    ///
    /// An empty slice returns immediately without reaching the device. If
    /// the device accepts only part of the data the call fails; it is not
    /// retried.
    async fn write(&mut self, data: &[u8]) -> Result<(), PortError>;

    /// Stream of frames received while the current open lasts.
    ///
    /// On a closed port the stream is empty. Must be called from within a
    /// tokio runtime.
    fn read(&self) -> ReadStream;

    /// Whether the port currently holds a device.
    fn is_open(&self) -> bool;

    /// Name of the open device, if any.
    fn port_name(&self) -> Option<&str>;

    /// Settings of the open device, if any.
    fn settings(&self) -> Option<PortSettings>;
}

/// State held between a successful open and the matching close.
#[derive(Debug)]
struct Connection {
    name: String,
    settings: PortSettings,
    handle: Arc<Mutex<Box<dyn PortHandle>>>,
    /// Cleared on close; every stream spawned during this open watches it.
    session: Arc<AtomicBool>,
    /// Poll loops spawned by `read`; close waits for them to drop their handles.
    readers: Mutex<Vec<JoinHandle<()>>>,
}

/// [`SerialPort`] over a blocking backend.
#[derive(Debug)]
pub struct AsyncSerialPort<B> {
    backend: Arc<B>,
    options: ReadOptions,
    connection: Option<Connection>,
}

impl<B: SerialBackend + 'static> AsyncSerialPort<B> {
    /// A closed port on `backend` with default read tuning.
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, ReadOptions::default())
    }

    /// A closed port on `backend` with custom read tuning.
    pub fn with_options(backend: B, options: ReadOptions) -> Self {
        Self {
            backend: Arc::new(backend),
            options,
            connection: None,
        }
    }

    /// The backend this port opens devices through.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The read tuning in use.
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }
}

fn blocking_task_failed(err: tokio::task::JoinError) -> PortError {
    PortError::with_source("Blocking I/O task failed", err)
}

#[async_trait]
impl<B: SerialBackend + 'static> SerialPort for AsyncSerialPort<B> {
    async fn open(&mut self, port_name: &str, settings: PortSettings) -> Result<(), PortError> {
        if let Some(ref connection) = self.connection {
            return Err(PortError::already_open(&connection.name));
        }
        settings.validate()?;

        let backend = Arc::clone(&self.backend);
        let name = port_name.to_string();
        let options = self.options;
        let handle = tokio::task::spawn_blocking(move || backend.open(&name, &settings, &options))
            .await
            .map_err(blocking_task_failed)??;

        debug!(
            "Opened {} via {} backend at {} baud ({}{}{})",
            port_name,
            self.backend.name(),
            settings.baud_rate,
            settings.data_bits.count(),
            parity_letter(settings.parity.code()),
            settings.stop_bits.count(),
        );

        self.connection = Some(Connection {
            name: port_name.to_string(),
            settings,
            handle: Arc::new(Mutex::new(handle)),
            session: Arc::new(AtomicBool::new(true)),
            readers: Mutex::new(Vec::new()),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PortError> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        connection.session.store(false, Ordering::Release);

        // Each loop notices the cleared session within one read timeout.
        let readers = std::mem::take(&mut *connection.readers.lock());
        for reader in readers {
            if let Err(e) = reader.await {
                warn!("Read loop for {} ended abnormally: {}", connection.name, e);
            }
        }

        let name = connection.name;
        let handle = connection.handle;
        let result = tokio::task::spawn_blocking(move || match Arc::try_unwrap(handle) {
            Ok(handle) => handle.into_inner().close(),
            // An abandoned write still owns a reference; it releases the
            // handle when it finishes.
            Err(_) => Ok(()),
        })
        .await
        .map_err(blocking_task_failed)
        .and_then(|r| r);

        match result {
            Ok(()) => {
                debug!("Closed {}", name);
                Ok(())
            }
            Err(e) => {
                warn!("Close of {} reported an error: {}", name, e);
                Err(e)
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        if data.is_empty() {
            return Ok(());
        }
        let connection = self.connection.as_ref().ok_or_else(PortError::not_open)?;

        let handle = Arc::clone(&connection.handle);
        let data = data.to_vec();
        let len = data.len();
        tokio::task::spawn_blocking(move || {
            let mut port = handle.lock();
            let written = port.write_bytes(&data)?;
            if written != data.len() {
                return Err(PortError::short_write(written, data.len()));
            }
            port.flush()
        })
        .await
        .map_err(blocking_task_failed)??;

        trace!("Wrote {} bytes to {}", len, connection.name);
        Ok(())
    }

    fn read(&self) -> ReadStream {
        let Some(ref connection) = self.connection else {
            return ReadStream::closed();
        };

        let reader = connection.handle.lock().try_clone();
        match reader {
            Ok(reader) => {
                let (stream, task) = ReadStream::spawn(
                    connection.name.clone(),
                    reader,
                    Arc::clone(&connection.session),
                    self.options,
                );
                let mut readers = connection.readers.lock();
                readers.retain(|r| !r.is_finished());
                readers.push(task);
                stream
            }
            Err(e) => ReadStream::failed(e),
        }
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.name.as_str())
    }

    fn settings(&self) -> Option<PortSettings> {
        self.connection.as_ref().map(|c| c.settings)
    }
}

fn parity_letter(code: u8) -> char {
    match code {
        1 => 'O',
        2 => 'E',
        3 => 'M',
        4 => 'S',
        _ => 'N',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::loopback::LoopbackBackend;
    use futures::StreamExt;
    use std::time::Duration;

    fn fast_options() -> ReadOptions {
        ReadOptions {
            read_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            ..ReadOptions::default()
        }
    }

    #[tokio::test]
    async fn test_open_close_state() {
        let mut port = AsyncSerialPort::with_options(LoopbackBackend::single("LOOP0"), fast_options());
        assert!(!port.is_open());

        port.open_with_baud("LOOP0", 115_200).await.unwrap();
        assert!(port.is_open());
        assert_eq!(port.port_name(), Some("LOOP0"));
        assert_eq!(port.settings().map(|s| s.baud_rate), Some(115_200));

        port.close().await.unwrap();
        assert!(!port.is_open());
        assert_eq!(port.port_name(), None);
        assert!(!port.backend().is_held("LOOP0"));
    }

    #[tokio::test]
    async fn test_open_twice_fails_fast() {
        let mut port = AsyncSerialPort::with_options(LoopbackBackend::single("LOOP0"), fast_options());
        port.open_with_baud("LOOP0", 9600).await.unwrap();

        let err = port.open_with_baud("LOOP0", 9600).await.unwrap_err();
        assert!(err.to_string().contains("already open"));
        assert!(port.is_open());
    }

    #[tokio::test]
    async fn test_write_when_closed() {
        let mut port = AsyncSerialPort::new(LoopbackBackend::single("LOOP0"));
        let err = port.write(b"x").await.unwrap_err();
        assert_eq!(err.to_string(), "Port is not open");
    }

    #[tokio::test]
    async fn test_read_on_closed_port_is_empty() {
        let port = AsyncSerialPort::new(LoopbackBackend::single("LOOP0"));
        let mut stream = port.read();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_self_loop_echo() {
        let mut port = AsyncSerialPort::with_options(LoopbackBackend::single("LOOP0"), fast_options());
        port.open_with_baud("LOOP0", 9600).await.unwrap();
        let mut stream = port.read();

        port.write(b"echo").await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("frame in time")
            .expect("stream still open")
            .unwrap();
        assert_eq!(frame, b"echo");
    }

    #[test]
    fn test_parity_letter() {
        assert_eq!(parity_letter(0), 'N');
        assert_eq!(parity_letter(2), 'E');
        assert_eq!(parity_letter(4), 'S');
    }
}
