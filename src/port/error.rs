//! Port error type.
//!
//! Every failure surfaced by the port layer is a [`PortError`], whatever the
//! backend. Errors raised by `std::io` or the `serialport` crate are kept as
//! the source so callers can still walk the chain.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// The single error kind for open, close, read and write failures.
#[derive(Error)]
#[error("{message}")]
pub struct PortError {
    message: String,
    #[source]
    source: Option<BoxedCause>,
}

impl PortError {
    /// Create an error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    ///
    /// The cause's own message is appended so the error reads well when
    /// printed on its own.
    pub fn with_source<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let context = context.into();
        Self {
            message: format!("{context}: {cause}"),
            source: Some(Box::new(cause)),
        }
    }

    /// The device path or port name does not exist.
    pub fn not_found(port_name: impl AsRef<str>) -> Self {
        Self::new(format!("Device {} not found", port_name.as_ref()))
    }

    /// An operation that needs an open port was called on a closed one.
    pub fn not_open() -> Self {
        Self::new("Port is not open")
    }

    /// `open` was called while a connection is already held.
    pub fn already_open(port_name: impl AsRef<str>) -> Self {
        Self::new(format!(
            "Port is already open on {}; close it before opening again",
            port_name.as_ref()
        ))
    }

    /// A connection parameter is out of range or unsupported by the backend.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(format!("Invalid port configuration: {}", message.into()))
    }

    /// The backend accepted fewer bytes than requested.
    pub fn short_write(written: usize, expected: usize) -> Self {
        Self::new(format!(
            "Failed to write all data: wrote {written} of {expected} bytes"
        ))
    }

    /// The message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether an underlying cause is attached.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// The underlying I/O error kind, if the cause is an `io::Error`.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        self.source
            .as_ref()
            .and_then(|e| e.downcast_ref::<std::io::Error>())
            .map(std::io::Error::kind)
    }
}

impl fmt::Debug for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PortError");
        s.field("message", &self.message);
        if let Some(ref source) = self.source {
            s.field("source", source);
        }
        s.finish()
    }
}

impl From<std::io::Error> for PortError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source("I/O error", err)
    }
}

impl From<serialport::Error> for PortError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::with_source("No such device", err),
            serialport::ErrorKind::InvalidInput => {
                Self::with_source("Invalid port configuration", err)
            }
            _ => Self::with_source("Serial port error", err),
        }
    }
}
