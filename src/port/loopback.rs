//! In-memory loopback backend.
//!
//! Simulates serial endpoints without hardware. Two endpoints can be wired
//! together so that bytes written on one arrive on the other, or a single
//! endpoint can loop back onto itself like a port with TX jumpered to RX.
//! Faults can be scheduled per endpoint to exercise error paths.
//!
//! # Example
//! ```
//! use portkit::port::{LoopbackBackend, PortHandle, PortSettings, ReadOptions, SerialBackend};
//!
//! let backend = LoopbackBackend::pair("LOOP0", "LOOP1");
//! let options = ReadOptions::default();
//! let mut a = backend.open("LOOP0", &PortSettings::default(), &options).unwrap();
//! let mut b = backend.open("LOOP1", &PortSettings::default(), &options).unwrap();
//!
//! assert_eq!(a.write_bytes(b"ABC").unwrap(), 3);
//! let mut buffer = [0u8; 8];
//! let n = b.read_frame(&mut buffer).unwrap();
//! assert_eq!(&buffer[..n], b"ABC");
//! ```

use super::error::PortError;
use super::traits::{PortHandle, PortSettings, ReadOptions, SerialBackend};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Endpoint {
    /// Name of the endpoint that receives this endpoint's writes.
    peer: String,
    /// Bytes waiting to be read on this endpoint.
    inbox: VecDeque<u8>,
    /// Whether a handle currently holds the endpoint.
    held: bool,
    /// Refuse the next open attempts while set.
    refuse_open: bool,
    /// Cap on the number of bytes the next write accepts.
    next_write_limit: Option<usize>,
    /// Fault returned by the next read.
    next_read_fault: Option<String>,
    /// Number of calls that reached `write_bytes`.
    write_calls: usize,
    /// Every accepted write, in order.
    write_log: Vec<Vec<u8>>,
    /// Settings used by the most recent successful open.
    last_settings: Option<PortSettings>,
}

#[derive(Debug, Default)]
struct Shared {
    endpoints: Mutex<HashMap<String, Endpoint>>,
    data_ready: Condvar,
}

/// A registry of simulated serial endpoints.
///
/// Cloning the backend shares the registry, so a test can keep a clone to
/// inspect and poke endpoints while a port owns another.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    shared: Arc<Shared>,
}

impl LoopbackBackend {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding one endpoint looped back onto itself.
    pub fn single(name: &str) -> Self {
        let backend = Self::new();
        backend.add_port(name);
        backend
    }

    /// A registry holding two endpoints wired to each other.
    pub fn pair(a: &str, b: &str) -> Self {
        let backend = Self::new();
        backend.add_pair(a, b);
        backend
    }

    /// Register an endpoint whose writes come back on its own input.
    pub fn add_port(&self, name: &str) {
        self.shared.endpoints.lock().insert(
            name.to_string(),
            Endpoint {
                peer: name.to_string(),
                ..Default::default()
            },
        );
    }

    /// Register two endpoints wired TX-to-RX in both directions.
    pub fn add_pair(&self, a: &str, b: &str) {
        let mut endpoints = self.shared.endpoints.lock();
        endpoints.insert(
            a.to_string(),
            Endpoint {
                peer: b.to_string(),
                ..Default::default()
            },
        );
        endpoints.insert(
            b.to_string(),
            Endpoint {
                peer: a.to_string(),
                ..Default::default()
            },
        );
    }

    /// Deliver bytes to an endpoint's input as if they came off the wire.
    ///
    /// Bytes are queued whether or not the endpoint is held.
    pub fn inject(&self, name: &str, data: &[u8]) {
        let mut endpoints = self.shared.endpoints.lock();
        if let Some(endpoint) = endpoints.get_mut(name) {
            endpoint.inbox.extend(data);
            self.shared.data_ready.notify_all();
        }
    }

    /// Make opens of `name` fail until reset.
    pub fn set_refuse_open(&self, name: &str, refuse: bool) {
        self.with_endpoint(name, |e| e.refuse_open = refuse);
    }

    /// Let the next write on `name` accept at most `limit` bytes.
    pub fn limit_next_write(&self, name: &str, limit: usize) {
        self.with_endpoint(name, |e| e.next_write_limit = Some(limit));
    }

    /// Make the next read on `name` fail with `message`.
    pub fn fail_next_read(&self, name: &str, message: impl Into<String>) {
        let message = message.into();
        self.with_endpoint(name, |e| e.next_read_fault = Some(message));
        self.shared.data_ready.notify_all();
    }

    /// How many times a write reached the endpoint.
    pub fn write_calls(&self, name: &str) -> usize {
        self.with_endpoint(name, |e| e.write_calls).unwrap_or(0)
    }

    /// Every accepted write on the endpoint, in order.
    pub fn write_log(&self, name: &str) -> Vec<Vec<u8>> {
        self.with_endpoint(name, |e| e.write_log.clone())
            .unwrap_or_default()
    }

    /// Whether a handle currently holds the endpoint.
    pub fn is_held(&self, name: &str) -> bool {
        self.with_endpoint(name, |e| e.held).unwrap_or(false)
    }

    /// Bytes queued on the endpoint's input.
    pub fn pending(&self, name: &str) -> usize {
        self.with_endpoint(name, |e| e.inbox.len()).unwrap_or(0)
    }

    /// Settings of the most recent successful open.
    pub fn last_settings(&self, name: &str) -> Option<PortSettings> {
        self.with_endpoint(name, |e| e.last_settings).flatten()
    }

    fn with_endpoint<T>(&self, name: &str, f: impl FnOnce(&mut Endpoint) -> T) -> Option<T> {
        let mut endpoints = self.shared.endpoints.lock();
        endpoints.get_mut(name).map(f)
    }
}

impl SerialBackend for LoopbackBackend {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
        options: &ReadOptions,
    ) -> Result<Box<dyn PortHandle>, PortError> {
        settings.validate()?;

        let mut endpoints = self.shared.endpoints.lock();
        let endpoint = endpoints
            .get_mut(port_name)
            .ok_or_else(|| PortError::not_found(port_name))?;

        if endpoint.refuse_open {
            return Err(PortError::new(format!("Failed to open {port_name}")));
        }
        if endpoint.held {
            return Err(PortError::new(format!("Device {port_name} is busy")));
        }

        endpoint.held = true;
        endpoint.last_settings = Some(*settings);

        Ok(Box::new(LoopbackHandle {
            name: port_name.to_string(),
            shared: Arc::clone(&self.shared),
            read_timeout: options.read_timeout,
            lease: Arc::new(Lease {
                name: port_name.to_string(),
                shared: Arc::clone(&self.shared),
            }),
        }))
    }
}

/// Releases the endpoint once every clone of a handle is gone.
#[derive(Debug)]
struct Lease {
    name: String,
    shared: Arc<Shared>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut endpoints = self.shared.endpoints.lock();
        if let Some(endpoint) = endpoints.get_mut(&self.name) {
            endpoint.held = false;
        }
        self.shared.data_ready.notify_all();
    }
}

/// An open loopback endpoint.
#[derive(Debug)]
pub struct LoopbackHandle {
    name: String,
    shared: Arc<Shared>,
    read_timeout: Duration,
    lease: Arc<Lease>,
}

impl PortHandle for LoopbackHandle {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut endpoints = self.shared.endpoints.lock();
        let endpoint = endpoints
            .get_mut(&self.name)
            .ok_or_else(|| PortError::not_found(&self.name))?;

        endpoint.write_calls += 1;
        let accepted = match endpoint.next_write_limit.take() {
            Some(limit) => limit.min(data.len()),
            None => data.len(),
        };
        let accepted_bytes = data[..accepted].to_vec();
        endpoint.write_log.push(accepted_bytes.clone());
        let peer = endpoint.peer.clone();

        if let Some(target) = endpoints.get_mut(&peer) {
            target.inbox.extend(accepted_bytes);
        }
        self.shared.data_ready.notify_all();

        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn read_frame(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut endpoints = self.shared.endpoints.lock();

        loop {
            let endpoint = endpoints
                .get_mut(&self.name)
                .ok_or_else(|| PortError::not_found(&self.name))?;

            if let Some(message) = endpoint.next_read_fault.take() {
                return Err(PortError::with_source(
                    "Failed to read data",
                    std::io::Error::other(message),
                ));
            }

            if !endpoint.inbox.is_empty() {
                let n = buffer.len().min(endpoint.inbox.len());
                for (slot, byte) in buffer.iter_mut().zip(endpoint.inbox.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }

            if self
                .shared
                .data_ready
                .wait_for(&mut endpoints, self.read_timeout)
                .timed_out()
            {
                return Ok(0);
            }
        }
    }

    fn try_clone(&self) -> Result<Box<dyn PortHandle>, PortError> {
        Ok(Box::new(LoopbackHandle {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
            read_timeout: self.read_timeout,
            lease: Arc::clone(&self.lease),
        }))
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        let endpoints = self.shared.endpoints.lock();
        endpoints
            .get(&self.name)
            .map(|e| e.inbox.len())
            .ok_or_else(|| PortError::not_found(&self.name))
    }
}
