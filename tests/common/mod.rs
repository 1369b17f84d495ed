//! Shared helpers for portkit integration tests.

#![allow(dead_code)]

use futures::StreamExt;
use portkit::port::{AsyncSerialPort, LoopbackBackend, ReadOptions, ReadStream};
use std::time::Duration;

/// Read tuning that keeps loopback tests fast.
pub fn fast_options() -> ReadOptions {
    ReadOptions {
        buffer_size: 64,
        poll_interval: Duration::from_millis(5),
        read_timeout: Duration::from_millis(20),
        channel_capacity: 16,
    }
}

/// A closed port on a clone of `backend`, so the caller keeps a handle to
/// inspect and poke the simulated endpoints.
pub fn loopback_port(backend: &LoopbackBackend) -> AsyncSerialPort<LoopbackBackend> {
    AsyncSerialPort::with_options(backend.clone(), fast_options())
}

/// Read frames until `expected` bytes have arrived or `limit` elapses.
///
/// Returns everything received, concatenated in arrival order.
pub async fn collect_bytes(stream: &mut ReadStream, expected: usize, limit: Duration) -> Vec<u8> {
    let mut received = Vec::new();
    let deadline = tokio::time::Instant::now() + limit;

    while received.len() < expected {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(frame))) => received.extend(frame),
            Ok(Some(Err(e))) => panic!("read failed: {e}"),
            Ok(None) | Err(_) => break,
        }
    }
    received
}

/// Wait for the next stream item, failing the test after `limit`.
pub async fn next_within(
    stream: &mut ReadStream,
    limit: Duration,
) -> Option<Result<Vec<u8>, portkit::PortError>> {
    tokio::time::timeout(limit, stream.next())
        .await
        .expect("stream did not yield or end in time")
}
