//! The read stream handed out by [`SerialPort::read`](super::SerialPort::read).
//!
//! Frames are produced by a blocking poll loop on tokio's blocking pool and
//! forwarded through a bounded channel. The stream checks the session flag
//! of the open that spawned it before yielding anything, so nothing is
//! yielded once the port has been closed.

use super::error::PortError;
use super::traits::{PortHandle, ReadOptions};
use futures::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// One chunk of bytes from a single read poll.
pub type Frame = Vec<u8>;

type FrameResult = Result<Frame, PortError>;

/// A lazy stream of frames read from an open port.
///
/// Ends when the port is closed. A read fault is yielded once as `Err` and
/// ends the stream. Dropping the stream stops the poll loop behind it.
#[derive(Debug)]
pub struct ReadStream {
    rx: Option<mpsc::Receiver<FrameResult>>,
    session: Option<Arc<AtomicBool>>,
    error: Option<PortError>,
}

impl ReadStream {
    /// Spawn the poll loop for `reader` and return the stream it feeds,
    /// along with the loop's task handle.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        port_name: String,
        reader: Box<dyn PortHandle>,
        session: Arc<AtomicBool>,
        options: ReadOptions,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let loop_session = Arc::clone(&session);
        let task = tokio::task::spawn_blocking(move || {
            poll_loop(&port_name, reader, &loop_session, &tx, &options);
        });

        let stream = Self {
            rx: Some(rx),
            session: Some(session),
            error: None,
        };
        (stream, task)
    }

    /// A stream that ends immediately.
    pub(crate) fn closed() -> Self {
        Self {
            rx: None,
            session: None,
            error: None,
        }
    }

    /// A stream that yields `error` once, then ends.
    pub(crate) fn failed(error: PortError) -> Self {
        Self {
            rx: None,
            session: None,
            error: Some(error),
        }
    }

    fn is_live(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Acquire))
    }

    fn finish(&mut self) {
        // Closing the receiver wakes a poll loop parked on a full channel.
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        self.session = None;
    }
}

impl Stream for ReadStream {
    type Item = FrameResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(error) = this.error.take() {
            return Poll::Ready(Some(Err(error)));
        }
        if !this.is_live() {
            this.finish();
            return Poll::Ready(None);
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if this.is_live() {
                    Poll::Ready(Some(Ok(frame)))
                } else {
                    this.finish();
                    Poll::Ready(None)
                }
            }
            Poll::Ready(Some(Err(error))) => {
                this.finish();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ReadStream {
    fn is_terminated(&self) -> bool {
        self.rx.is_none() && self.error.is_none()
    }
}

fn poll_loop(
    port_name: &str,
    mut reader: Box<dyn PortHandle>,
    session: &AtomicBool,
    tx: &mpsc::Sender<FrameResult>,
    options: &ReadOptions,
) {
    let mut buffer = vec![0u8; options.buffer_size.max(1)];
    debug!("Read loop started on {}", port_name);

    while session.load(Ordering::Acquire) && !tx.is_closed() {
        match reader.read_frame(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                if !session.load(Ordering::Acquire) {
                    break;
                }
                trace!("Read {} bytes from {}", n, port_name);
                if !forward(Ok(buffer[..n].to_vec()), session, tx, options) {
                    break;
                }
            }
            Err(e) => {
                if session.load(Ordering::Acquire) {
                    warn!("Read failed on {}: {}", port_name, e);
                    forward(Err(e), session, tx, options);
                }
                break;
            }
        }
    }

    debug!("Read loop on {} finished", port_name);
}

/// Hand one item to the consumer, waiting while the channel is full.
///
/// Returns `false` once the session ends or the consumer is gone, so a
/// stalled consumer never keeps the loop alive past a close.
fn forward(
    item: FrameResult,
    session: &AtomicBool,
    tx: &mpsc::Sender<FrameResult>,
    options: &ReadOptions,
) -> bool {
    let mut item = item;
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(returned)) => {
                if !session.load(Ordering::Acquire) {
                    return false;
                }
                item = returned;
                std::thread::sleep(options.poll_interval.max(Duration::from_millis(1)));
            }
        }
    }
}
