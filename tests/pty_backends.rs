//! Real-backend tests against a pseudo-terminal.
//!
//! The slave side of a pty is a genuine tty device node, so both the
//! device-node and the native backend can open it without hardware. The test
//! holds the master side and plays the remote device.

#![cfg(target_os = "linux")]

mod common;

use common::{collect_bytes, fast_options, next_within};
use portkit::port::{
    AsyncSerialPort, DeviceNodeBackend, NativeBackend, Parity, PortSettings, SerialBackend,
    SerialPort,
};
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(2);

struct Pty {
    master: File,
    // Held open so the pty survives while the port is closed.
    slave: File,
    path: String,
}

fn open_pty() -> Pty {
    let mut master = -1;
    let mut slave = -1;
    // SAFETY: both out-pointers are valid for writes; name, termios and
    // winsize are optional and passed as null.
    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    assert_eq!(rc, 0, "openpty failed: {}", std::io::Error::last_os_error());

    // SAFETY: openpty succeeded, so both descriptors are open and now owned here.
    let (master, slave) = unsafe { (File::from_raw_fd(master), File::from_raw_fd(slave)) };
    let path = std::fs::read_link(format!("/proc/self/fd/{}", slave.as_raw_fd()))
        .unwrap()
        .to_string_lossy()
        .into_owned();

    Pty {
        master,
        slave,
        path,
    }
}

impl Pty {
    /// Read exactly `len` bytes the port sent to the remote end.
    async fn receive(&self, len: usize) -> Vec<u8> {
        let mut master = self.master.try_clone().unwrap();
        let reader = tokio::task::spawn_blocking(move || {
            let mut received = vec![0u8; len];
            master.read_exact(&mut received).map(|_| received)
        });
        tokio::time::timeout(LIMIT, reader)
            .await
            .expect("port output did not reach the pty master in time")
            .unwrap()
            .unwrap()
    }

    fn send(&self, data: &[u8]) {
        (&self.master).write_all(data).unwrap();
    }

    fn cflag(&self) -> libc::tcflag_t {
        // SAFETY: the slave descriptor is open for the lifetime of `self` and
        // tcgetattr fully initialises `termios` on success.
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            assert_eq!(libc::tcgetattr(self.slave.as_raw_fd(), &mut termios), 0);
            termios.c_cflag
        }
    }
}

async fn assert_round_trip<B: SerialBackend + 'static>(backend: B, settings: PortSettings) {
    let pty = open_pty();
    let mut port = AsyncSerialPort::with_options(backend, fast_options());
    port.open(&pty.path, settings).await.unwrap();
    assert!(port.is_open());
    let mut frames = port.read();

    pty.send(b"ABC");
    assert_eq!(collect_bytes(&mut frames, 3, LIMIT).await, b"ABC");

    port.write(b"xyz").await.unwrap();
    assert_eq!(pty.receive(3).await, b"xyz");

    port.close().await.unwrap();
    assert!(!port.is_open());

    pty.send(b"late");
    assert!(next_within(&mut frames, LIMIT).await.is_none());
}

#[tokio::test]
async fn test_device_node_round_trip() {
    assert_round_trip(DeviceNodeBackend, PortSettings::new(9600)).await;
}

#[tokio::test]
async fn test_native_round_trip() {
    assert_round_trip(NativeBackend, PortSettings::new(115_200)).await;
}

#[tokio::test]
async fn test_device_node_mark_parity_round_trip() {
    assert_round_trip(DeviceNodeBackend, PortSettings::new(9600).parity(Parity::Mark)).await;
}

#[tokio::test]
async fn test_device_node_applies_sticky_parity_flags() {
    let pty = open_pty();
    let mut port = AsyncSerialPort::with_options(DeviceNodeBackend, fast_options());

    port.open(&pty.path, PortSettings::new(9600).parity(Parity::Mark))
        .await
        .unwrap();
    let cflag = pty.cflag();
    // The pty driver forces CS8 and clears PARENB; CMSPAR and PARODD stick.
    assert_ne!(cflag & libc::CMSPAR, 0);
    assert_ne!(cflag & libc::PARODD, 0);
    port.close().await.unwrap();

    port.open(&pty.path, PortSettings::new(9600).parity(Parity::Space))
        .await
        .unwrap();
    let cflag = pty.cflag();
    assert_ne!(cflag & libc::CMSPAR, 0);
    assert_eq!(cflag & libc::PARODD, 0);
    port.close().await.unwrap();
}

#[tokio::test]
async fn test_native_reopens_after_close() {
    let pty = open_pty();
    let mut port = AsyncSerialPort::with_options(NativeBackend, fast_options());

    for _ in 0..3 {
        port.open_with_baud(&pty.path, 9600).await.unwrap();
        let _frames = port.read();
        port.close().await.unwrap();
    }
    assert!(!port.is_open());
}
