//! Tests requiring a real serial port with TX wired to RX.
//!
//! Ignored by default.
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0      # or COM3 on Windows
//! export TEST_BAUD=115200            # optional, default: 9600
//! cargo test --test hardware_loopback -- --ignored
//! ```

mod common;

use common::{collect_bytes, fast_options};
use portkit::port::{PortSettings, SerialPortFactory};
use std::env;
use std::time::Duration;

fn test_port() -> Option<(String, u32)> {
    let port = env::var("TEST_PORT").ok();
    if port.is_none() {
        println!("Skipping hardware test: TEST_PORT not set");
    }
    let baud = env::var("TEST_BAUD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9600);
    port.map(|p| (p, baud))
}

#[tokio::test]
#[ignore]
async fn test_real_port_echo() {
    let Some((name, baud)) = test_port() else {
        return;
    };

    let mut port = SerialPortFactory::with_options(fast_options());
    port.open(&name, PortSettings::new(baud)).await.unwrap();
    assert!(port.is_open());

    let mut frames = port.read();
    port.write(b"ABC").await.unwrap();
    let received = collect_bytes(&mut frames, 3, Duration::from_secs(2)).await;
    assert_eq!(received, b"ABC");

    port.close().await.unwrap();
    assert!(!port.is_open());
    port.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_real_port_reopen() {
    let Some((name, baud)) = test_port() else {
        return;
    };

    let mut port = SerialPortFactory::with_options(fast_options());
    for _ in 0..3 {
        port.open(&name, PortSettings::new(baud)).await.unwrap();
        let _frames = port.read();
        port.close().await.unwrap();
    }
    assert!(!port.is_open());
}
