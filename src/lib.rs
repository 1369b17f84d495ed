//! portkit: cross-platform async serial port access.
//!
//! One async capability, [`SerialPort`], with a backend per platform and a
//! factory that picks the right one at compile time.
//!
//! # Modules
//!
//! - `port`: the capability, its backends and the read stream
//! - `config`: TOML configuration with environment overrides
//! - `logging`: tracing subscriber setup for binaries
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use portkit::{PortSettings, SerialPortFactory};
//!
//! # async fn example() -> Result<(), portkit::PortError> {
//! let mut port = SerialPortFactory::create();
//! port.open("/dev/ttyUSB0", PortSettings::new(9600)).await?;
//!
//! let mut frames = port.read();
//! port.write(b"ABC").await?;
//! if let Some(frame) = frames.next().await {
//!     println!("received {:?}", frame?);
//! }
//!
//! port.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod port;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use port::{
    list_ports, AsyncSerialPort, DataBits, Frame, LoopbackBackend, NativeBackend, Parity,
    PortError, PortHandle, PortInfo, PortSettings, ReadOptions, ReadStream, SerialBackend,
    SerialPort, SerialPortFactory, StopBits,
};
