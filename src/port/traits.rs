//! Connection parameters and the blocking backend seam.
//!
//! A backend is anything that can turn a port name plus [`PortSettings`] into
//! an open [`PortHandle`]. The async capability in [`super::async_port`] is
//! written once against these traits and drives them from tokio's blocking
//! pool.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection parameters for a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self::new(9600)
    }
}

impl PortSettings {
    /// Settings for `baud_rate` with 8 data bits, 1 stop bit and no parity.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }

    /// Build settings from the raw integer form used across backends.
    ///
    /// Fails if any value is outside the supported range.
    pub fn from_raw(
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: u8,
    ) -> Result<Self, PortError> {
        let settings = Self {
            baud_rate,
            data_bits: DataBits::try_from(data_bits)?,
            stop_bits: StopBits::try_from(stop_bits)?,
            parity: Parity::try_from(parity)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Check invariants the enum types cannot express.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.baud_rate == 0 {
            return Err(PortError::config("baud rate must be greater than zero"));
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn count(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(PortError::config(format!(
                "data bits must be 5, 6, 7 or 8, got {other}"
            ))),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub fn count(self) -> u8 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(PortError::config(format!(
                "stop bits must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Parity checking modes.
///
/// The integer codes (`0` none, `1` odd, `2` even, `3` mark, `4` space) are
/// fixed and shared with every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    /// The integer encoding of this parity mode.
    pub fn code(self) -> u8 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        }
    }

    /// Whether the parity bit is stuck (mark or space) rather than computed.
    pub fn is_sticky(self) -> bool {
        matches!(self, Parity::Mark | Parity::Space)
    }
}

impl TryFrom<u8> for Parity {
    type Error = PortError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            other => Err(PortError::config(format!(
                "parity code must be between 0 and 4, got {other}"
            ))),
        }
    }
}

impl std::str::FromStr for Parity {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            "mark" | "m" => Ok(Parity::Mark),
            "space" | "s" => Ok(Parity::Space),
            other => Err(PortError::config(format!("unknown parity '{other}'"))),
        }
    }
}

/// `serialport` only knows computed parity. Mark and space have no
/// equivalent there and are reported as a configuration error.
impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(format!(
                "{parity:?} parity is not supported by this backend"
            ))),
        }
    }
}

/// Backend tuning for the read loop.
///
/// None of these values change the open/close/read/write contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Largest frame a single poll may return.
    pub buffer_size: usize,
    /// Sleep between polls when the backend reported nothing to read.
    pub poll_interval: Duration,
    /// Upper bound on a single blocking read call.
    pub read_timeout: Duration,
    /// Frames buffered between the poll loop and the consumer.
    pub channel_capacity: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            poll_interval: Duration::from_millis(10),
            read_timeout: Duration::from_millis(100),
            channel_capacity: 64,
        }
    }
}

/// An open, blocking connection owned by one backend.
///
/// Implementations never block longer than their configured read timeout
/// in [`PortHandle::read_frame`], so callers can poll a shutdown flag
/// between calls.
pub trait PortHandle: Send + std::fmt::Debug {
    /// Hand bytes to the device. Returns how many were accepted, which may
    /// be fewer than `data.len()`.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Push buffered output to the device.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Read whatever one poll yields into `buffer`.
    ///
    /// `Ok(0)` means nothing arrived during this poll; it is not end of file.
    fn read_frame(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// A second handle onto the same connection, used by the read loop.
    fn try_clone(&self) -> Result<Box<dyn PortHandle>, PortError>;

    /// Bytes waiting in the receive buffer.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Release the connection. Dropping the handle has the same effect;
    /// this exists so backends can report a failure.
    fn close(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}

/// A source of port handles for one platform.
pub trait SerialBackend: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Acquire the device and apply `settings`.
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
        options: &ReadOptions,
    ) -> Result<Box<dyn PortHandle>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.parity, Parity::None);
    }

    #[test]
    fn test_default_read_options() {
        let options = ReadOptions::default();
        assert_eq!(options.buffer_size, 1024);
        assert_eq!(options.poll_interval, Duration::from_millis(10));
        assert_eq!(options.read_timeout, Duration::from_millis(100));
        assert_eq!(options.channel_capacity, 64);
    }

    #[test]
    fn test_parity_codes() {
        for code in 0..=4u8 {
            let parity = Parity::try_from(code).unwrap();
            assert_eq!(parity.code(), code);
        }
        assert_eq!(Parity::try_from(3).unwrap(), Parity::Mark);
        assert!(Parity::try_from(5).is_err());
    }

    #[test]
    fn test_from_raw_rejects_out_of_range() {
        assert!(PortSettings::from_raw(9600, 8, 1, 0).is_ok());
        assert!(PortSettings::from_raw(0, 8, 1, 0).is_err());
        assert!(PortSettings::from_raw(9600, 4, 1, 0).is_err());
        assert!(PortSettings::from_raw(9600, 9, 1, 0).is_err());
        assert!(PortSettings::from_raw(9600, 8, 3, 0).is_err());
        assert!(PortSettings::from_raw(9600, 8, 1, 7).is_err());
    }

    #[test]
    fn test_data_bits_conversion() {
        let bits = DataBits::try_from(7).unwrap();
        assert_eq!(bits.count(), 7);
        let serialport_bits: serialport::DataBits = bits.into();
        assert_eq!(serialport_bits, serialport::DataBits::Seven);
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits: serialport::StopBits = StopBits::Two.into();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
    }

    #[test]
    fn test_sticky_parity_has_no_serialport_equivalent() {
        let even: serialport::Parity = Parity::Even.try_into().unwrap();
        assert_eq!(even, serialport::Parity::Even);

        let mark: Result<serialport::Parity, _> = Parity::Mark.try_into();
        assert!(mark.is_err());
        assert!(Parity::Space.is_sticky());
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!("Even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("s".parse::<Parity>().unwrap(), Parity::Space);
        assert!("sideways".parse::<Parity>().is_err());
    }
}
