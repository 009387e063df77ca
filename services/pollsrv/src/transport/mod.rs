//! Transport boundary
//!
//! A transport moves raw register words to and from one bus endpoint.
//! Addresses here are wire addresses (0-based); the register client does
//! the conversion from document addresses. Framing, CRC and request pairing
//! belong to the binding.

pub mod simulated;
pub mod tcp;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use simulated::{SimulatedHandle, SimulatedTransport};
pub use tcp::TcpTransport;

/// Modbus exception code carried by an exception response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionCode(pub u8);

impl ExceptionCode {
    pub const ILLEGAL_FUNCTION: Self = Self(1);
    pub const ILLEGAL_DATA_ADDRESS: Self = Self(2);
    pub const ILLEGAL_DATA_VALUE: Self = Self(3);
    pub const SLAVE_DEVICE_FAILURE: Self = Self(4);
    pub const SLAVE_DEVICE_BUSY: Self = Self(6);

    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "Illegal Function",
            2 => "Illegal Data Address",
            3 => "Illegal Data Value",
            4 => "Slave Device Failure",
            5 => "Acknowledge",
            6 => "Slave Device Busy",
            7 => "Negative Acknowledge",
            8 => "Memory Parity Error",
            10 => "Gateway Path Unavailable",
            11 => "Gateway Target Device Failed to Respond",
            _ => "Unknown Exception",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Exception response {0}")]
    Exception(ExceptionCode),

    #[error("Transport is not connected")]
    NotConnected,
}

impl TransportError {
    /// Whether the link itself is broken, as opposed to a device-level refusal
    pub fn is_link_failure(&self) -> bool {
        !matches!(self, Self::Exception(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[async_trait]
pub trait Transport: Send {
    /// Short human-readable endpoint description for logs
    fn endpoint(&self) -> String;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> TransportResult<()>;

    async fn close(&mut self) -> TransportResult<()>;

    async fn read_input(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>>;

    async fn read_holding(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>>;

    async fn write_holding(&mut self, address: u16, words: &[u16], unit: u8) -> TransportResult<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn connect(&mut self) -> TransportResult<()> {
        (**self).connect().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        (**self).close().await
    }

    async fn read_input(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        (**self).read_input(address, count, unit).await
    }

    async fn read_holding(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        (**self).read_holding(address, count, unit).await
    }

    async fn write_holding(&mut self, address: u16, words: &[u16], unit: u8) -> TransportResult<()> {
        (**self).write_holding(address, words, unit).await
    }
}
