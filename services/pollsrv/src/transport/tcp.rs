//! Modbus TCP binding
//!
//! Framing and request pairing are done by `tokio-modbus`; this binding adds
//! the per-call timeout and maps library errors onto [`TransportError`].
//!
//! A timeout or broken link discards the connection. The next request
//! reconnects once before it is sent, so one silent register does not fail
//! every parameter after it. If that reconnect fails, later requests return
//! `NotConnected` until the next explicit `connect`.

use super::{ExceptionCode, Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tokio_modbus::client::{Context as ModbusContext, Reader, Writer};
use tokio_modbus::prelude::*;
use tokio_modbus::Error as TokioModbusError;
use tracing::{debug, info, warn};

pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    context: Option<ModbusContext>,
    /// Set when a failed request discarded the connection
    relink: bool,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            context: None,
            relink: false,
        }
    }

    async fn context(&mut self, unit: u8) -> TransportResult<&mut ModbusContext> {
        if self.context.is_none() && self.relink {
            self.relink = false;
            debug!("Reconnecting to {} after a failed request", self.endpoint());
            self.connect().await?;
        }
        let ctx = self.context.as_mut().ok_or(TransportError::NotConnected)?;
        ctx.set_slave(Slave(unit));
        Ok(ctx)
    }

    fn map_modbus_error(&self, error: TokioModbusError) -> TransportError {
        match error {
            TokioModbusError::Transport(io_error) => match io_error.kind() {
                ErrorKind::TimedOut => TransportError::Timeout(self.timeout),
                ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted => {
                    TransportError::Unreachable(format!("{}: link closed: {}", self.endpoint(), io_error))
                },
                _ => TransportError::Unreachable(format!("{}: {}", self.endpoint(), io_error)),
            },
            TokioModbusError::Protocol(protocol_error) => TransportError::Unreachable(format!(
                "{}: protocol error: {:?}",
                self.endpoint(),
                protocol_error
            )),
        }
    }

    fn exception_code(exception: tokio_modbus::ExceptionCode) -> ExceptionCode {
        use tokio_modbus::ExceptionCode as Wire;
        let code = match exception {
            Wire::IllegalFunction => 0x01,
            Wire::IllegalDataAddress => 0x02,
            Wire::IllegalDataValue => 0x03,
            Wire::ServerDeviceFailure => 0x04,
            Wire::Acknowledge => 0x05,
            Wire::ServerDeviceBusy => 0x06,
            Wire::MemoryParityError => 0x08,
            Wire::GatewayPathUnavailable => 0x0A,
            Wire::GatewayTargetDevice => 0x0B,
            Wire::Custom(code) => code,
        };
        ExceptionCode(code)
    }

    /// Unwrap one timed library call
    ///
    /// A link failure drops the context so the next cycle reconnects.
    fn settle<T>(&mut self, outcome: Result<tokio_modbus::Result<T>, Elapsed>) -> TransportResult<T> {
        let result = match outcome {
            Err(_) => Err(TransportError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(self.map_modbus_error(e)),
            Ok(Ok(Err(exception))) => Err(TransportError::Exception(Self::exception_code(exception))),
            Ok(Ok(Ok(value))) => Ok(value),
        };
        if matches!(result, Err(TransportError::Unreachable(_) | TransportError::Timeout(_))) {
            self.context = None;
            self.relink = true;
        }
        result
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn connect(&mut self) -> TransportResult<()> {
        if self.context.is_some() {
            return Ok(());
        }

        let endpoint = self.endpoint();
        let stream = timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| TransportError::Unreachable(format!("{endpoint}: {e}")))?;
        stream.set_nodelay(true).ok();

        self.context = Some(tcp::attach(stream));
        info!("Connected to Modbus TCP device at {}", endpoint);
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.relink = false;
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                warn!("Error disconnecting from {}: {}", self.endpoint(), e);
            }
            debug!("Disconnected from {}", self.endpoint());
        }
        Ok(())
    }

    async fn read_input(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        let op_timeout = self.timeout;
        let ctx = self.context(unit).await?;
        let outcome = timeout(op_timeout, ctx.read_input_registers(address, count)).await;
        self.settle(outcome)
    }

    async fn read_holding(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        let op_timeout = self.timeout;
        let ctx = self.context(unit).await?;
        let outcome = timeout(op_timeout, ctx.read_holding_registers(address, count)).await;
        self.settle(outcome)
    }

    async fn write_holding(&mut self, address: u16, words: &[u16], unit: u8) -> TransportResult<()> {
        let op_timeout = self.timeout;
        let ctx = self.context(unit).await?;
        let call = async {
            if let [word] = words {
                ctx.write_single_register(address, *word).await
            } else {
                ctx.write_multiple_registers(address, words).await
            }
        };
        let outcome = timeout(op_timeout, call).await;
        self.settle(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_mapping() {
        use tokio_modbus::ExceptionCode as Wire;
        assert_eq!(TcpTransport::exception_code(Wire::IllegalDataAddress), ExceptionCode(2));
        assert_eq!(TcpTransport::exception_code(Wire::ServerDeviceBusy), ExceptionCode(6));
        assert_eq!(TcpTransport::exception_code(Wire::GatewayTargetDevice), ExceptionCode(11));

        // Codes without a named variant keep their number
        let nak = TcpTransport::exception_code(Wire::Custom(7));
        assert_eq!(nak, ExceptionCode(7));
        assert_eq!(nak.description(), "Negative Acknowledge");
        assert_eq!(
            TcpTransport::exception_code(Wire::Custom(99)).description(),
            "Unknown Exception"
        );
    }

    #[tokio::test]
    async fn test_requests_before_connect_fail() {
        let mut transport = TcpTransport::new("127.0.0.1", 502, Duration::from_millis(100));
        assert!(!transport.is_connected());
        assert_eq!(
            transport.read_input(0, 1, 1).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_unreachable() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new("127.0.0.1", port, Duration::from_millis(500));
        let err = transport.connect().await.unwrap_err();
        assert!(err.is_link_failure(), "{err}");
        assert!(!transport.is_connected());
    }
}
