//! Modbus TCP binding against a minimal in-process device
//!
//! The device answers holding/input reads from a fixed register table and
//! never answers reads starting at one chosen address.

#![allow(clippy::disallowed_methods)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridpoll_codec::words_from_text;
use gridpoll_model::vendor::atess_pcs;
use gridpoll_model::DeviceProfile;
use pollsrv::client::Reading;
use pollsrv::transport::TcpTransport;
use pollsrv::{DeviceOutcome, MemoryPublisher, PollOrchestrator, RetryPolicy, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_millis(200);

/// Battery Voltage, documented 81, wire 81
const SILENT: u16 = 81;

struct FakeDevice {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl FakeDevice {
    async fn start(holding: HashMap<u16, u16>, silent: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let registers = Arc::new(holding);

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, registers.clone(), silent));
            }
        });

        Self { addr, accepted }
    }

    fn transport(&self) -> TcpTransport {
        TcpTransport::new("127.0.0.1", self.addr.port(), TIMEOUT)
    }

    fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, registers: Arc<HashMap<u16, u16>>, silent: u16) {
    let mut header = [0u8; 7];
    while stream.read_exact(&mut header).await.is_ok() {
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut pdu = vec![0u8; length.saturating_sub(1)];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let function = pdu[0];
        let address = u16::from_be_bytes([pdu[1], pdu[2]]);
        let reply = match function {
            0x03 | 0x04 => {
                if address == silent {
                    continue;
                }
                let count = u16::from_be_bytes([pdu[3], pdu[4]]);
                let mut body = vec![function, (count * 2) as u8];
                for offset in 0..count {
                    let word = registers.get(&(address + offset)).copied().unwrap_or(0);
                    body.extend_from_slice(&word.to_be_bytes());
                }
                body
            },
            0x06 => pdu.clone(),
            _ => vec![function | 0x80, 0x01],
        };

        let mut frame = Vec::with_capacity(7 + reply.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn pcs_registers() -> HashMap<u16, u16> {
    let mut registers = HashMap::new();
    for (offset, word) in words_from_text("PCS001", 6).unwrap().into_iter().enumerate() {
        registers.insert(180 + offset as u16, word);
    }
    registers.insert(80, 7204);
    registers.insert(82, 125);
    registers
}

#[tokio::test]
async fn timed_out_request_reconnects_for_the_next_one() {
    let device = FakeDevice::start(pcs_registers(), SILENT).await;
    let mut transport = device.transport();
    transport.connect().await.unwrap();

    assert_eq!(transport.read_holding(80, 1, 1).await.unwrap(), vec![7204]);
    assert_eq!(
        transport.read_holding(SILENT, 1, 1).await,
        Err(TransportError::Timeout(TIMEOUT))
    );
    assert!(!transport.is_connected());

    assert_eq!(transport.read_holding(82, 1, 1).await.unwrap(), vec![125]);
    assert!(transport.is_connected());
    assert_eq!(device.connections(), 2);
}

#[tokio::test]
async fn closed_transport_does_not_reconnect() {
    let device = FakeDevice::start(pcs_registers(), SILENT).await;
    let mut transport = device.transport();
    transport.connect().await.unwrap();
    let _ = transport.read_holding(SILENT, 1, 1).await;
    transport.close().await.unwrap();

    assert_eq!(
        transport.read_holding(80, 1, 1).await,
        Err(TransportError::NotConnected)
    );
    assert_eq!(device.connections(), 1);
}

#[tokio::test]
async fn silent_register_fails_only_itself() {
    let device = FakeDevice::start(pcs_registers(), SILENT).await;
    let publisher = MemoryPublisher::new();
    let mut orchestrator = PollOrchestrator::new(
        Arc::new(publisher.clone()),
        RetryPolicy::fixed(1, Duration::ZERO),
    );
    let profile = DeviceProfile::for_vendor(atess_pcs::TAG, 1, "PCS001").unwrap();
    orchestrator.add_device("pcs1", profile, device.transport());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;
    assert_eq!(
        report.outcome("pcs1"),
        Some(&DeviceOutcome::Polled { read: 17, failed: 1 })
    );

    let published: Vec<String> = publisher
        .measurements_for("pcs1")
        .await
        .into_iter()
        .map(|m| m.parameter)
        .collect();
    assert!(!published.iter().any(|p| p == "Battery Voltage"));
    assert!(published.iter().any(|p| p == "Battery Current"));

    let pv = publisher
        .measurements_for("pcs1")
        .await
        .into_iter()
        .find(|m| m.parameter == "PV Voltage")
        .unwrap();
    assert_eq!(pv.value, Reading::Number(720.4));

    orchestrator.close_all().await;
}
