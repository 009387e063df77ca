//! pollsrv: register polling service
//!
//! Polls solar inverters, data loggers, power meters and storage converters
//! over Modbus, decodes their vendor register layouts into engineering
//! values and hands them to a publisher.
//!
//! ```text
//! PollOrchestrator ──▶ RegisterClient ──▶ Transport (tcp / simulated)
//!        │                   │
//!        │                   └─ DeviceProfile + RegisterCodec
//!        ▼
//!    Publisher
//! ```
//!
//! - [`transport`]: bus boundary and its bindings
//! - [`client`]: parameter reads, writes and device identification
//! - [`orchestrator`]: fixed-interval polling of every configured device
//! - [`publisher`]: where readings go
//! - [`config`]: figment-loaded service configuration

pub mod client;
pub mod config;
pub mod fault;
pub mod orchestrator;
pub mod publisher;
pub mod retry;
pub mod transport;

pub use client::{Reading, RegisterClient};
pub use config::PollsrvConfig;
pub use fault::{Fault, FaultScope};
pub use orchestrator::{CycleReport, DeviceOutcome, DeviceStatus, PollOrchestrator};
pub use publisher::{DeviceIdentity, LogPublisher, Measurement, MemoryPublisher, Publisher};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{ExceptionCode, Transport, TransportError};
