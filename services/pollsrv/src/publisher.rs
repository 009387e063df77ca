//! Publisher boundary
//!
//! Where measurements and availability go once they are read. The service
//! ships a structured-log publisher; tests use the recording one.

use crate::client::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Publish failed: {0}")]
pub struct PublishError(pub String);

/// Who a measurement belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Configured device name
    pub name: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub device: DeviceIdentity,
    /// Logical parameter name
    pub parameter: String,
    pub value: Reading,
    pub unit: String,
    pub device_class: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError>;

    async fn publish_availability(&self, device: &DeviceIdentity, available: bool) -> Result<(), PublishError>;
}

/// Publishes through `tracing`, one event per measurement
#[derive(Debug, Default)]
pub struct LogPublisher {
    json: bool,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit each measurement as a single JSON document
    pub fn json() -> Self {
        Self { json: true }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        if self.json {
            let payload = serde_json::to_string(measurement).map_err(|e| PublishError(e.to_string()))?;
            info!(target: "pollsrv::publish", "{}", payload);
        } else {
            info!(
                target: "pollsrv::publish",
                device = %measurement.device.name,
                class = %measurement.device_class,
                "{} = {} {}",
                measurement.parameter,
                measurement.value,
                measurement.unit
            );
        }
        Ok(())
    }

    async fn publish_availability(&self, device: &DeviceIdentity, available: bool) -> Result<(), PublishError> {
        info!(
            target: "pollsrv::publish",
            device = %device.name,
            "{} {}",
            device.name,
            if available { "online" } else { "offline" }
        );
        Ok(())
    }
}

/// Records everything it is given
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    measurements: Arc<Mutex<Vec<Measurement>>>,
    availability: Arc<Mutex<Vec<(String, bool)>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn measurements(&self) -> Vec<Measurement> {
        self.measurements.lock().await.clone()
    }

    /// Measurements of one device, in publish order
    pub async fn measurements_for(&self, device: &str) -> Vec<Measurement> {
        self.measurements
            .lock()
            .await
            .iter()
            .filter(|m| m.device.name == device)
            .cloned()
            .collect()
    }

    pub async fn availability(&self) -> Vec<(String, bool)> {
        self.availability.lock().await.clone()
    }

    /// Last availability published for `device`
    pub async fn last_availability(&self, device: &str) -> Option<bool> {
        self.availability
            .lock()
            .await
            .iter()
            .rev()
            .find(|(name, _)| name == device)
            .map(|(_, available)| *available)
    }

    pub async fn clear(&self) {
        self.measurements.lock().await.clear();
        self.availability.lock().await.clear();
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        self.measurements.lock().await.push(measurement.clone());
        Ok(())
    }

    async fn publish_availability(&self, device: &DeviceIdentity, available: bool) -> Result<(), PublishError> {
        self.availability
            .lock()
            .await
            .push((device.name.clone(), available));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            name: "meter".into(),
            manufacturer: "Acrel".into(),
            model: Some("DTSD1352".into()),
            serial: "M001".into(),
        }
    }

    fn measurement() -> Measurement {
        Measurement {
            device: identity(),
            parameter: "Grid Frequency".into(),
            value: Reading::Number(50.01),
            unit: "Hz".into(),
            device_class: "frequency".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_publisher_records() {
        let publisher = MemoryPublisher::new();
        publisher.publish(&measurement()).await.unwrap();
        publisher.publish_availability(&identity(), true).await.unwrap();
        publisher.publish_availability(&identity(), false).await.unwrap();

        assert_eq!(publisher.measurements_for("meter").await.len(), 1);
        assert!(publisher.measurements_for("other").await.is_empty());
        assert_eq!(publisher.last_availability("meter").await, Some(false));
        assert_eq!(publisher.availability().await.len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_log_publisher_emits_values() {
        LogPublisher::new().publish(&measurement()).await.unwrap();
        assert!(logs_contain("Grid Frequency = 50.01 Hz"));

        LogPublisher::json().publish(&measurement()).await.unwrap();
        assert!(logs_contain("\"parameter\":\"Grid Frequency\""));
    }

    #[test]
    fn test_measurement_serializes_plain_value() {
        let json = serde_json::to_value(measurement()).unwrap();
        assert_eq!(json["value"], serde_json::json!(50.01));
        assert_eq!(json["device"]["model"], "DTSD1352");
    }
}
