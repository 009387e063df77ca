//! Poll orchestrator
//!
//! One [`DeviceWorker`] per configured device. A cycle polls every device
//! concurrently; within a device, parameters are read one after another.
//!
//! Per device and cycle:
//! 1. excluded devices are skipped
//! 2. connect if needed (exhaustion: unavailable this cycle)
//! 3. identify if not yet identified (mismatch or unknown model: excluded)
//! 4. liveness probe (failure: unavailable, link dropped)
//! 5. read and publish every active parameter, checking for shutdown in between

use crate::client::RegisterClient;
use crate::config::PollsrvConfig;
use crate::fault::{Fault, FaultScope};
use crate::publisher::{DeviceIdentity, Measurement, Publisher};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use errors::{config_error, GridpollResult};
use futures::future::join_all;
use gridpoll_model::DeviceProfile;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Not yet identified
    Pending,
    Active,
    /// Permanently removed from polling
    Excluded { reason: String },
}

/// What happened to one device in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Polled { read: usize, failed: usize },
    /// Shutdown was requested part way through the device's parameters
    Interrupted { read: usize, failed: usize },
    /// Retried next cycle
    Unavailable { reason: String },
    Excluded { reason: String },
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub device: String,
    pub outcome: DeviceOutcome,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub devices: Vec<DeviceReport>,
}

impl CycleReport {
    pub fn outcome(&self, device: &str) -> Option<&DeviceOutcome> {
        self.devices
            .iter()
            .find(|r| r.device == device)
            .map(|r| &r.outcome)
    }

    pub fn readings(&self) -> usize {
        self.devices
            .iter()
            .map(|r| match r.outcome {
                DeviceOutcome::Polled { read, .. } | DeviceOutcome::Interrupted { read, .. } => read,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.devices
            .iter()
            .map(|r| match r.outcome {
                DeviceOutcome::Polled { failed, .. } | DeviceOutcome::Interrupted { failed, .. } => failed,
                _ => 0,
            })
            .sum()
    }

    pub fn unavailable(&self) -> usize {
        self.devices
            .iter()
            .filter(|r| matches!(r.outcome, DeviceOutcome::Unavailable { .. }))
            .count()
    }
}

// ============================================================================
// DeviceWorker
// ============================================================================

pub struct DeviceWorker<T: Transport> {
    name: String,
    client: RegisterClient<T>,
    profile: DeviceProfile,
    status: DeviceStatus,
}

impl<T: Transport> DeviceWorker<T> {
    pub fn new(name: impl Into<String>, profile: DeviceProfile, transport: T) -> Self {
        let name = name.into();
        Self {
            client: RegisterClient::new(name.clone(), transport),
            name,
            profile,
            status: DeviceStatus::Pending,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn client_mut(&mut self) -> &mut RegisterClient<T> {
        &mut self.client
    }

    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            name: self.name.clone(),
            manufacturer: self.profile.manufacturer().to_string(),
            model: self.profile.model().map(|m| m.name.clone()),
            serial: self.profile.declared_serial().to_string(),
        }
    }

    async fn announce(&self, publisher: &dyn Publisher, available: bool) {
        if let Err(e) = publisher.publish_availability(&self.identity(), available).await {
            warn!("Failed to publish availability of {}: {}", self.name, e);
        }
    }

    async fn unavailable(&mut self, publisher: &dyn Publisher, fault: &Fault, drop_link: bool) -> DeviceOutcome {
        warn!("Device {} unavailable this cycle: {}", self.name, fault);
        if drop_link {
            self.client.close().await;
        }
        self.announce(publisher, false).await;
        DeviceOutcome::Unavailable {
            reason: fault.to_string(),
        }
    }

    async fn poll(
        &mut self,
        publisher: &dyn Publisher,
        retry: &RetryPolicy,
        shutdown: &CancellationToken,
    ) -> DeviceOutcome {
        if let DeviceStatus::Excluded { reason } = &self.status {
            debug!("Skipping excluded device {}", self.name);
            return DeviceOutcome::Excluded {
                reason: reason.clone(),
            };
        }

        if !self.client.is_connected() {
            let connected = tokio::select! {
                _ = shutdown.cancelled() => {
                    return DeviceOutcome::Interrupted { read: 0, failed: 0 };
                },
                result = self.client.connect(retry) => result,
            };
            if let Err(fault) = connected {
                return self.unavailable(publisher, &fault, false).await;
            }
        }

        if !self.profile.is_finalized() {
            match self.client.identify(&mut self.profile).await {
                Ok(model) => {
                    info!(
                        "Device {} identified as {} {}",
                        self.name,
                        self.profile.manufacturer(),
                        model.name
                    );
                    self.status = DeviceStatus::Active;
                },
                Err(fault) if fault.scope() == FaultScope::Device => {
                    error!("Excluding device {} from polling: {}", self.name, fault);
                    self.status = DeviceStatus::Excluded {
                        reason: fault.to_string(),
                    };
                    self.client.close().await;
                    self.announce(publisher, false).await;
                    return DeviceOutcome::Excluded {
                        reason: fault.to_string(),
                    };
                },
                Err(fault) => {
                    let drop_link = fault.is_transport();
                    return self.unavailable(publisher, &fault, drop_link).await;
                },
            }
        }

        if let Err(fault) = self.client.check_liveness(&self.profile).await {
            return self.unavailable(publisher, &fault, true).await;
        }
        self.announce(publisher, true).await;

        let parameters = match self.profile.parameters() {
            Ok(map) => map,
            Err(e) => {
                let fault = Fault::from_profile(&self.name, e);
                return self.unavailable(publisher, &fault, false).await;
            },
        };

        let (mut read, mut failed) = (0, 0);
        for parameter in parameters {
            if shutdown.is_cancelled() {
                info!("Shutdown requested; stopping {} after {} parameters", self.name, read + failed);
                return DeviceOutcome::Interrupted { read, failed };
            }

            match self.client.read(&self.profile, &parameter.name).await {
                Ok(value) => {
                    let measurement = Measurement {
                        device: self.identity(),
                        parameter: parameter.name.clone(),
                        value,
                        unit: parameter.unit.clone(),
                        device_class: parameter.device_class.clone(),
                        timestamp: Utc::now(),
                    };
                    if let Err(e) = publisher.publish(&measurement).await {
                        warn!("Failed to publish {} of {}: {}", parameter.name, self.name, e);
                    }
                    read += 1;
                },
                Err(fault) => {
                    warn!("Device {}: {}", self.name, fault);
                    failed += 1;
                },
            }
        }

        DeviceOutcome::Polled { read, failed }
    }
}

// ============================================================================
// PollOrchestrator
// ============================================================================

pub struct PollOrchestrator<T: Transport> {
    workers: Vec<DeviceWorker<T>>,
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
    cycles: u64,
}

impl<T: Transport> PollOrchestrator<T> {
    pub fn new(publisher: Arc<dyn Publisher>, retry: RetryPolicy) -> Self {
        Self {
            workers: Vec::new(),
            publisher,
            retry,
            cycles: 0,
        }
    }

    pub fn add_device(&mut self, name: impl Into<String>, profile: DeviceProfile, transport: T) {
        self.workers.push(DeviceWorker::new(name, profile, transport));
    }

    pub fn device(&self, name: &str) -> Option<&DeviceWorker<T>> {
        self.workers.iter().find(|w| w.name == name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut DeviceWorker<T>> {
        self.workers.iter_mut().find(|w| w.name == name)
    }

    pub fn status(&self, name: &str) -> Option<&DeviceStatus> {
        self.device(name).map(DeviceWorker::status)
    }

    pub fn device_count(&self) -> usize {
        self.workers.len()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Poll every device once, concurrently
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleReport {
        self.cycles += 1;
        let started_at = Utc::now();
        let publisher = self.publisher.as_ref();
        let retry = &self.retry;

        let outcomes = join_all(
            self.workers
                .iter_mut()
                .map(|worker| worker.poll(publisher, retry, shutdown)),
        )
        .await;

        let devices = self
            .workers
            .iter()
            .zip(outcomes)
            .map(|(worker, outcome)| DeviceReport {
                device: worker.name.clone(),
                outcome,
            })
            .collect();

        CycleReport {
            cycle: self.cycles,
            started_at,
            devices,
        }
    }

    /// Fixed-interval driver; returns the number of cycles run
    ///
    /// A cycle that overruns the interval delays the next tick rather than
    /// queueing a burst of catch-up cycles.
    pub async fn run(&mut self, interval: Duration, shutdown: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Polling started for {} devices, interval {}ms",
            self.workers.len(),
            interval.as_millis()
        );

        let mut completed = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let report = self.run_cycle(&shutdown).await;
            completed += 1;
            info!(
                "Poll cycle {} finished: {} readings, {} faults, {} devices unavailable",
                report.cycle,
                report.readings(),
                report.failures(),
                report.unavailable()
            );

            if shutdown.is_cancelled() {
                break;
            }
        }

        self.close_all().await;
        info!("Polling stopped after {} cycles", completed);
        completed
    }

    pub async fn close_all(&mut self) {
        for worker in &mut self.workers {
            if worker.client.is_connected() {
                worker.client.close().await;
            }
        }
    }
}

impl PollOrchestrator<Box<dyn Transport>> {
    /// One worker per configured device, each with its own transport instance
    pub fn from_config(config: &PollsrvConfig, publisher: Arc<dyn Publisher>) -> GridpollResult<Self> {
        let mut orchestrator = Self::new(publisher, config.retry.clone());

        for device in &config.devices {
            let transport_config = config.transports.get(&device.transport).ok_or_else(|| {
                config_error!("device {} references unknown transport {}", device.name, device.transport)
            })?;
            let profile = DeviceProfile::for_vendor(&device.manufacturer, device.unit_id, device.serial.as_str())
                .map_err(|e| config_error!("device {}: {}", device.name, e))?;
            let transport = transport_config.build(&device.transport)?;

            info!(
                "Device {}: {} unit {} via {} ({})",
                device.name,
                profile.manufacturer(),
                device.unit_id,
                device.transport,
                transport.endpoint()
            );
            orchestrator.add_device(device.name.clone(), profile, transport);
        }

        Ok(orchestrator)
    }
}
