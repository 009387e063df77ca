//! End-to-end polling tests
//!
//! Build the service from a configuration file with simulated transports and
//! check what reaches the publisher.

#![allow(clippy::disallowed_methods)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gridpoll_model::vendor::{acrel_meter, atess_pcs, sungrow_inverter};
use gridpoll_model::{DeviceProfile, Value};
use pollsrv::client::Reading;
use pollsrv::{
    DeviceOutcome, DeviceStatus, MemoryPublisher, PollOrchestrator, PollsrvConfig, RegisterClient,
    RetryPolicy,
};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const SITE: &str = r#"
poll_interval_secs: 1
retry:
  max_attempts: 1
  initial_delay_ms: 0
transports:
  bench:
    kind: simulated
    registers:
      - bank: input
        address: 4990
        text: A2231234567
        word_count: 10
      - bank: input
        address: 5000
        words: [11264]
      - bank: input
        address: 5003
        words: [2305]
      - bank: input
        address: 5011
        words: [6123, 87]
      - bank: holding
        address: 119
        words: [4998, 0]
      - bank: holding
        address: 181
        text: PCS001
        word_count: 6
      - bank: holding
        address: 81
        words: [7204]
devices:
  - name: inverter1
    manufacturer: sungrow-inverter
    serial: A2231234567
    transport: bench
  - name: inverter2
    manufacturer: sungrow-inverter
    serial: B0000000000
    transport: bench
  - name: meter1
    manufacturer: acrel-meter
    serial: DTSD0001
    transport: bench
  - name: pcs1
    manufacturer: atess-pcs
    serial: PCS001
    transport: bench
"#;

fn site_config() -> (PollsrvConfig, NamedTempFile) {
    let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
    file.write_all(SITE.as_bytes()).unwrap();
    let config = PollsrvConfig::load(file.path()).unwrap();
    (config, file)
}

async fn reading(publisher: &MemoryPublisher, device: &str, parameter: &str) -> Option<Reading> {
    publisher
        .measurements_for(device)
        .await
        .into_iter()
        .find(|m| m.parameter == parameter)
        .map(|m| m.value)
}

#[test]
fn shipped_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/pollsrv.yaml");
    let config = PollsrvConfig::load(&path).unwrap();

    assert_eq!(config.poll_interval(), Duration::from_secs(10));
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.devices.len(), 2);
}

#[tokio::test]
async fn cycle_from_config_publishes_every_device() {
    let (config, _file) = site_config();
    let publisher = MemoryPublisher::new();
    let mut orchestrator = PollOrchestrator::from_config(&config, Arc::new(publisher.clone())).unwrap();
    assert_eq!(orchestrator.device_count(), 4);

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.cycle, 1);

    assert!(matches!(report.outcome("inverter1"), Some(DeviceOutcome::Polled { .. })));
    assert_eq!(
        reading(&publisher, "inverter1", "Daily Power Yields").await,
        Some(Reading::Number(230.5))
    );
    assert_eq!(
        reading(&publisher, "inverter1", "MPPT1 Voltage").await,
        Some(Reading::Number(612.3))
    );
    assert_eq!(
        orchestrator
            .device("inverter1")
            .unwrap()
            .profile()
            .model()
            .map(|m| m.name.as_str()),
        Some("SG33CX")
    );

    assert_eq!(
        reading(&publisher, "meter1", acrel_meter::FREQUENCY).await,
        Some(Reading::Number(49.98))
    );
    assert_eq!(
        reading(&publisher, "pcs1", "PV Voltage").await,
        Some(Reading::Number(720.4))
    );
    assert_eq!(publisher.last_availability("pcs1").await, Some(true));

    // Wrong serial on the same bench: excluded, nothing published
    assert!(matches!(report.outcome("inverter2"), Some(DeviceOutcome::Excluded { .. })));
    assert!(matches!(
        orchestrator.status("inverter2"),
        Some(DeviceStatus::Excluded { .. })
    ));
    assert!(publisher.measurements_for("inverter2").await.is_empty());

    orchestrator.close_all().await;
}

#[tokio::test]
async fn excluded_device_stays_excluded() {
    let (config, _file) = site_config();
    let publisher = MemoryPublisher::new();
    let mut orchestrator = PollOrchestrator::from_config(&config, Arc::new(publisher.clone())).unwrap();

    orchestrator.run_cycle(&CancellationToken::new()).await;
    publisher.clear().await;
    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.cycle, 2);
    assert!(matches!(report.outcome("inverter2"), Some(DeviceOutcome::Excluded { .. })));
    assert!(publisher.measurements_for("inverter2").await.is_empty());
    assert!(!publisher.measurements_for("inverter1").await.is_empty());
}

#[tokio::test]
async fn write_round_trips_through_configured_transport() {
    let (config, _file) = site_config();
    let transport = config.transports["bench"].build("bench").unwrap();
    let mut client = RegisterClient::new("pcs1", transport);
    client.connect(&config.retry).await.unwrap();

    let mut profile = DeviceProfile::for_vendor(atess_pcs::TAG, 1, "PCS001").unwrap();
    let model = client.identify(&mut profile).await.unwrap();
    assert_eq!(model.name, atess_pcs::MODEL);

    client
        .write(&profile, atess_pcs::ON_OFF, Value::Unsigned(1))
        .await
        .unwrap();
    assert_eq!(
        client.read(&profile, atess_pcs::ON_OFF).await.unwrap(),
        Reading::Number(1.0)
    );

    client
        .write(&profile, atess_pcs::ON_OFF, Value::Unsigned(0))
        .await
        .unwrap();
    assert_eq!(
        client.read(&profile, atess_pcs::ON_OFF).await.unwrap(),
        Reading::Number(0.0)
    );

    client.close().await;
}

#[tokio::test]
async fn unreachable_device_recovers_on_a_later_cycle() {
    let publisher = MemoryPublisher::new();
    let mut orchestrator = PollOrchestrator::new(
        Arc::new(publisher.clone()),
        RetryPolicy::fixed(1, Duration::ZERO),
    );

    let transport = pollsrv::transport::SimulatedTransport::new("bench");
    let handle = transport.handle();
    handle
        .set_input_words(
            4990 - 1,
            &gridpoll_codec::words_from_text("A2231234567", 10).unwrap(),
        )
        .await;
    handle.set_input_words(5000 - 1, &[0x2C00]).await;
    handle.set_input_words(5003 - 1, &[100]).await;
    handle.refuse_connects(1).await;

    let profile = DeviceProfile::for_vendor(sungrow_inverter::TAG, 1, "A2231234567").unwrap();
    orchestrator.add_device("inverter1", profile, transport);

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;
    assert!(matches!(report.outcome("inverter1"), Some(DeviceOutcome::Unavailable { .. })));
    assert_eq!(orchestrator.status("inverter1"), Some(&DeviceStatus::Pending));

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;
    assert!(matches!(report.outcome("inverter1"), Some(DeviceOutcome::Polled { .. })));
    assert_eq!(orchestrator.status("inverter1"), Some(&DeviceStatus::Active));
    assert_eq!(
        reading(&publisher, "inverter1", "Daily Power Yields").await,
        Some(Reading::Number(10.0))
    );
}
