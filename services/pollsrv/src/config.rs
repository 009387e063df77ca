//! pollsrv configuration
//!
//! Loaded with figment from a YAML/TOML/JSON file, then overridden by
//! `GRIDPOLL_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `GRIDPOLL_POLL_INTERVAL_SECS=5`).

use crate::retry::RetryPolicy;
use crate::transport::simulated::Bank;
use crate::transport::{SimulatedTransport, TcpTransport, Transport};
use common::{load_config_from_file, LogFormat, LoggingConfig};
use errors::{invalid_config, GridpollResult};
use gridpoll_codec::words_from_text;
use gridpoll_model::vendor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_unit_id() -> u8 {
    1
}

fn default_modbus_port() -> u16 {
    502
}

fn default_timeout_ms() -> u64 {
    3000
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollsrvConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    /// Named bus endpoints
    pub transports: BTreeMap<String, TransportConfig>,

    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name, unique and alphanumeric
    pub name: String,
    /// Vendor tag, e.g. `sungrow-inverter`
    pub manufacturer: String,
    pub serial: String,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Name of an entry in `transports`
    pub transport: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-memory register banks, for dry runs
    Simulated {
        #[serde(default)]
        registers: Vec<RegisterSeed>,
    },
    Tcp {
        host: String,
        #[serde(default = "default_modbus_port")]
        port: u16,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

/// Initial contents of a simulated register block
///
/// `address` is the 1-based document address, as in the register tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSeed {
    pub bank: Bank,
    pub address: u16,
    #[serde(default)]
    pub words: Vec<u16>,
    /// Text stored as big-endian byte pairs, NUL padded to `word_count`
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub word_count: Option<u16>,
}

impl RegisterSeed {
    fn to_words(&self) -> GridpollResult<Vec<u16>> {
        match &self.text {
            Some(text) => {
                let count = self
                    .word_count
                    .map(usize::from)
                    .unwrap_or_else(|| text.len().div_ceil(2));
                words_from_text(text, count).map_err(|e| {
                    invalid_config!(format!("registers[{}]", self.address), "{}", e)
                })
            },
            None => Ok(self.words.clone()),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self, name: &str) -> GridpollResult<()> {
        match self {
            Self::Simulated { registers } => {
                for seed in registers {
                    let field = format!("transports.{name}.registers");
                    if seed.address == 0 {
                        return Err(invalid_config!(field, "address 0; addresses are 1-based"));
                    }
                    if seed.text.is_some() == !seed.words.is_empty() {
                        return Err(invalid_config!(
                            field,
                            "seed at {} needs exactly one of words or text",
                            seed.address
                        ));
                    }
                    let words = seed.to_words()?;
                    if usize::from(seed.address - 1) + words.len() > usize::from(u16::MAX) + 1 {
                        return Err(invalid_config!(
                            field,
                            "seed at {} runs past the last register",
                            seed.address
                        ));
                    }
                }
            },
            Self::Tcp {
                host,
                port,
                timeout_ms,
            } => {
                if host.trim().is_empty() {
                    return Err(invalid_config!(format!("transports.{name}.host"), "must not be empty"));
                }
                if *port == 0 {
                    return Err(invalid_config!(format!("transports.{name}.port"), "must not be 0"));
                }
                if *timeout_ms == 0 {
                    return Err(invalid_config!(
                        format!("transports.{name}.timeout_ms"),
                        "must be greater than 0"
                    ));
                }
            },
        }
        Ok(())
    }

    /// Create a fresh, unconnected transport for one device
    pub fn build(&self, name: &str) -> GridpollResult<Box<dyn Transport>> {
        match self {
            Self::Simulated { registers } => {
                let mut input = HashMap::new();
                let mut holding = HashMap::new();
                for seed in registers {
                    let bank = match seed.bank {
                        Bank::Input => &mut input,
                        Bank::Holding => &mut holding,
                    };
                    for (offset, word) in seed.to_words()?.into_iter().enumerate() {
                        bank.insert(seed.address - 1 + offset as u16, word);
                    }
                }
                debug!(
                    "Simulated transport {}: {} input and {} holding registers seeded",
                    name,
                    input.len(),
                    holding.len()
                );
                Ok(Box::new(SimulatedTransport::with_registers(name, input, holding)))
            },
            Self::Tcp {
                host,
                port,
                timeout_ms,
            } => Ok(Box::new(TcpTransport::new(
                host.clone(),
                *port,
                Duration::from_millis(*timeout_ms),
            ))),
        }
    }
}

impl PollsrvConfig {
    /// Load and validate
    ///
    /// Nothing is logged here: loading happens before the subscriber exists.
    /// Call [`Self::log_summary`] once logging is up.
    pub fn load<P: AsRef<Path>>(path: P) -> GridpollResult<Self> {
        let config: Self = load_config_from_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self, path: &Path) {
        info!(
            "Loaded configuration from {}: {} devices, {} transports",
            path.display(),
            self.devices.len(),
            self.transports.len()
        );
        for device in &self.devices {
            debug!(
                "Device {}: {} serial {} unit {} via {}",
                device.name, device.manufacturer, device.serial, device.unit_id, device.transport
            );
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> GridpollResult<()> {
        if self.devices.is_empty() {
            return Err(invalid_config!("devices", "at least one device is required"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid_config!("poll_interval_secs", "must be greater than 0"));
        }
        self.retry.validate()?;

        for (name, transport) in &self.transports {
            transport.validate(name)?;
        }

        let mut names = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let field = |key: &str| format!("devices[{i}].{key}");

            if device.name.is_empty() || !device.name.chars().all(char::is_alphanumeric) {
                return Err(invalid_config!(
                    field("name"),
                    "'{}' must be non-empty and alphanumeric",
                    device.name
                ));
            }
            if !names.insert(device.name.as_str()) {
                return Err(invalid_config!(
                    field("name"),
                    "device name '{}' is not unique",
                    device.name
                ));
            }
            if !vendor::is_known(&device.manufacturer) {
                return Err(invalid_config!(
                    field("manufacturer"),
                    "unknown vendor '{}', expected one of {:?}",
                    device.manufacturer,
                    vendor::VENDOR_TAGS
                ));
            }
            if device.serial.trim().is_empty() {
                return Err(invalid_config!(field("serial"), "must not be empty"));
            }
            if !self.transports.contains_key(&device.transport) {
                return Err(invalid_config!(
                    field("transport"),
                    "'{}' is not a declared transport",
                    device.transport
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::GridpollError;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    const SAMPLE: &str = r#"
poll_interval_secs: 5
retry:
  max_attempts: 3
  initial_delay_ms: 100
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
  site:
    kind: tcp
    host: 192.168.1.20
devices:
  - name: inv1
    manufacturer: sungrow-inverter
    serial: A2231234567
    transport: bench
  - name: meter
    manufacturer: acrel-meter
    serial: M001
    unit_id: 2
    transport: site
"#;

    fn write_yaml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn sample() -> PollsrvConfig {
        let file = write_yaml(SAMPLE);
        load_config_from_file(file.path()).unwrap()
    }

    #[test]
    fn test_load_sample() {
        let file = write_yaml(SAMPLE);
        let config = PollsrvConfig::load(file.path()).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.devices[0].unit_id, 1);
        assert_eq!(config.devices[1].unit_id, 2);
        match &config.transports["site"] {
            TransportConfig::Tcp { port, timeout_ms, .. } => {
                assert_eq!(*port, 502);
                assert_eq!(*timeout_ms, 3000);
            },
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    #[traced_test]
    fn test_load_is_silent_until_summary() {
        let file = write_yaml(SAMPLE);
        let config = PollsrvConfig::load(file.path()).unwrap();
        assert!(!logs_contain("Loaded configuration"));

        config.log_summary(file.path());
        assert!(logs_contain("Loaded configuration"));
        assert!(logs_contain("2 devices, 2 transports"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut config = sample();
        config.devices[1].name = "inv1".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not unique"), "{err}");
    }

    #[test]
    fn test_rejects_non_alphanumeric_names() {
        let mut config = sample();
        config.devices[0].name = "inv 1".into();
        assert!(matches!(
            config.validate(),
            Err(GridpollError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_transport() {
        let mut config = sample();
        config.devices[0].transport = "nowhere".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a declared transport"), "{err}");
    }

    #[test]
    fn test_rejects_unknown_vendor_and_empty_serial() {
        let mut config = sample();
        config.devices[0].manufacturer = "huawei".into();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.devices[0].serial = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_device_list() {
        let mut config = sample();
        config.devices.clear();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_simulated_build_seeds_wire_addresses() {
        let config = sample();
        let mut transport = config.transports["bench"].build("bench").unwrap();
        transport.connect().await.unwrap();

        assert_eq!(transport.read_input(4999, 1, 1).await.unwrap(), vec![11264]);
        let serial = transport.read_input(4989, 10, 1).await.unwrap();
        assert_eq!(serial[0], u16::from_be_bytes([b'A', b'2']));
        assert_eq!(serial[9], 0);
    }

    #[test]
    fn test_seed_needs_words_or_text() {
        let transport = TransportConfig::Simulated {
            registers: vec![RegisterSeed {
                bank: Bank::Holding,
                address: 1,
                words: vec![],
                text: None,
                word_count: None,
            }],
        };
        assert!(transport.validate("bench").is_err());
    }
}
