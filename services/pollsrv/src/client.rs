//! Register client
//!
//! Turns parameter names into bus transactions for one device: looks the
//! parameter up in the device profile, converts the 1-based document address
//! to the wire address, decodes with the vendor's codec config and applies
//! the scale. The client owns its transport exclusively.

use crate::fault::Fault;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use gridpoll_codec::{decode_with, encode, Value};
use gridpoll_model::{DeviceProfile, ModelInfo, ModelSource, ParameterDescriptor, RegisterKind};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Engineering value of one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl Reading {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Apply the descriptor's scale to a decoded value
///
/// Numeric results are rounded to two decimals; text passes through.
pub fn scaled_reading(parameter: &ParameterDescriptor, value: Value) -> Reading {
    match value {
        Value::Text(s) => Reading::Text(s),
        Value::Float(v) => Reading::Number(round2(v * parameter.scale.as_f64())),
        Value::Unsigned(_) | Value::Signed(_) => {
            let raw = value.as_integer().unwrap_or_default();
            Reading::Number(round2(parameter.scale.apply(raw)))
        },
    }
}

pub struct RegisterClient<T: Transport> {
    name: String,
    transport: T,
}

impl<T: Transport> RegisterClient<T> {
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connect, retrying according to `policy`
    pub async fn connect(&mut self, policy: &RetryPolicy) -> Result<(), Fault> {
        let attempts = policy.attempts();
        let endpoint = self.transport.endpoint();
        info!("Connecting {} to {}", self.name, endpoint);

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = policy.delay_after(attempt - 1);
                debug!("Waiting {:?} before connect attempt {} for {}", delay, attempt, self.name);
                tokio::time::sleep(delay).await;
            }

            match self.transport.connect().await {
                Ok(()) => {
                    info!("Connected {} to {} (attempt {}/{})", self.name, endpoint, attempt, attempts);
                    return Ok(());
                },
                Err(e) => {
                    warn!("Connect attempt {}/{} for {} failed: {}", attempt, attempts, self.name, e);
                    last_error = e.to_string();
                },
            }
        }

        error!("Connection to {} failed after {} attempts", self.name, attempts);
        Err(Fault::ConnectionExhausted {
            device: self.name.clone(),
            attempts,
            last_error,
        })
    }

    pub async fn close(&mut self) {
        info!("Closing connection for {}", self.name);
        if let Err(e) = self.transport.close().await {
            warn!("Error closing {}: {}", self.name, e);
        }
    }

    /// Read one parameter of a finalized profile as an engineering value
    pub async fn read(&mut self, profile: &DeviceProfile, name: &str) -> Result<Reading, Fault> {
        let parameter = profile
            .parameter(name)
            .map_err(|e| Fault::from_profile(name, e))?
            .ok_or_else(|| Fault::UnknownParameter {
                name: name.to_string(),
            })?;

        let value = self.read_value(profile, parameter).await?;
        let reading = scaled_reading(parameter, value);
        debug!("{} {} = {} {}", self.name, name, reading, parameter.unit);
        Ok(reading)
    }

    /// Read one parameter of the full vendor map as an exact value
    ///
    /// Works before finalize; identity and model code go through here.
    pub async fn read_setup(&mut self, profile: &DeviceProfile, name: &str) -> Result<Value, Fault> {
        let parameter = profile
            .full_map()
            .get(name)
            .ok_or_else(|| Fault::UnknownParameter {
                name: name.to_string(),
            })?;
        self.read_value(profile, parameter).await
    }

    /// Write an engineering value to a holding parameter
    ///
    /// The value must be legal for the parameter and divide evenly by its
    /// scale into a register integer.
    pub async fn write(&mut self, profile: &DeviceProfile, name: &str, value: Value) -> Result<(), Fault> {
        let parameter = profile
            .validate_write(name, &value)
            .map_err(|e| Fault::from_write(name, e))?;

        let raw = match &value {
            Value::Unsigned(_) | Value::Signed(_) => value
                .as_integer()
                .and_then(|v| parameter.scale.unapply_integer(v)),
            Value::Float(v) => parameter.scale.unapply_float(*v),
            Value::Text(_) => None,
        }
        .ok_or_else(|| Fault::EncodeUnsupported {
            name: name.to_string(),
            reason: format!("{value} is not a whole multiple of scale {}", parameter.scale),
        })?;

        let raw_value = i64::try_from(raw)
            .map(Value::Signed)
            .map_err(|_| Fault::EncodeUnsupported {
                name: name.to_string(),
                reason: format!("raw value {raw} exceeds 64 bits"),
            })?;
        let words = encode(&raw_value, parameter.kind)
            .map_err(|e| Fault::from_encode(name, e))?;

        let address = parameter.address - 1;
        info!(
            "Writing {} = {} {} to {} (address {}, raw {}, unit {})",
            name, value, parameter.unit, self.name, address, raw, profile.unit_id()
        );
        self.transport
            .write_holding(address, &words, profile.unit_id())
            .await
            .map_err(|e| self.transport_fault(name, e))
    }

    /// Verify the serial, determine the model and finalize the profile
    ///
    /// Devices without a serial register skip verification. An already
    /// finalized profile is returned as is.
    pub async fn identify(&mut self, profile: &mut DeviceProfile) -> Result<ModelInfo, Fault> {
        if let Some(model) = profile.model() {
            return Ok(model.clone());
        }

        match profile.spec().serial_parameter {
            Some(serial_parameter) => {
                let serial = match self.read_setup(profile, serial_parameter).await? {
                    Value::Text(s) => s,
                    other => other.to_string(),
                };
                profile
                    .verify_identity(&serial)
                    .map_err(|e| Fault::from_identity(&self.name, e))?;
                info!("Serial number of {} verified: {}", self.name, profile.declared_serial());
            },
            None => debug!("{} has no serial register; identity not verified", self.name),
        }

        let model = match profile.spec().models {
            ModelSource::Fixed(model) => ModelInfo::fixed(model),
            ModelSource::Table { parameter, .. } => {
                let code = self
                    .read_setup(profile, parameter)
                    .await?
                    .as_integer()
                    .and_then(|c| u16::try_from(c).ok())
                    .ok_or_else(|| Fault::Precondition {
                        name: parameter.to_string(),
                        reason: "model code is not a 16-bit integer".to_string(),
                    })?;
                debug!("{} reports type code 0x{:04X}", self.name, code);
                profile.resolve_model(code).map_err(|e| Fault::UnknownModel {
                    device: self.name.clone(),
                    source: e,
                })?
            },
        };

        profile
            .finalize(model.clone())
            .map_err(|e| Fault::from_profile(&self.name, e))?;
        Ok(model)
    }

    /// Probe the device's liveness register; only transport success matters
    pub async fn check_liveness(&mut self, profile: &DeviceProfile) -> Result<(), Fault> {
        let name = profile.spec().liveness_parameter;
        let parameter = profile
            .full_map()
            .get(name)
            .ok_or_else(|| Fault::UnknownParameter {
                name: name.to_string(),
            })?;
        self.read_words(profile, parameter).await.map(|_| ())
    }

    async fn read_value(&mut self, profile: &DeviceProfile, parameter: &ParameterDescriptor) -> Result<Value, Fault> {
        let words = self.read_words(profile, parameter).await?;
        decode_with(&words, parameter.kind, profile.codec_config()).map_err(|e| Fault::DecodeFailure {
            name: parameter.name.clone(),
            source: e,
        })
    }

    async fn read_words(&mut self, profile: &DeviceProfile, parameter: &ParameterDescriptor) -> Result<Vec<u16>, Fault> {
        // Register tables reject address 0, so this cannot underflow
        let address = parameter.address - 1;
        let count = parameter.word_count;
        let unit = profile.unit_id();
        debug!(
            "Reading {} ({} {}) from address {} count {} unit {}",
            parameter.name, parameter.register_kind, parameter.kind, address, count, unit
        );

        let result = match parameter.register_kind {
            RegisterKind::Input => self.transport.read_input(address, count, unit).await,
            RegisterKind::Holding => self.transport.read_holding(address, count, unit).await,
        };
        result.map_err(|e| self.transport_fault(&parameter.name, e))
    }

    fn transport_fault(&self, name: &str, err: crate::transport::TransportError) -> Fault {
        let fault = Fault::from_transport(name, err);
        if let Fault::ProtocolException { code, .. } = &fault {
            error!("Modbus exception code {} from {}: {}", code.0, self.name, code.description());
        }
        fault
    }
}
