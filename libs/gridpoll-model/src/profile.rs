//! Device profiles
//!
//! A profile starts `Unidentified`: only the full vendor map is available,
//! for reading the serial and model code. [`DeviceProfile::finalize`] narrows
//! the map to the identified model and appends its channel groups. It is
//! one-shot.

use crate::descriptor::ParameterDescriptor;
use crate::error::{IdentityError, ProfileError, UnknownModelError, WriteError};
use crate::register_map::RegisterMap;
use crate::vendor::{self, ModelEntry, ModelSource, VendorSpec};
use gridpoll_codec::{CodecConfig, Value};
use serde::Serialize;
use tracing::{debug, info};

/// Identified model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    /// Code read from the device, `None` for fixed-model vendors
    pub type_code: Option<u16>,
    pub channels: u16,
}

impl ModelInfo {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_code: None,
            channels: 0,
        }
    }
}

impl From<&ModelEntry> for ModelInfo {
    fn from(entry: &ModelEntry) -> Self {
        Self {
            name: entry.name.to_string(),
            type_code: Some(entry.type_code),
            channels: entry.channels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Unidentified,
    Finalized,
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    unit_id: u8,
    declared_serial: String,
    spec: VendorSpec,
    model: Option<ModelInfo>,
    active: Option<RegisterMap>,
}

impl DeviceProfile {
    /// Rejects an empty declared serial so identity is never checked against nothing
    pub fn new(
        spec: VendorSpec,
        unit_id: u8,
        declared_serial: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        let declared_serial = declared_serial.into().trim().to_string();
        if declared_serial.is_empty() {
            return Err(ProfileError::EmptySerial);
        }
        Ok(Self {
            unit_id,
            declared_serial,
            spec,
            model: None,
            active: None,
        })
    }

    /// Profile for a built-in vendor tag
    pub fn for_vendor(
        tag: &str,
        unit_id: u8,
        declared_serial: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        Self::new(vendor::lookup(tag)?, unit_id, declared_serial)
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn manufacturer(&self) -> &str {
        self.spec.manufacturer
    }

    pub fn vendor_tag(&self) -> &str {
        self.spec.tag
    }

    pub fn declared_serial(&self) -> &str {
        &self.declared_serial
    }

    pub fn spec(&self) -> &VendorSpec {
        &self.spec
    }

    pub fn codec_config(&self) -> &CodecConfig {
        &self.spec.codec
    }

    pub fn model(&self) -> Option<&ModelInfo> {
        self.model.as_ref()
    }

    pub fn state(&self) -> ProfileState {
        if self.active.is_some() {
            ProfileState::Finalized
        } else {
            ProfileState::Unidentified
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state() == ProfileState::Finalized
    }

    /// Unnarrowed vendor map, valid in any state
    pub fn full_map(&self) -> &RegisterMap {
        &self.spec.registers
    }

    /// Compare the serial read from the bus with the declared one
    ///
    /// Surrounding whitespace and NUL padding on the bus value are ignored.
    pub fn verify_identity(&self, serial_read: &str) -> Result<(), IdentityError> {
        let actual = serial_read.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if actual == self.declared_serial {
            Ok(())
        } else {
            Err(IdentityError::Mismatch {
                expected: self.declared_serial.clone(),
                actual: actual.to_string(),
            })
        }
    }

    /// Map a device type code to a supported model
    ///
    /// Fixed-model vendors ignore the code.
    pub fn resolve_model(&self, type_code: u16) -> Result<ModelInfo, UnknownModelError> {
        match self.spec.models {
            ModelSource::Table { models, .. } => models
                .iter()
                .find(|m| m.type_code == type_code)
                .map(ModelInfo::from)
                .ok_or_else(|| UnknownModelError {
                    manufacturer: self.spec.manufacturer.to_string(),
                    type_code,
                }),
            ModelSource::Fixed(name) => Ok(ModelInfo::fixed(name)),
        }
    }

    /// The model of a fixed-model vendor, `None` when it must be read
    pub fn fixed_model(&self) -> Option<ModelInfo> {
        match self.spec.models {
            ModelSource::Fixed(name) => Some(ModelInfo::fixed(name)),
            ModelSource::Table { .. } => None,
        }
    }

    /// Narrow the map to `model` and append its channel groups
    pub fn finalize(&mut self, model: ModelInfo) -> Result<(), ProfileError> {
        if self.active.is_some() {
            return Err(ProfileError::AlreadyFinalized);
        }

        let narrowed = self.spec.registers.subset_for_model(&model.name);
        let active = match &self.spec.channels {
            Some(template) if model.channels > 0 => {
                let group =
                    template
                        .expand(model.channels)
                        .ok_or_else(|| ProfileError::TooManyChannels {
                            model: model.name.clone(),
                            requested: model.channels,
                            available: template.bases.len(),
                        })?;
                narrowed.extended(group)?
            },
            _ => narrowed,
        };

        info!(
            "Device {} (unit {}) identified as {} {}: {} of {} parameters active",
            self.declared_serial,
            self.unit_id,
            self.spec.manufacturer,
            model.name,
            active.len(),
            self.spec.registers.len()
        );
        debug!("Active parameters: {:?}", active.names().collect::<Vec<_>>());

        self.model = Some(model);
        self.active = Some(active);
        Ok(())
    }

    /// Narrowed map; only available after finalize
    pub fn parameters(&self) -> Result<&RegisterMap, ProfileError> {
        self.active.as_ref().ok_or(ProfileError::NotFinalized)
    }

    pub fn parameter(&self, name: &str) -> Result<Option<&ParameterDescriptor>, ProfileError> {
        Ok(self.parameters()?.get(name))
    }

    /// Check a write request against the finalized map
    ///
    /// The parameter must exist, be a holding register, and list `value`
    /// among its legal values. A parameter without a legal-value table is
    /// not writable.
    pub fn validate_write(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<&ParameterDescriptor, WriteError> {
        let parameter = self
            .parameters()?
            .get(name)
            .ok_or_else(|| WriteError::UnknownParameter(name.to_string()))?;

        if !parameter.is_holding() {
            return Err(WriteError::NotWritable {
                name: name.to_string(),
                register_kind: parameter.register_kind,
            });
        }

        let legal = parameter
            .legal_values
            .as_ref()
            .ok_or_else(|| WriteError::NoLegalValues(name.to_string()))?;

        let allowed = match value {
            Value::Unsigned(_) | Value::Signed(_) => value
                .as_integer()
                .is_some_and(|v| legal.iter().any(|&l| i128::from(l) == v)),
            Value::Float(v) => legal.iter().any(|&l| l as f64 == *v),
            Value::Text(_) => false,
        };

        if !allowed {
            return Err(WriteError::IllegalValue {
                name: name.to_string(),
                value: value.to_string(),
                allowed: legal.clone(),
            });
        }

        Ok(parameter)
    }
}
