//! Parameter descriptors

use crate::scale::Scale;
use gridpoll_codec::DataKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Register bank a parameter lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read-only bank (function code 0x04)
    Input,
    /// Read/write bank (function code 0x03 / 0x06 / 0x10)
    Holding,
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Holding => write!(f, "holding"),
        }
    }
}

/// One named, typed, scaled value in a device's register space
///
/// `address` is the 1-based address as printed in vendor documentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub address: u16,
    pub word_count: u16,
    pub kind: DataKind,
    pub register_kind: RegisterKind,
    pub scale: Scale,
    pub unit: String,
    pub device_class: String,
    /// Allowed write values in engineering units; `None` means not writable
    pub legal_values: Option<Vec<i64>>,
    /// Models this parameter exists on; `None` means every model
    pub only_models: Option<Vec<String>>,
}

impl ParameterDescriptor {
    /// Fixed-width numeric parameter; the word count follows from `kind`
    pub fn new(
        name: impl Into<String>,
        address: u16,
        kind: DataKind,
        register_kind: RegisterKind,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            word_count: kind.word_count().unwrap_or(0),
            kind,
            register_kind,
            scale: Scale::ONE,
            unit: String::new(),
            device_class: String::new(),
            legal_values: None,
            only_models: None,
        }
    }

    /// Text parameter spanning `word_count` registers
    pub fn text(
        name: impl Into<String>,
        address: u16,
        word_count: u16,
        register_kind: RegisterKind,
    ) -> Self {
        Self {
            word_count,
            device_class: "enum".to_string(),
            ..Self::new(name, address, DataKind::Text, register_kind)
        }
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = device_class.into();
        self
    }

    pub fn with_word_count(mut self, word_count: u16) -> Self {
        self.word_count = word_count;
        self
    }

    pub fn with_legal_values(mut self, values: impl IntoIterator<Item = i64>) -> Self {
        self.legal_values = Some(values.into_iter().collect());
        self
    }

    pub fn only_for_models<S: Into<String>>(mut self, models: impl IntoIterator<Item = S>) -> Self {
        self.only_models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the parameter exists on `model`
    pub fn applies_to(&self, model: &str) -> bool {
        match &self.only_models {
            Some(models) => models.iter().any(|m| m == model),
            None => true,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.register_kind == RegisterKind::Holding
    }

    /// Occupied document addresses, end exclusive
    pub fn address_range(&self) -> Range<u32> {
        let start = u32::from(self.address);
        start..start + u32::from(self.word_count)
    }
}
