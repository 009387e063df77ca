//! Immutable, ordered register tables
//!
//! A map is built once through [`RegisterMapBuilder`] and never edited in
//! place. Narrowing for a model or appending channel groups produces a new
//! map. Iteration order is insertion order, which is also publish order.

use crate::descriptor::{ParameterDescriptor, RegisterKind};
use crate::error::MapError;
use gridpoll_codec::DataKind;
use std::collections::HashMap;
use tracing::warn;

/// Two parameters sharing at least one register in the same bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub first: String,
    pub second: String,
    pub register_kind: RegisterKind,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    parameters: Vec<ParameterDescriptor>,
    index: HashMap<String, usize>,
    overlaps: Vec<Overlap>,
}

#[derive(Debug, Default)]
pub struct RegisterMapBuilder {
    parameters: Vec<ParameterDescriptor>,
    deny_overlaps: bool,
}

impl RegisterMapBuilder {
    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = ParameterDescriptor>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Treat overlapping address ranges as a construction error
    pub fn deny_overlaps(mut self) -> Self {
        self.deny_overlaps = true;
        self
    }

    pub fn build(self) -> Result<RegisterMap, MapError> {
        let mut index = HashMap::with_capacity(self.parameters.len());
        for (i, p) in self.parameters.iter().enumerate() {
            validate_descriptor(p)?;
            if index.insert(p.name.clone(), i).is_some() {
                return Err(MapError::DuplicateName(p.name.clone()));
            }
        }

        let overlaps = find_overlaps(&self.parameters);
        if let Some(first) = overlaps.first() {
            if self.deny_overlaps {
                return Err(MapError::Overlap {
                    first: first.first.clone(),
                    second: first.second.clone(),
                    register_kind: first.register_kind,
                });
            }
        }
        for o in &overlaps {
            warn!(
                "Register overlap in {} bank: '{}' and '{}' share addresses",
                o.register_kind, o.first, o.second
            );
        }

        Ok(RegisterMap {
            parameters: self.parameters,
            index,
            overlaps,
        })
    }
}

impl RegisterMap {
    pub fn builder() -> RegisterMapBuilder {
        RegisterMapBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.index.get(name).map(|&i| &self.parameters[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Overlapping parameter pairs found at construction
    pub fn overlaps(&self) -> &[Overlap] {
        &self.overlaps
    }

    /// Parameters that exist on `model`, in the original order
    pub fn subset_for_model(&self, model: &str) -> RegisterMap {
        let parameters: Vec<ParameterDescriptor> = self
            .parameters
            .iter()
            .filter(|p| p.applies_to(model))
            .cloned()
            .collect();
        let index: HashMap<String, usize> = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let overlaps = self
            .overlaps
            .iter()
            .filter(|o| index.contains_key(&o.first) && index.contains_key(&o.second))
            .cloned()
            .collect();
        RegisterMap {
            parameters,
            index,
            overlaps,
        }
    }

    /// New map with `extra` appended after the existing parameters
    pub fn extended(
        &self,
        extra: impl IntoIterator<Item = ParameterDescriptor>,
    ) -> Result<RegisterMap, MapError> {
        RegisterMap::builder()
            .parameters(self.parameters.iter().cloned())
            .parameters(extra)
            .build()
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a ParameterDescriptor;
    type IntoIter = std::slice::Iter<'a, ParameterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

fn validate_descriptor(p: &ParameterDescriptor) -> Result<(), MapError> {
    if p.address == 0 {
        return Err(MapError::ZeroAddress(p.name.clone()));
    }

    match p.kind.word_count() {
        Some(expected) if expected != p.word_count => {
            return Err(MapError::WordCountMismatch {
                name: p.name.clone(),
                kind: p.kind,
                expected,
                actual: p.word_count,
            });
        },
        None if p.kind == DataKind::Text && p.word_count == 0 => {
            return Err(MapError::EmptyText(p.name.clone()));
        },
        _ => {},
    }

    // Last occupied address must still be addressable
    if p.address_range().end - 1 > u32::from(u16::MAX) {
        return Err(MapError::AddressOverflow(p.name.clone()));
    }

    Ok(())
}

fn find_overlaps(parameters: &[ParameterDescriptor]) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (i, a) in parameters.iter().enumerate() {
        let ra = a.address_range();
        for b in &parameters[i + 1..] {
            if a.register_kind != b.register_kind {
                continue;
            }
            let rb = b.address_range();
            if ra.start < rb.end && rb.start < ra.end {
                overlaps.push(Overlap {
                    first: a.name.clone(),
                    second: b.name.clone(),
                    register_kind: a.register_kind,
                });
            }
        }
    }
    overlaps
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn u16_param(name: &str, address: u16) -> ParameterDescriptor {
        ParameterDescriptor::new(name, address, DataKind::U16, RegisterKind::Input)
    }

    #[test]
    fn test_insertion_order_preserved() {
        let map = RegisterMap::builder()
            .parameter(u16_param("c", 30))
            .parameter(u16_param("a", 10))
            .parameter(u16_param("b", 20))
            .build()
            .unwrap();
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert_eq!(map.get("a").unwrap().address, 10);
        assert!(map.get("z").is_none());
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = RegisterMap::builder()
            .parameter(u16_param("a", 1))
            .parameter(u16_param("a", 2))
            .build()
            .unwrap_err();
        assert_eq!(err, MapError::DuplicateName("a".into()));
    }

    #[test]
    fn test_zero_address_rejected() {
        let err = RegisterMap::builder()
            .parameter(u16_param("a", 0))
            .build()
            .unwrap_err();
        assert_eq!(err, MapError::ZeroAddress("a".into()));
    }

    #[test]
    fn test_word_count_mismatch_rejected() {
        let p = ParameterDescriptor::new("p", 5, DataKind::U32, RegisterKind::Holding).with_word_count(1);
        let err = RegisterMap::builder().parameter(p).build().unwrap_err();
        assert!(matches!(err, MapError::WordCountMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_empty_text_rejected() {
        let p = ParameterDescriptor::text("s", 5, 0, RegisterKind::Input);
        let err = RegisterMap::builder().parameter(p).build().unwrap_err();
        assert_eq!(err, MapError::EmptyText("s".into()));
    }

    #[test]
    fn test_address_overflow_rejected() {
        let p = ParameterDescriptor::new("p", 65535, DataKind::U32, RegisterKind::Input);
        let err = RegisterMap::builder().parameter(p).build().unwrap_err();
        assert_eq!(err, MapError::AddressOverflow("p".into()));
    }

    #[test]
    #[traced_test]
    fn test_overlap_warned_and_recorded() {
        let map = RegisterMap::builder()
            .parameter(ParameterDescriptor::new("Phase A Voltage", 0x61, DataKind::U32, RegisterKind::Holding))
            .parameter(ParameterDescriptor::new("Phase B Voltage", 0x62, DataKind::U32, RegisterKind::Holding))
            .parameter(ParameterDescriptor::new("Other bank", 0x62, DataKind::U16, RegisterKind::Input))
            .build()
            .unwrap();

        assert_eq!(
            map.overlaps(),
            &[Overlap {
                first: "Phase A Voltage".into(),
                second: "Phase B Voltage".into(),
                register_kind: RegisterKind::Holding,
            }]
        );
        assert!(logs_contain("Register overlap"));
    }

    #[test]
    fn test_deny_overlaps() {
        let err = RegisterMap::builder()
            .parameter(u16_param("a", 7))
            .parameter(u16_param("b", 7))
            .deny_overlaps()
            .build()
            .unwrap_err();
        assert!(matches!(err, MapError::Overlap { .. }));
    }

    #[test]
    fn test_subset_for_model() {
        let map = RegisterMap::builder()
            .parameter(u16_param("always", 1))
            .parameter(u16_param("cx only", 2).only_for_models(["SG33CX"]))
            .parameter(u16_param("ktl only", 3).only_for_models(["SG80KTL-20"]))
            .parameter(u16_param("also always", 4))
            .build()
            .unwrap();

        let subset = map.subset_for_model("SG33CX");
        assert_eq!(
            subset.names().collect::<Vec<_>>(),
            vec!["always", "cx only", "also always"]
        );
        assert!(subset.iter().all(|p| p.applies_to("SG33CX")));

        let unknown = map.subset_for_model("SG999");
        assert_eq!(unknown.names().collect::<Vec<_>>(), vec!["always", "also always"]);

        // Source map is untouched
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_extended_rejects_duplicates() {
        let map = RegisterMap::builder().parameter(u16_param("a", 1)).build().unwrap();
        let bigger = map.extended([u16_param("b", 2)]).unwrap();
        assert_eq!(bigger.len(), 2);
        assert!(map.extended([u16_param("a", 3)]).is_err());
    }
}
