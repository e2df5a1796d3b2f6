use std::collections::BTreeSet;

use crate::types::{field::HeaderField, header::Header};

/// Header fields whose current value survives re-mining.
///
/// The seal fields are produced by mining and can never be preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    fields: BTreeSet<HeaderField>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `field` as preserved. Returns `false` for seal fields, which are not accepted.
    pub fn insert(&mut self, field: HeaderField) -> bool {
        if field.is_seal() {
            return false;
        }
        self.fields.insert(field);
        true
    }

    pub fn remove(&mut self, field: HeaderField) -> bool {
        self.fields.remove(&field)
    }

    pub fn contains(&self, field: HeaderField) -> bool {
        self.fields.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = HeaderField> + '_ {
        self.fields.iter().copied()
    }

    /// Copy the preserved fields that feed execution from `original` onto `derived`, leaving
    /// the rest untouched.
    pub fn apply_inputs(&self, original: &Header, derived: &mut Header) {
        for field in self.iter().filter(|field| !field.is_execution_result()) {
            derived.copy_field_from(original, field);
        }
    }

    /// Copy the preserved fields computed by execution from `original` onto `derived`.
    pub fn apply_results(&self, original: &Header, derived: &mut Header) {
        for field in self.iter().filter(HeaderField::is_execution_result) {
            derived.copy_field_from(original, field);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, U256};

    use super::*;

    #[test]
    fn seal_fields_are_refused() {
        let mut overrides = OverrideSet::new();
        assert!(!overrides.insert(HeaderField::Nonce));
        assert!(!overrides.insert(HeaderField::MixHash));
        assert!(overrides.insert(HeaderField::Timestamp));
        assert_eq!(overrides.iter().collect::<Vec<_>>(), vec![HeaderField::Timestamp]);
    }

    #[test]
    fn apply_copies_only_preserved_fields() {
        let original = Header {
            timestamp: 42,
            extra_data: Bytes::from_static(b"original"),
            difficulty: U256::from(1),
            ..Default::default()
        };
        let mut derived = Header {
            timestamp: 7,
            extra_data: Bytes::new(),
            difficulty: U256::from(131_072),
            ..Default::default()
        };

        let mut overrides = OverrideSet::new();
        overrides.insert(HeaderField::Timestamp);
        overrides.insert(HeaderField::ExtraData);
        overrides.apply_inputs(&original, &mut derived);

        assert_eq!(derived.timestamp, 42);
        assert_eq!(derived.extra_data, original.extra_data);
        assert_eq!(derived.difficulty, U256::from(131_072));
    }

    #[test]
    fn inputs_and_results_split_the_set() {
        let original = Header {
            number: 9,
            gas_used: U256::from(21_000),
            ..Default::default()
        };
        let mut overrides = OverrideSet::new();
        overrides.insert(HeaderField::Number);
        overrides.insert(HeaderField::GasUsed);

        let mut derived = Header::default();
        overrides.apply_inputs(&original, &mut derived);
        assert_eq!(derived.number, 9);
        assert_eq!(derived.gas_used, U256::ZERO);

        overrides.apply_results(&original, &mut derived);
        assert_eq!(derived.gas_used, U256::from(21_000));
    }
}
