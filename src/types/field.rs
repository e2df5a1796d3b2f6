use std::{collections::BTreeMap, fmt, str::FromStr};

use alloy_primitives::{B256, U256};
use alloy_rlp::{Encodable, Header as RlpHeader};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::{hex_decode, parse_u256};

/// Name of the pseudo-field carried by fixtures next to the header fields. It is never encoded.
pub const HASH_PSEUDO_FIELD: &str = "hash";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("unknown header field {0}")]
    UnknownField(String),

    #[error("header field {field} expects a string value, found {found}")]
    NotAString { field: String, found: String },

    #[error("malformed header field {field} = {value:?}: {reason}")]
    Malformed {
        field: HeaderField,
        value: String,
        reason: String,
    },
}

/// The header fields of a Frontier/Homestead block, declared in canonical encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderField {
    ParentHash,
    UncleHash,
    Coinbase,
    StateRoot,
    TransactionsTrie,
    ReceiptTrie,
    Bloom,
    Difficulty,
    Number,
    GasLimit,
    GasUsed,
    Timestamp,
    ExtraData,
    MixHash,
    Nonce,
}

/// The binary shape of a header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw bytes of exactly this width.
    Fixed(usize),
    /// Minimal big-endian integer of at most this many bits.
    Numeric(usize),
    /// Raw bytes of any length.
    Bytes,
}

impl HeaderField {
    pub const ALL: [HeaderField; 15] = [
        HeaderField::ParentHash,
        HeaderField::UncleHash,
        HeaderField::Coinbase,
        HeaderField::StateRoot,
        HeaderField::TransactionsTrie,
        HeaderField::ReceiptTrie,
        HeaderField::Bloom,
        HeaderField::Difficulty,
        HeaderField::Number,
        HeaderField::GasLimit,
        HeaderField::GasUsed,
        HeaderField::Timestamp,
        HeaderField::ExtraData,
        HeaderField::MixHash,
        HeaderField::Nonce,
    ];

    /// The fixture name of the field.
    pub fn name(&self) -> &'static str {
        match self {
            HeaderField::ParentHash => "parentHash",
            HeaderField::UncleHash => "uncleHash",
            HeaderField::Coinbase => "coinbase",
            HeaderField::StateRoot => "stateRoot",
            HeaderField::TransactionsTrie => "transactionsTrie",
            HeaderField::ReceiptTrie => "receiptTrie",
            HeaderField::Bloom => "bloom",
            HeaderField::Difficulty => "difficulty",
            HeaderField::Number => "number",
            HeaderField::GasLimit => "gasLimit",
            HeaderField::GasUsed => "gasUsed",
            HeaderField::Timestamp => "timestamp",
            HeaderField::ExtraData => "extraData",
            HeaderField::MixHash => "mixHash",
            HeaderField::Nonce => "nonce",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            HeaderField::Coinbase => FieldKind::Fixed(20),
            HeaderField::Bloom => FieldKind::Fixed(256),
            HeaderField::Nonce => FieldKind::Fixed(8),
            HeaderField::ParentHash
            | HeaderField::UncleHash
            | HeaderField::StateRoot
            | HeaderField::TransactionsTrie
            | HeaderField::ReceiptTrie
            | HeaderField::MixHash => FieldKind::Fixed(32),
            HeaderField::Number | HeaderField::Timestamp => FieldKind::Numeric(64),
            HeaderField::Difficulty | HeaderField::GasLimit | HeaderField::GasUsed => {
                FieldKind::Numeric(256)
            }
            HeaderField::ExtraData => FieldKind::Bytes,
        }
    }

    /// Returns `true` for the fields produced by sealing.
    pub fn is_seal(&self) -> bool {
        matches!(self, HeaderField::MixHash | HeaderField::Nonce)
    }

    /// Returns `true` for the fields computed when the block is committed to seal.
    pub fn is_execution_result(&self) -> bool {
        matches!(
            self,
            HeaderField::StateRoot
                | HeaderField::TransactionsTrie
                | HeaderField::ReceiptTrie
                | HeaderField::UncleHash
                | HeaderField::Bloom
                | HeaderField::GasUsed
        )
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HeaderField {
    type Err = FieldError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        HeaderField::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| FieldError::UnknownField(name.to_owned()))
    }
}

/// A header field value in canonical binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Fixed(Vec<u8>),
    Numeric(U256),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Parse the text form of `field`.
    pub fn parse(field: HeaderField, value: &str) -> Result<Self, FieldError> {
        let malformed = |reason: String| FieldError::Malformed {
            field,
            value: value.to_owned(),
            reason,
        };
        match field.kind() {
            FieldKind::Fixed(width) => {
                let bytes = hex_decode(value).map_err(|err| malformed(err.to_string()))?;
                if bytes.len() != width {
                    return Err(malformed(format!(
                        "expected {width} bytes, found {}",
                        bytes.len()
                    )));
                }
                Ok(FieldValue::Fixed(bytes))
            }
            FieldKind::Numeric(bits) => {
                let number = parse_u256(value).map_err(|err| malformed(err.to_string()))?;
                if number.bit_len() > bits {
                    return Err(malformed(format!("value exceeds {bits} bits")));
                }
                Ok(FieldValue::Numeric(number))
            }
            FieldKind::Bytes => {
                let bytes = hex_decode(value).map_err(|err| malformed(err.to_string()))?;
                Ok(FieldValue::Bytes(bytes))
            }
        }
    }
}

impl Encodable for FieldValue {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            FieldValue::Fixed(bytes) | FieldValue::Bytes(bytes) => bytes.as_slice().encode(out),
            FieldValue::Numeric(number) => number.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            FieldValue::Fixed(bytes) | FieldValue::Bytes(bytes) => bytes.as_slice().length(),
            FieldValue::Numeric(number) => number.length(),
        }
    }
}

/// A partial header description: only the fields present are encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseFieldSet {
    fields: BTreeMap<HeaderField, String>,
}

impl SparseFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: HeaderField, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: HeaderField, value: impl Into<String>) -> Option<String> {
        self.fields.insert(field, value.into())
    }

    pub fn remove(&mut self, field: HeaderField) -> Option<String> {
        self.fields.remove(&field)
    }

    pub fn get(&self, field: HeaderField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: HeaderField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate the present fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (HeaderField, &str)> {
        self.fields.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Read a fixture object. The `hash` pseudo-field is skipped, any other unknown key is an
    /// error.
    pub fn from_json(object: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut fields = Self::new();
        for (name, value) in object {
            if name == HASH_PSEUDO_FIELD {
                continue;
            }
            let field = HeaderField::from_str(name)?;
            let Value::String(value) = value else {
                return Err(FieldError::NotAString {
                    field: name.clone(),
                    found: value.to_string(),
                });
            };
            fields.insert(field, value.clone());
        }
        Ok(fields)
    }
}

impl FromIterator<(HeaderField, String)> for SparseFieldSet {
    fn from_iter<T: IntoIterator<Item = (HeaderField, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// The canonical encoding of a sparse field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTemplate {
    /// The emitted fields in encoding order.
    pub fields: Vec<(HeaderField, FieldValue)>,
    /// RLP list of the emitted field values.
    pub encoded: Vec<u8>,
}

impl FieldTemplate {
    pub fn get(&self, field: HeaderField) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(emitted, value)| (*emitted == field).then_some(value))
    }
}

/// Encode the present fields as an RLP list in canonical order.
///
/// A `state_root` forces the stateRoot slot and wins over any explicit `stateRoot` entry.
pub fn encode_fields(
    fields: &SparseFieldSet,
    state_root: Option<B256>,
) -> Result<FieldTemplate, FieldError> {
    let mut emitted = Vec::with_capacity(HeaderField::ALL.len());
    for field in HeaderField::ALL {
        let value = match (field, state_root) {
            (HeaderField::StateRoot, Some(root)) => FieldValue::Fixed(root.to_vec()),
            _ => match fields.get(field) {
                Some(text) => FieldValue::parse(field, text)?,
                None => continue,
            },
        };
        emitted.push((field, value));
    }

    let mut payload = vec![];
    for (_, value) in &emitted {
        value.encode(&mut payload);
    }
    let mut encoded = Vec::with_capacity(payload.len() + 3);
    RlpHeader {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut encoded);
    encoded.extend_from_slice(&payload);

    Ok(FieldTemplate {
        fields: emitted,
        encoded,
    })
}
