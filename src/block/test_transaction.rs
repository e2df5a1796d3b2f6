use alloy_primitives::{Address, Bytes, U256};
use serde_json::{Map, Value};

use crate::{
    types::transaction::{ToAddress, Transaction, TransactionError, UnsignedTransaction},
    utils::{hex_decode, hex_encode, parse_u256, parse_u64},
};

/// A transaction together with the fixture object it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestTransaction {
    json: Map<String, Value>,
    transaction: Transaction,
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, TransactionError> {
    match object.get(field) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(TransactionError::InvalidField {
            field: field.to_owned(),
            reason: format!("expected a string, found {other}"),
        }),
        None => Err(TransactionError::MissingField(field)),
    }
}

fn number(object: &Map<String, Value>, field: &'static str) -> Result<U256, TransactionError> {
    parse_u256(required(object, field)?).map_err(|err| TransactionError::InvalidField {
        field: field.to_owned(),
        reason: err.to_string(),
    })
}

fn bytes(object: &Map<String, Value>, field: &'static str) -> Result<Vec<u8>, TransactionError> {
    hex_decode(required(object, field)?).map_err(|err| TransactionError::InvalidField {
        field: field.to_owned(),
        reason: err.to_string(),
    })
}

impl TestTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            json: transaction_to_json(&transaction),
            transaction,
        }
    }

    /// Build from a fixture object with `data, gasLimit, gasPrice, nonce, to, value` and either a
    /// `secretKey` or the `v, r, s` signature fields.
    pub fn from_json(object: &Map<String, Value>) -> Result<Self, TransactionError> {
        let to = match bytes(object, "to")? {
            to if to.is_empty() => ToAddress::Empty,
            to if to.len() == 20 => ToAddress::Exists(Address::from_slice(&to)),
            to => {
                return Err(TransactionError::InvalidField {
                    field: "to".to_owned(),
                    reason: format!("expected 20 bytes, found {}", to.len()),
                })
            }
        };
        let unsigned = UnsignedTransaction {
            nonce: number(object, "nonce")?,
            gas_price: number(object, "gasPrice")?,
            gas: number(object, "gasLimit")?,
            to,
            value: number(object, "value")?,
            data: Bytes::from(bytes(object, "data")?),
        };

        let transaction = match object.get("secretKey") {
            Some(_) => unsigned.sign(&bytes(object, "secretKey")?)?,
            None => {
                let v = parse_u64(required(object, "v")?).map_err(|err| {
                    TransactionError::InvalidField {
                        field: "v".to_owned(),
                        reason: err.to_string(),
                    }
                })?;
                Transaction {
                    nonce: unsigned.nonce,
                    gas_price: unsigned.gas_price,
                    gas: unsigned.gas,
                    to: unsigned.to,
                    value: unsigned.value,
                    data: unsigned.data,
                    v,
                    r: number(object, "r")?,
                    s: number(object, "s")?,
                }
            }
        };

        Ok(Self {
            json: object.clone(),
            transaction,
        })
    }

    /// A 100 wei transfer from the default genesis account, signed with its key.
    pub fn default_transaction() -> Result<Self, TransactionError> {
        let object: Map<String, Value> = [
            ("data", ""),
            ("gasLimit", "50000"),
            ("gasPrice", "1"),
            ("nonce", "0"),
            (
                "secretKey",
                "45a915e4d060149eb4365960e6a7a45f334393093061116b197e3240065ff2d8",
            ),
            ("to", "095e7baea6a6c7c4c2dfeb977efac326af552d87"),
            ("value", "100"),
        ]
        .into_iter()
        .map(|(field, value)| (field.to_owned(), Value::String(value.to_owned())))
        .collect();
        Self::from_json(&object)
    }

    pub fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        alloy_rlp::encode(&self.transaction)
    }
}

fn transaction_to_json(transaction: &Transaction) -> Map<String, Value> {
    let to = match &transaction.to {
        ToAddress::Empty => String::new(),
        ToAddress::Exists(address) => hex_encode(address),
    };
    let mut object = Map::new();
    object.insert("data".to_owned(), Value::String(hex_encode(&transaction.data)));
    object.insert("gasLimit".to_owned(), Value::String(format!("{:#x}", transaction.gas)));
    object.insert(
        "gasPrice".to_owned(),
        Value::String(format!("{:#x}", transaction.gas_price)),
    );
    object.insert("nonce".to_owned(), Value::String(format!("{:#x}", transaction.nonce)));
    object.insert("to".to_owned(), Value::String(to));
    object.insert("value".to_owned(), Value::String(format!("{:#x}", transaction.value)));
    object.insert("v".to_owned(), Value::String(format!("{:#x}", transaction.v)));
    object.insert("r".to_owned(), Value::String(format!("{:#x}", transaction.r)));
    object.insert("s".to_owned(), Value::String(format!("{:#x}", transaction.s)));
    object
}
