use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde_json::{Map, Value};
use thiserror::Error;

use super::header::EMPTY_ROOT_HASH;
use crate::utils::{hex_decode, hex_encode, parse_u256, parse_u64};

/// Accounts keyed by address, ordered so that exports are deterministic.
pub type AccountMap = BTreeMap<Address, Account>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("invalid account address {0}")]
    InvalidAddress(String),

    #[error("account {0} is not a json object")]
    NotAnObject(String),

    #[error("account {address} has invalid {field}: {reason}")]
    InvalidField {
        address: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    /// Non-zero storage slots.
    pub storage: BTreeMap<U256, U256>,
}

impl Account {
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    pub fn code_hash(&self) -> B256 {
        keccak256(&self.code)
    }

    pub fn set_storage(&mut self, key: U256, value: U256) {
        match value.is_zero() {
            true => self.storage.remove(&key),
            false => self.storage.insert(key, value),
        };
    }
}

/// The Account State stored in the state trie.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: keccak256([]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StorageSlot {
    pub key: U256,
    pub value: U256,
}

/// A complete account, as persisted by the account tables.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountRecord {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
    pub storage: Vec<StorageSlot>,
}

impl AccountRecord {
    pub fn new(address: Address, account: &Account) -> Self {
        Self {
            address,
            nonce: account.nonce,
            balance: account.balance,
            code: account.code.clone(),
            storage: account
                .storage
                .iter()
                .map(|(key, value)| StorageSlot {
                    key: *key,
                    value: *value,
                })
                .collect(),
        }
    }

    pub fn into_account(self) -> (Address, Account) {
        let account = Account {
            balance: self.balance,
            nonce: self.nonce,
            code: self.code,
            storage: self
                .storage
                .into_iter()
                .map(|slot| (slot.key, slot.value))
                .collect(),
        };
        (self.address, account)
    }
}

fn field_str<'a>(
    object: &'a Map<String, Value>,
    address: &str,
    field: &'static str,
) -> Result<Option<&'a str>, AccountError> {
    match object.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(AccountError::InvalidField {
            address: address.to_owned(),
            field,
            reason: format!("expected a string, found {other}"),
        }),
    }
}

/// Read an account map from a fixture object of the form
/// `{ "<address>": { "balance", "nonce", "code", "storage": { "<key>": "<value>" } } }`.
///
/// Missing fields default to zero or empty.
pub fn account_map_from_json(object: &Map<String, Value>) -> Result<AccountMap, AccountError> {
    let mut accounts = AccountMap::new();
    for (address_text, entry) in object {
        let address = hex_decode(address_text)
            .ok()
            .filter(|bytes| bytes.len() == 20)
            .map(|bytes| Address::from_slice(&bytes))
            .ok_or_else(|| AccountError::InvalidAddress(address_text.clone()))?;
        let Value::Object(entry) = entry else {
            return Err(AccountError::NotAnObject(address_text.clone()));
        };
        let invalid = |field: &'static str, reason: String| AccountError::InvalidField {
            address: address_text.clone(),
            field,
            reason,
        };

        let mut account = Account::default();
        if let Some(balance) = field_str(entry, address_text, "balance")? {
            account.balance =
                parse_u256(balance).map_err(|err| invalid("balance", err.to_string()))?;
        }
        if let Some(nonce) = field_str(entry, address_text, "nonce")? {
            account.nonce = parse_u64(nonce).map_err(|err| invalid("nonce", err.to_string()))?;
        }
        if let Some(code) = field_str(entry, address_text, "code")? {
            account.code = hex_decode(code)
                .map(Bytes::from)
                .map_err(|err| invalid("code", err.to_string()))?;
        }
        match entry.get("storage") {
            None => {}
            Some(Value::Object(storage)) => {
                for (key, value) in storage {
                    let key = parse_u256(key).map_err(|err| invalid("storage", err.to_string()))?;
                    let value = value
                        .as_str()
                        .ok_or_else(|| invalid("storage", format!("value {value} is not a string")))
                        .and_then(|value| {
                            parse_u256(value).map_err(|err| invalid("storage", err.to_string()))
                        })?;
                    account.set_storage(key, value);
                }
            }
            Some(other) => {
                return Err(invalid("storage", format!("expected an object, found {other}")))
            }
        }
        accounts.insert(address, account);
    }
    Ok(accounts)
}

/// Write an account map in the fixture format read by [`account_map_from_json`].
pub fn account_map_to_json(accounts: &AccountMap) -> Map<String, Value> {
    accounts
        .iter()
        .map(|(address, account)| {
            let storage: Map<String, Value> = account
                .storage
                .iter()
                .map(|(key, value)| (format!("{key:#x}"), Value::String(format!("{value:#x}"))))
                .collect();
            let mut entry = Map::new();
            entry.insert("balance".to_owned(), Value::String(account.balance.to_string()));
            entry.insert("nonce".to_owned(), Value::String(account.nonce.to_string()));
            entry.insert("code".to_owned(), Value::String(hex_encode(&account.code)));
            entry.insert("storage".to_owned(), Value::Object(storage));
            (hex_encode(address), Value::Object(entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn parse_account_map() {
        let object = json!({
            "a94f5374fce5edbc8e2a8697c15331677e6ebf0b": {
                "balance": "10000000000",
                "nonce": "0",
                "code": "",
                "storage": {}
            },
            "0x095e7baea6a6c7c4c2dfeb977efac326af552d87": {
                "balance": "0x0de0b6b3a7640000",
                "nonce": "0x01",
                "code": "0x6001600101",
                "storage": { "0x00": "0x01", "0x01": "0x00" }
            }
        });
        let accounts = account_map_from_json(object.as_object().unwrap()).unwrap();
        assert_eq!(accounts.len(), 2);

        let sender = Address::from_str("0xa94f5374fce5edbc8e2a8697c15331677e6ebf0b").unwrap();
        assert_eq!(accounts[&sender].balance, U256::from(10_000_000_000u64));
        assert!(accounts[&sender].code.is_empty());

        let contract = Address::from_str("0x095e7baea6a6c7c4c2dfeb977efac326af552d87").unwrap();
        assert_eq!(accounts[&contract].nonce, 1);
        assert_eq!(accounts[&contract].code.len(), 5);
        // zero valued slots are not stored
        assert_eq!(accounts[&contract].storage.len(), 1);
    }

    #[test]
    fn json_export_reads_back() {
        let object = json!({
            "0x095e7baea6a6c7c4c2dfeb977efac326af552d87": {
                "balance": "12",
                "nonce": "3",
                "code": "0x00",
                "storage": { "0x05": "0x0a" }
            }
        });
        let accounts = account_map_from_json(object.as_object().unwrap()).unwrap();
        let exported = account_map_to_json(&accounts);
        assert_eq!(account_map_from_json(&exported).unwrap(), accounts);
    }

    #[test]
    fn malformed_accounts_are_rejected() {
        let object = json!({ "0x1234": {} });
        assert!(matches!(
            account_map_from_json(object.as_object().unwrap()),
            Err(AccountError::InvalidAddress(_))
        ));

        let object = json!({ "0x095e7baea6a6c7c4c2dfeb977efac326af552d87": { "balance": "ten" } });
        assert!(matches!(
            account_map_from_json(object.as_object().unwrap()),
            Err(AccountError::InvalidField { field: "balance", .. })
        ));

        let object = json!({ "0x095e7baea6a6c7c4c2dfeb977efac326af552d87": [] });
        assert!(matches!(
            account_map_from_json(object.as_object().unwrap()),
            Err(AccountError::NotAnObject(_))
        ));
    }

    #[test]
    fn record_round_trip() {
        let mut account = Account::with_balance(U256::from(5));
        account.set_storage(U256::from(1), U256::from(2));
        let address = Address::repeat_byte(0x42);
        let record = AccountRecord::new(address, &account);
        let encoded = alloy_rlp::encode(&record);
        let decoded: AccountRecord = alloy_rlp::Decodable::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.into_account(), (address, account));
    }
}
