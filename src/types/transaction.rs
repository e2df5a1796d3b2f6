use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{
    Buf, Decodable, Encodable, Error as RlpError, Header as RlpHeader, RlpDecodable,
    RlpEncodable, EMPTY_STRING_CODE,
};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use thiserror::Error;

/// Base gas charged for every transaction.
pub const TX_GAS: u64 = 21_000;
/// Additional base gas for contract creation, charged since Homestead.
pub const TX_CREATE_GAS: u64 = 32_000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("rlp decoding failed: {0}")]
    Decode(#[from] RlpError),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid transaction field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("missing transaction field {0}")]
    MissingField(&'static str),

    #[error("transaction {0} is already pending")]
    AlreadyPending(B256),
}

/// A legacy (pre EIP-2718) transaction.
#[derive(Eq, Debug, Clone, PartialEq, RlpDecodable, RlpEncodable)]
pub struct Transaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub to: ToAddress,
    pub value: U256,
    pub data: Bytes,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// The fields of a transaction before it is signed.
#[derive(Eq, Debug, Clone, PartialEq, Default)]
pub struct UnsignedTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub to: ToAddress,
    pub value: U256,
    pub data: Bytes,
}

impl UnsignedTransaction {
    /// Hash signed by the sender. With a chain id the EIP-155 form is used.
    pub fn signature_hash(&self, chain_id: Option<u64>) -> B256 {
        let mut list = vec![];
        self.nonce.encode(&mut list);
        self.gas_price.encode(&mut list);
        self.gas.encode(&mut list);
        self.to.encode(&mut list);
        self.value.encode(&mut list);
        self.data.encode(&mut list);
        if let Some(chain_id) = chain_id {
            chain_id.encode(&mut list);
            0u8.encode(&mut list);
            0u8.encode(&mut list);
        }
        let mut out = vec![];
        RlpHeader {
            list: true,
            payload_length: list.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&list);
        keccak256(out)
    }

    /// Sign with a raw secp256k1 secret key, producing a homestead style `v` of 27 or 28.
    pub fn sign(self, secret_key: &[u8]) -> Result<Transaction, TransactionError> {
        let key = SigningKey::from_slice(secret_key)
            .map_err(|err| TransactionError::InvalidSignature(err.to_string()))?;
        let hash = self.signature_hash(None);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|err| TransactionError::InvalidSignature(err.to_string()))?;
        let signature_bytes = signature.to_bytes();

        Ok(Transaction {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas: self.gas,
            to: self.to,
            value: self.value,
            data: self.data,
            v: 27 + u64::from(recovery_id.to_byte()),
            r: U256::from_be_slice(&signature_bytes[..32]),
            s: U256::from_be_slice(&signature_bytes[32..]),
        })
    }
}

impl Transaction {
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    pub fn unsigned(&self) -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas: self.gas,
            to: self.to.clone(),
            value: self.value,
            data: self.data.clone(),
        }
    }

    /// The EIP-155 chain id encoded in `v`, if any.
    pub fn chain_id(&self) -> Option<u64> {
        (self.v >= 35).then(|| (self.v - 35) / 2)
    }

    fn recovery_id(&self) -> Result<RecoveryId, TransactionError> {
        let parity = match self.v {
            27 | 28 => self.v - 27,
            v if v >= 35 => (v - 35) % 2,
            v => {
                return Err(TransactionError::InvalidSignature(format!(
                    "unsupported v value {v}"
                )))
            }
        };
        RecoveryId::from_byte(parity as u8)
            .ok_or_else(|| TransactionError::InvalidSignature("bad recovery id".to_owned()))
    }

    /// Recover the sender address from the signature. High `s` values are rejected.
    pub fn recover_sender(&self) -> Result<Address, TransactionError> {
        let recovery_id = self.recovery_id()?;
        let signature = Signature::from_scalars(
            self.r.to_be_bytes::<32>(),
            self.s.to_be_bytes::<32>(),
        )
        .map_err(|err| TransactionError::InvalidSignature(err.to_string()))?;
        if signature.normalize_s().is_some() {
            return Err(TransactionError::InvalidSignature(
                "s value is in the upper half of the curve order".to_owned(),
            ));
        }

        let hash = self.unsigned().signature_hash(self.chain_id());
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
            .map_err(|err| TransactionError::InvalidSignature(err.to_string()))?;
        let public_key = key.to_encoded_point(false);
        let hash = keccak256(&public_key.as_bytes()[1..]);
        Ok(Address::from_slice(&hash[12..]))
    }

    pub fn is_create(&self) -> bool {
        self.to == ToAddress::Empty
    }

    /// Gas charged before any execution happens.
    pub fn intrinsic_gas(&self) -> u64 {
        let data_gas: u64 = self
            .data
            .iter()
            .map(|byte| match byte {
                0 => TX_DATA_ZERO_GAS,
                _ => TX_DATA_NON_ZERO_GAS,
            })
            .sum();
        let base = match self.is_create() {
            true => TX_GAS + TX_CREATE_GAS,
            false => TX_GAS,
        };
        base + data_gas
    }
}

/// Enum to represent the "to" field in a tx. Which can be an address, or Null if a contract is
/// created.
#[derive(Default, Eq, Debug, Clone, PartialEq)]
pub enum ToAddress {
    #[default]
    Empty,
    Exists(Address),
}

impl Encodable for ToAddress {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            ToAddress::Empty => {
                out.put_u8(EMPTY_STRING_CODE);
            }
            ToAddress::Exists(addr) => {
                addr.encode(out);
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            ToAddress::Empty => 1,
            ToAddress::Exists(addr) => addr.length(),
        }
    }
}

impl Decodable for ToAddress {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if let Some(&first) = buf.first() {
            if first == EMPTY_STRING_CODE {
                buf.advance(1);
                Ok(ToAddress::Empty)
            } else {
                Ok(ToAddress::Exists(Address::decode(buf)?))
            }
        } else {
            Err(RlpError::InputTooShort)
        }
    }
}
