use alloy_primitives::{b256, keccak256, Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{Decodable, Encodable, Header as RlpHeader};

use super::field::{FieldError, FieldValue, HeaderField};

/// keccak256 of the RLP of an empty list, the uncle hash of a block without uncles.
pub const EMPTY_UNCLE_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// Root hash of an empty Merkle-Patricia trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// A Frontier/Homestead block header.
///
/// Encoded bytes and hashes are always derived from the current field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Block parent hash.
    pub parent_hash: B256,
    /// Block uncles hash.
    pub uncles_hash: B256,
    /// Block author.
    pub author: Address,
    /// Block state root.
    pub state_root: B256,
    /// Block transactions root.
    pub transactions_root: B256,
    /// Block receipts root.
    pub receipts_root: B256,
    /// Block bloom filter.
    pub logs_bloom: Bloom,
    /// Block difficulty.
    pub difficulty: U256,
    /// Block number.
    pub number: u64,
    /// Block gas limit.
    pub gas_limit: U256,
    /// Block gas used.
    pub gas_used: U256,
    /// Block timestamp.
    pub timestamp: u64,
    /// Block extra data.
    pub extra_data: Bytes,
    /// Block PoW mix hash.
    pub mix_hash: B256,
    /// Block PoW nonce.
    pub nonce: B64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: B256::ZERO,
            uncles_hash: EMPTY_UNCLE_HASH,
            author: Address::ZERO,
            state_root: EMPTY_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: U256::ZERO,
            gas_used: U256::ZERO,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: B256::ZERO,
            nonce: B64::ZERO,
        }
    }
}

impl Header {
    /// Returns the Keccak-256 hash of the header.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Returns the hash of the header without the seal fields. This is what a seal commits to.
    pub fn seal_hash(&self) -> B256 {
        let mut list = vec![];
        self.encode_unsealed_fields(&mut list);
        let mut out = vec![];
        RlpHeader {
            list: true,
            payload_length: list.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&list);
        keccak256(out)
    }

    fn encode_unsealed_fields(&self, list: &mut Vec<u8>) {
        self.parent_hash.encode(list);
        self.uncles_hash.encode(list);
        self.author.encode(list);
        self.state_root.encode(list);
        self.transactions_root.encode(list);
        self.receipts_root.encode(list);
        self.logs_bloom.encode(list);
        self.difficulty.encode(list);
        self.number.encode(list);
        self.gas_limit.encode(list);
        self.gas_used.encode(list);
        self.timestamp.encode(list);
        self.extra_data.encode(list);
    }

    /// The canonical value of `field`.
    pub fn field_value(&self, field: HeaderField) -> FieldValue {
        match field {
            HeaderField::ParentHash => FieldValue::Fixed(self.parent_hash.to_vec()),
            HeaderField::UncleHash => FieldValue::Fixed(self.uncles_hash.to_vec()),
            HeaderField::Coinbase => FieldValue::Fixed(self.author.to_vec()),
            HeaderField::StateRoot => FieldValue::Fixed(self.state_root.to_vec()),
            HeaderField::TransactionsTrie => FieldValue::Fixed(self.transactions_root.to_vec()),
            HeaderField::ReceiptTrie => FieldValue::Fixed(self.receipts_root.to_vec()),
            HeaderField::Bloom => FieldValue::Fixed(self.logs_bloom.to_vec()),
            HeaderField::Difficulty => FieldValue::Numeric(self.difficulty),
            HeaderField::Number => FieldValue::Numeric(U256::from(self.number)),
            HeaderField::GasLimit => FieldValue::Numeric(self.gas_limit),
            HeaderField::GasUsed => FieldValue::Numeric(self.gas_used),
            HeaderField::Timestamp => FieldValue::Numeric(U256::from(self.timestamp)),
            HeaderField::ExtraData => FieldValue::Bytes(self.extra_data.to_vec()),
            HeaderField::MixHash => FieldValue::Fixed(self.mix_hash.to_vec()),
            HeaderField::Nonce => FieldValue::Fixed(self.nonce.to_vec()),
        }
    }

    /// Overwrite `field` with `value`, checking the value has the field's shape.
    pub fn set_field(&mut self, field: HeaderField, value: &FieldValue) -> Result<(), FieldError> {
        let mismatch = || FieldError::Malformed {
            field,
            value: format!("{value:?}"),
            reason: format!("value does not fit {:?}", field.kind()),
        };
        match (field, value) {
            (HeaderField::ParentHash, FieldValue::Fixed(bytes)) => {
                self.parent_hash = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::UncleHash, FieldValue::Fixed(bytes)) => {
                self.uncles_hash = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::Coinbase, FieldValue::Fixed(bytes)) => {
                self.author = (bytes.len() == 20)
                    .then(|| Address::from_slice(bytes))
                    .ok_or_else(mismatch)?
            }
            (HeaderField::StateRoot, FieldValue::Fixed(bytes)) => {
                self.state_root = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::TransactionsTrie, FieldValue::Fixed(bytes)) => {
                self.transactions_root = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::ReceiptTrie, FieldValue::Fixed(bytes)) => {
                self.receipts_root = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::Bloom, FieldValue::Fixed(bytes)) => {
                self.logs_bloom = (bytes.len() == 256)
                    .then(|| Bloom::from_slice(bytes))
                    .ok_or_else(mismatch)?
            }
            (HeaderField::Difficulty, FieldValue::Numeric(number)) => self.difficulty = *number,
            (HeaderField::Number, FieldValue::Numeric(number)) => {
                self.number = u64::try_from(*number).map_err(|_| mismatch())?
            }
            (HeaderField::GasLimit, FieldValue::Numeric(number)) => self.gas_limit = *number,
            (HeaderField::GasUsed, FieldValue::Numeric(number)) => self.gas_used = *number,
            (HeaderField::Timestamp, FieldValue::Numeric(number)) => {
                self.timestamp = u64::try_from(*number).map_err(|_| mismatch())?
            }
            (HeaderField::ExtraData, FieldValue::Bytes(bytes)) => {
                self.extra_data = Bytes::copy_from_slice(bytes)
            }
            (HeaderField::MixHash, FieldValue::Fixed(bytes)) => {
                self.mix_hash = fixed(bytes).ok_or_else(mismatch)?
            }
            (HeaderField::Nonce, FieldValue::Fixed(bytes)) => {
                self.nonce = (bytes.len() == 8)
                    .then(|| B64::from_slice(bytes))
                    .ok_or_else(mismatch)?
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Copy a single field from `other`.
    pub fn copy_field_from(&mut self, other: &Header, field: HeaderField) {
        match field {
            HeaderField::ParentHash => self.parent_hash = other.parent_hash,
            HeaderField::UncleHash => self.uncles_hash = other.uncles_hash,
            HeaderField::Coinbase => self.author = other.author,
            HeaderField::StateRoot => self.state_root = other.state_root,
            HeaderField::TransactionsTrie => self.transactions_root = other.transactions_root,
            HeaderField::ReceiptTrie => self.receipts_root = other.receipts_root,
            HeaderField::Bloom => self.logs_bloom = other.logs_bloom,
            HeaderField::Difficulty => self.difficulty = other.difficulty,
            HeaderField::Number => self.number = other.number,
            HeaderField::GasLimit => self.gas_limit = other.gas_limit,
            HeaderField::GasUsed => self.gas_used = other.gas_used,
            HeaderField::Timestamp => self.timestamp = other.timestamp,
            HeaderField::ExtraData => self.extra_data = other.extra_data.clone(),
            HeaderField::MixHash => self.mix_hash = other.mix_hash,
            HeaderField::Nonce => self.nonce = other.nonce,
        }
    }
}

fn fixed(bytes: &[u8]) -> Option<B256> {
    (bytes.len() == 32).then(|| B256::from_slice(bytes))
}

impl Encodable for Header {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let mut list = vec![];
        self.encode_unsealed_fields(&mut list);
        self.mix_hash.encode(&mut list);
        self.nonce.encode(&mut list);

        let header = RlpHeader {
            list: true,
            payload_length: list.len(),
        };
        header.encode(out);
        out.put_slice(list.as_slice());
    }
}

impl Decodable for Header {
    /// Attempt to decode a header from RLP bytes. Exactly 15 fields are accepted.
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let rlp_head = RlpHeader::decode(buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if buf.len() < rlp_head.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let started_len = buf.len();
        let header = Header {
            parent_hash: Decodable::decode(buf)?,
            uncles_hash: Decodable::decode(buf)?,
            author: Decodable::decode(buf)?,
            state_root: Decodable::decode(buf)?,
            transactions_root: Decodable::decode(buf)?,
            receipts_root: Decodable::decode(buf)?,
            logs_bloom: Decodable::decode(buf)?,
            difficulty: Decodable::decode(buf)?,
            number: Decodable::decode(buf)?,
            gas_limit: Decodable::decode(buf)?,
            gas_used: Decodable::decode(buf)?,
            timestamp: Decodable::decode(buf)?,
            extra_data: Decodable::decode(buf)?,
            mix_hash: Decodable::decode(buf)?,
            nonce: Decodable::decode(buf)?,
        };

        let consumed = started_len - buf.len();
        if consumed != rlp_head.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: rlp_head.payload_length,
                got: consumed,
            });
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::utils::hex_decode;

    use super::*;

    const BLOCK_1_HEADER_RLP: &str = "0xf90211a0d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3a01dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d493479405a56e2d52c817161883f50c441c3228cfe54d9fa0d67e4d450343046425ae4271474353857ab860dbc0a1dde64b41b5cd3a532bf3a056e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421a056e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421b90100000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000008503ff80000001821388808455ba422499476574682f76312e302e302f6c696e75782f676f312e342e32a0969b900de27b6ac6a67742365dd65f55a0526c41fd18e1b16f1a1215c2e66f5988539bd4979fef1ec4";

    #[test_log::test]
    fn decode_and_encode_header() {
        let header_rlp = hex_decode(BLOCK_1_HEADER_RLP).unwrap();
        let header: Header = Decodable::decode(&mut header_rlp.as_slice()).unwrap();

        assert_eq!(header.number, 1);
        assert_eq!(header.difficulty, U256::from(17_171_480_576u64));
        assert_eq!(header.gas_limit, U256::from(5000));
        assert_eq!(
            header.hash(),
            B256::from_str("0x88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6")
                .unwrap()
        );

        let encoded_header = alloy_rlp::encode(&header);
        assert_eq!(header_rlp, encoded_header);
    }

    #[test_log::test]
    fn decode_rejects_extra_fields() {
        let mut list = vec![];
        let header = Header::default();
        header.encode_unsealed_fields(&mut list);
        header.mix_hash.encode(&mut list);
        header.nonce.encode(&mut list);
        // 1559 base fee
        U256::from(7).encode(&mut list);
        let mut encoded = vec![];
        RlpHeader {
            list: true,
            payload_length: list.len(),
        }
        .encode(&mut encoded);
        encoded.extend_from_slice(&list);

        let result = Header::decode(&mut encoded.as_slice());
        assert!(matches!(
            result,
            Err(alloy_rlp::Error::ListLengthMismatch { .. })
        ));
    }

    #[test]
    fn default_header_uses_empty_roots() {
        let header = Header::default();
        assert_eq!(header.uncles_hash, keccak256([0xc0]));
        assert_eq!(header.state_root, EMPTY_ROOT_HASH);
        assert_eq!(header.transactions_root, EMPTY_ROOT_HASH);
        assert_eq!(header.receipts_root, EMPTY_ROOT_HASH);
        assert_eq!(header.difficulty, U256::ZERO);
    }

    #[test]
    fn seal_hash_ignores_seal_fields() {
        let mut header = Header {
            difficulty: U256::from(131_072),
            ..Default::default()
        };
        let seal_hash = header.seal_hash();
        let hash = header.hash();

        header.nonce = B64::repeat_byte(0xff);
        header.mix_hash = B256::repeat_byte(0xee);
        assert_eq!(header.seal_hash(), seal_hash);
        assert_ne!(header.hash(), hash);
    }

    #[test]
    fn field_values_round_trip() {
        let header_rlp = hex_decode(BLOCK_1_HEADER_RLP).unwrap();
        let source: Header = Decodable::decode(&mut header_rlp.as_slice()).unwrap();

        let mut target = Header::default();
        for field in HeaderField::ALL {
            target.set_field(field, &source.field_value(field)).unwrap();
        }
        assert_eq!(target, source);

        let mut copied = Header::default();
        for field in HeaderField::ALL {
            copied.copy_field_from(&source, field);
        }
        assert_eq!(copied, source);
    }

    #[test]
    fn set_field_rejects_wrong_shape() {
        let mut header = Header::default();
        let result = header.set_field(HeaderField::Coinbase, &FieldValue::Fixed(vec![0; 32]));
        assert!(result.is_err());
        let result = header.set_field(HeaderField::Difficulty, &FieldValue::Bytes(vec![1]));
        assert!(result.is_err());
    }
}
