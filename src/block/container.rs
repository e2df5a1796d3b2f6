use std::sync::Arc;

use alloy_primitives::{keccak256, B256};
use alloy_rlp::{Decodable, Encodable, Header as RlpHeader};
use eth_trie::{EthTrie, MemoryDB, Trie, TrieError};

use crate::types::{header::Header, receipt::Receipt, transaction::Transaction};

/// A block split back into its three segments. Transactions are kept as raw encodings so they
/// can be validated one by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub header: Header,
    pub transactions: Vec<Vec<u8>>,
    pub uncles: Vec<Header>,
}

impl DecodedBlock {
    /// Decode every transaction, failing on the first invalid encoding.
    pub fn decode_transactions(&self) -> alloy_rlp::Result<Vec<Transaction>> {
        self.transactions
            .iter()
            .map(|raw| Transaction::decode(&mut raw.as_slice()))
            .collect()
    }
}

fn rlp_encode_list<T: Encodable>(out: &mut Vec<u8>, items: &[T]) {
    let mut list = Vec::<u8>::new();
    for item in items {
        item.encode(&mut list);
    }
    RlpHeader {
        list: true,
        payload_length: list.len(),
    }
    .encode(out);
    out.extend_from_slice(&list);
}

/// RLP list of every transaction, in the given order.
pub fn encode_transaction_segment(transactions: &[Transaction]) -> Vec<u8> {
    let mut out = vec![];
    rlp_encode_list(&mut out, transactions);
    out
}

/// RLP list of the uncle headers.
pub fn encode_uncle_segment(uncles: &[Header]) -> Vec<u8> {
    let mut out = vec![];
    rlp_encode_list(&mut out, uncles);
    out
}

/// Encode `[header, transactions, uncles]`.
pub fn assemble(header: &Header, transactions: &[Transaction], uncles: &[Header]) -> Vec<u8> {
    let mut payload = alloy_rlp::encode(header);
    payload.extend(encode_transaction_segment(transactions));
    payload.extend(encode_uncle_segment(uncles));

    let mut out = Vec::with_capacity(payload.len() + 4);
    RlpHeader {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend(payload);
    out
}

/// Split an encoded block into its segments. Trailing bytes are rejected.
pub fn disassemble(bytes: &[u8]) -> alloy_rlp::Result<DecodedBlock> {
    let mut buf = bytes;
    let block_head = RlpHeader::decode(&mut buf)?;
    if !block_head.list {
        return Err(alloy_rlp::Error::UnexpectedString);
    }
    if buf.len() != block_head.payload_length {
        return Err(alloy_rlp::Error::UnexpectedLength);
    }

    let header = Header::decode(&mut buf)?;

    let transactions_head = RlpHeader::decode(&mut buf)?;
    if !transactions_head.list {
        return Err(alloy_rlp::Error::UnexpectedString);
    }
    if buf.len() < transactions_head.payload_length {
        return Err(alloy_rlp::Error::InputTooShort);
    }
    let (mut transactions_buf, rest) = buf.split_at(transactions_head.payload_length);
    let mut transactions = vec![];
    while !transactions_buf.is_empty() {
        let start = transactions_buf;
        let item = RlpHeader::decode(&mut transactions_buf)?;
        if transactions_buf.len() < item.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let item_len = start.len() - transactions_buf.len() + item.payload_length;
        transactions.push(start[..item_len].to_vec());
        transactions_buf = &transactions_buf[item.payload_length..];
    }
    buf = rest;

    let uncles = Vec::<Header>::decode(&mut buf)?;
    if !buf.is_empty() {
        return Err(alloy_rlp::Error::UnexpectedLength);
    }

    Ok(DecodedBlock {
        header,
        transactions,
        uncles,
    })
}

/// keccak256 of the uncle segment.
pub fn uncles_hash(uncles: &[Header]) -> B256 {
    keccak256(encode_uncle_segment(uncles))
}

fn ordered_trie_root<T: Encodable>(items: &[T]) -> Result<B256, TrieError> {
    let memdb = Arc::new(MemoryDB::new(true));
    let mut trie = EthTrie::new(memdb);

    for (index, item) in items.iter().enumerate() {
        let path = alloy_rlp::encode(index);
        trie.insert(&path, &alloy_rlp::encode(item))?;
    }

    trie.root_hash()
}

pub fn transactions_root(transactions: &[Transaction]) -> Result<B256, TrieError> {
    ordered_trie_root(transactions)
}

pub fn receipts_root(receipts: &[Receipt]) -> Result<B256, TrieError> {
    ordered_trie_root(receipts)
}
