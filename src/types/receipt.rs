use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Receipt of an executed transaction, encoded as `[status, cumulativeGasUsed, bloom, logs]`.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Receipt {
    pub success: bool,
    pub cumulative_gas_used: U256,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(success: bool, cumulative_gas_used: U256) -> Self {
        Self {
            success,
            cumulative_gas_used,
            logs_bloom: Bloom::ZERO,
            logs: vec![],
        }
    }
}
