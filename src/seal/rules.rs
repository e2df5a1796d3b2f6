use alloy_primitives::U256;

use super::{difficulty::calculate_difficulty, SealError};
use crate::{block::container::disassemble, types::header::Header};

pub const MIN_GAS_LIMIT: u64 = 5000;
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Rules a header must satisfy on its own.
pub fn verify_header(header: &Header) -> Result<(), SealError> {
    if header.extra_data.len() > MAXIMUM_EXTRA_DATA_SIZE {
        return Err(SealError::ExtraDataTooLong(header.extra_data.len()));
    }
    if header.gas_limit < U256::from(MIN_GAS_LIMIT) {
        return Err(SealError::GasLimitTooLow(header.gas_limit));
    }
    if header.gas_used > header.gas_limit {
        return Err(SealError::GasUsedExceedsLimit {
            used: header.gas_used,
            limit: header.gas_limit,
        });
    }
    Ok(())
}

/// Rules linking a header to its parent.
pub fn verify_against_parent(header: &Header, parent: &Header) -> Result<(), SealError> {
    let parent_hash = parent.hash();
    if header.parent_hash != parent_hash {
        return Err(SealError::ParentHashMismatch {
            expected: parent_hash,
            got: header.parent_hash,
        });
    }
    if parent.number.checked_add(1) != Some(header.number) {
        return Err(SealError::InvalidNumber {
            expected: parent.number.saturating_add(1),
            got: header.number,
        });
    }
    if header.timestamp <= parent.timestamp {
        return Err(SealError::TimestampNotIncreasing {
            timestamp: header.timestamp,
            parent: parent.timestamp,
        });
    }
    let expected = calculate_difficulty(parent, header.timestamp);
    if header.difficulty != expected {
        return Err(SealError::InvalidDifficulty {
            expected,
            got: header.difficulty,
        });
    }
    let bound = parent.gas_limit / U256::from(GAS_LIMIT_BOUND_DIVISOR);
    if header.gas_limit >= parent.gas_limit.saturating_add(bound)
        || header.gas_limit <= parent.gas_limit.saturating_sub(bound)
    {
        return Err(SealError::InvalidGasLimit {
            got: header.gas_limit,
            parent: parent.gas_limit,
        });
    }
    Ok(())
}

/// The encoded block must decode and carry exactly `header`.
pub fn verify_block_bytes(header: &Header, block: &[u8]) -> Result<(), SealError> {
    let decoded = disassemble(block).map_err(|err| SealError::BlockMismatch(err.to_string()))?;
    if &decoded.header != header {
        return Err(SealError::BlockMismatch(format!(
            "encoded header {} differs from {}",
            decoded.header.hash(),
            header.hash()
        )));
    }
    Ok(())
}
