use std::{fmt, sync::Arc};

use alloy_primitives::{B256, U256};
use thiserror::Error;

use crate::types::header::Header;

pub mod difficulty;
pub mod keccak_pow;
pub mod no_proof;
pub mod rules;

pub use keccak_pow::KeccakPow;
pub use no_proof::NoProof;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    #[error("invalid seal: {0}")]
    InvalidSeal(String),

    #[error("cannot seal a header with zero difficulty")]
    ZeroDifficulty,

    #[error("extra data is {0} bytes, at most 32 are allowed")]
    ExtraDataTooLong(usize),

    #[error("gas limit {0} is below the minimum")]
    GasLimitTooLow(U256),

    #[error("gas used {used} exceeds gas limit {limit}")]
    GasUsedExceedsLimit { used: U256, limit: U256 },

    #[error("parent hash mismatch: expected {expected}, got {got}")]
    ParentHashMismatch { expected: B256, got: B256 },

    #[error("invalid block number: expected {expected}, got {got}")]
    InvalidNumber { expected: u64, got: u64 },

    #[error("timestamp {timestamp} is not after parent timestamp {parent}")]
    TimestampNotIncreasing { timestamp: u64, parent: u64 },

    #[error("invalid difficulty: expected {expected}, got {got}")]
    InvalidDifficulty { expected: U256, got: U256 },

    #[error("gas limit {got} is out of bounds of parent gas limit {parent}")]
    InvalidGasLimit { got: U256, parent: U256 },

    #[error("block {0} needs its parent to be verified")]
    MissingParent(u64),

    #[error("block bytes do not match header: {0}")]
    BlockMismatch(String),
}

/// How much of a header to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Seal, header rules and parent rules. A parent is required for every non-genesis block.
    CheckEverything,
    /// Seal and header rules, parent rules only when a parent is supplied.
    CheckNothingNew,
    /// Only the seal.
    JustSeal,
    /// Header rules and parent rules when a parent is supplied, the seal is not checked.
    IgnoreSeal,
}

impl Strictness {
    pub fn checks_seal(&self) -> bool {
        !matches!(self, Strictness::IgnoreSeal)
    }

    pub fn checks_rules(&self) -> bool {
        !matches!(self, Strictness::JustSeal)
    }
}

/// Verifies and produces header seals.
pub trait SealEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Check the seal fields of `header`.
    fn verify_seal(&self, header: &Header) -> Result<(), SealError>;

    /// Return `header` with seal fields satisfying [`SealEngine::verify_seal`].
    fn generate_seal(&self, header: &Header) -> Result<Header, SealError>;

    /// Verify a header at the given strictness. When `block` is supplied the encoded block must
    /// carry exactly this header.
    fn verify(
        &self,
        strictness: Strictness,
        header: &Header,
        parent: Option<&Header>,
        block: Option<&[u8]>,
    ) -> Result<(), SealError> {
        if strictness.checks_seal() {
            self.verify_seal(header)?;
        }
        if strictness.checks_rules() {
            rules::verify_header(header)?;
            match parent {
                Some(parent) => rules::verify_against_parent(header, parent)?,
                None if strictness == Strictness::CheckEverything && header.number != 0 => {
                    return Err(SealError::MissingParent(header.number))
                }
                None => {}
            }
        }
        if let Some(block) = block {
            rules::verify_block_bytes(header, block)?;
        }
        Ok(())
    }

    /// Seal `header`.
    fn mine(&self, header: &Header) -> Result<Header, SealError> {
        if header.difficulty.is_zero() {
            return Err(SealError::ZeroDifficulty);
        }
        self.generate_seal(header)
    }
}

/// Seal engines selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SealEngineKind {
    #[default]
    NoProof,
    KeccakPow,
}

impl SealEngineKind {
    pub fn build(&self) -> Arc<dyn SealEngine> {
        match self {
            SealEngineKind::NoProof => Arc::new(NoProof),
            SealEngineKind::KeccakPow => Arc::new(KeccakPow::default()),
        }
    }
}
