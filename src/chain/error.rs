use alloy_primitives::{B256, U256};
use thiserror::Error;

use super::executor::ExecutionError;
use crate::{seal::SealError, storage::error::StateError};

/// Why a chain refused a block.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed block: {0}")]
    Malformed(#[from] alloy_rlp::Error),

    #[error("block {0} is already known")]
    AlreadyKnown(B256),

    #[error("block {0} is already queued")]
    AlreadyQueued(B256),

    #[error("parent {0} is unknown")]
    UnknownParent(B256),

    #[error("block timestamp {timestamp} is in the future, now is {now}")]
    FutureTime { timestamp: u64, now: u64 },

    #[error("invalid header: {0}")]
    InvalidHeader(#[from] SealError),

    #[error("transactions root mismatch: header has {expected}, body gives {got}")]
    TransactionsRootMismatch { expected: B256, got: B256 },

    #[error("uncles hash mismatch: header has {expected}, body gives {got}")]
    UnclesHashMismatch { expected: B256, got: B256 },

    #[error("invalid uncle {hash}: {reason}")]
    InvalidUncle { hash: B256, reason: String },

    #[error("invalid transaction {index}: {reason}")]
    InvalidTransaction { index: usize, reason: String },

    #[error("state root mismatch: header has {expected}, execution gives {got}")]
    StateRootMismatch { expected: B256, got: B256 },

    #[error("receipts root mismatch: header has {expected}, execution gives {got}")]
    ReceiptsRootMismatch { expected: B256, got: B256 },

    #[error("gas used mismatch: header has {expected}, execution gives {got}")]
    GasUsedMismatch { expected: U256, got: U256 },

    #[error("cannot open a block: {0}")]
    Execution(#[from] ExecutionError),

    #[error("storage error: {0}")]
    Storage(#[from] StateError),

    #[error("trie error: {0}")]
    Trie(#[from] eth_trie::TrieError),
}

impl ImportError {
    /// Returns `true` when the block may become importable once its timestamp has passed.
    pub fn is_future_time(&self) -> bool {
        matches!(self, ImportError::FutureTime { .. })
    }
}
