use std::time::Duration;

use alloy_primitives::B256;
use thiserror::Error;

use crate::{chain::error::ImportError, seal::SealError, storage::error::StateError};

/// Errors that abort a test. Everything else is recorded on the block and the run continues.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("trying to mine a block with zero difficulty")]
    ZeroDifficulty,

    #[error("genesis block {hash} is not known to the chain: {reason}")]
    UnknownGenesis { hash: B256, reason: String },

    #[error("block import failed: {0}")]
    Import(#[from] ImportError),

    #[error("block {hash} was still in the future after {attempts} attempts over {elapsed:?}")]
    FutureTimeExhausted {
        hash: B256,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("could not decode block: {0}")]
    Decode(#[from] alloy_rlp::Error),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("trie error: {0}")]
    Trie(#[from] eth_trie::TrieError),

    #[error("seal error: {0}")]
    Seal(#[from] SealError),

    #[error("harness error: {0}")]
    ANYHOW(#[from] anyhow::Error),
}
