use std::collections::HashSet;

use alloy_primitives::B256;
use alloy_rlp::Decodable;
use tracing::trace;

use crate::types::transaction::{Transaction, TransactionError};

/// Pending transactions of a block, in import order.
///
/// Only structurally valid transactions get in: they must decode and their sender must be
/// recoverable.
#[derive(Debug, Clone, Default)]
pub struct TransactionQueue {
    pending: Vec<Transaction>,
    known: HashSet<B256>,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a raw encoded transaction.
    pub fn import(&mut self, raw: &[u8]) -> Result<B256, TransactionError> {
        let mut buf = raw;
        let transaction = Transaction::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(TransactionError::Decode(alloy_rlp::Error::UnexpectedLength));
        }
        self.import_transaction(transaction)
    }

    pub fn import_transaction(
        &mut self,
        transaction: Transaction,
    ) -> Result<B256, TransactionError> {
        let hash = transaction.hash();
        if self.known.contains(&hash) {
            return Err(TransactionError::AlreadyPending(hash));
        }
        let sender = transaction.recover_sender()?;
        trace!(%hash, %sender, "Imported pending transaction");
        self.known.insert(hash);
        self.pending.push(transaction);
        Ok(hash)
    }

    /// Pending transactions, first imported first.
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn contains(&self, hash: &B256) -> bool {
        self.known.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop a pending transaction, returning it if it was queued.
    pub fn remove(&mut self, hash: &B256) -> Option<Transaction> {
        if !self.known.remove(hash) {
            return None;
        }
        let position = self
            .pending
            .iter()
            .position(|transaction| &transaction.hash() == hash)?;
        Some(self.pending.remove(position))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.known.clear();
    }
}
