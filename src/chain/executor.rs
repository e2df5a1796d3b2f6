use alloy_primitives::{Address, Bloom, B256, U256};
use thiserror::Error;
use tracing::{debug, trace};

use super::block_reward::get_block_reward;
use crate::{
    block::{
        container::{receipts_root, transactions_root, uncles_hash},
        overrides::OverrideSet,
        transaction_queue::TransactionQueue,
    },
    metrics::{start_timer_vec, stop_timer, BLOCK_HARNESS_TIMES},
    seal::difficulty::calculate_difficulty,
    storage::{error::StateError, snapshot::StateSnapshot},
    types::{
        account::{Account, AccountMap},
        header::Header,
        receipt::Receipt,
        transaction::{ToAddress, Transaction, TransactionError},
    },
};

/// Decides the lowest gas price a pending transaction must pay to be executed.
pub trait GasPricer: Send + Sync {
    fn ask(&self, header: &Header) -> U256;
}

/// Accepts any gas price.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroGasPricer;

impl GasPricer for ZeroGasPricer {
    fn ask(&self, _header: &Header) -> U256 {
        U256::ZERO
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("invalid transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: U256 },

    #[error("gas limit {limit} is below intrinsic gas {required}")]
    IntrinsicGas { limit: U256, required: u64 },

    #[error("balance {balance} does not cover upfront cost {cost}")]
    InsufficientBalance { balance: U256, cost: U256 },

    #[error("transaction gas {required} exceeds the {available} left in the block")]
    BlockGasLimit { available: U256, required: U256 },

    #[error("gas price {price} is below the asked {ask}")]
    GasPriceTooLow { price: U256, ask: U256 },

    #[error("block {number} at timestamp {timestamp} has no representable child")]
    ParentOverflow { number: u64, timestamp: u64 },
}

/// A pending block on top of a parent: its header, the account state, and the transactions and
/// receipts applied so far.
///
/// Transactions move value and pay their intrinsic gas, no code is run.
#[derive(Debug)]
pub struct ExecutionContext {
    header: Header,
    accounts: AccountMap,
    transactions: Vec<Transaction>,
    receipts: Vec<Receipt>,
    uncles: Vec<Header>,
    cumulative_gas_used: U256,
    committed: Option<StateSnapshot>,
}

impl ExecutionContext {
    /// Open a new block on `parent`, timestamped no earlier than one second after it.
    pub fn new(
        parent: &Header,
        parent_state: AccountMap,
        timestamp: u64,
    ) -> Result<Self, ExecutionError> {
        let (Some(number), Some(min_timestamp)) =
            (parent.number.checked_add(1), parent.timestamp.checked_add(1))
        else {
            return Err(ExecutionError::ParentOverflow {
                number: parent.number,
                timestamp: parent.timestamp,
            });
        };
        let timestamp = timestamp.max(min_timestamp);
        let header = Header {
            parent_hash: parent.hash(),
            number,
            difficulty: calculate_difficulty(parent, timestamp),
            gas_limit: parent.gas_limit,
            timestamp,
            ..Default::default()
        };
        Ok(Self::with_header(header, parent_state))
    }

    /// Re-execute an imported block. The roots and gas used of `header` get recomputed by
    /// [`ExecutionContext::commit_to_seal`], every other field is kept.
    pub fn for_import(header: &Header, parent_state: AccountMap) -> Self {
        Self::with_header(header.clone(), parent_state)
    }

    fn with_header(header: Header, accounts: AccountMap) -> Self {
        Self {
            header,
            accounts,
            transactions: vec![],
            receipts: vec![],
            uncles: vec![],
            cumulative_gas_used: U256::ZERO,
            committed: None,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn accounts(&self) -> &AccountMap {
        &self.accounts
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn set_author(&mut self, author: Address) {
        self.header.author = author;
    }

    /// Copy the preserved execution inputs of `original` onto the pending header. Must run
    /// before any transaction is applied.
    pub fn apply_overrides(&mut self, overrides: &OverrideSet, original: &Header) {
        overrides.apply_inputs(original, &mut self.header);
    }

    pub fn set_uncles(&mut self, uncles: Vec<Header>) {
        self.uncles = uncles;
    }

    /// Apply a single transaction on top of the current state.
    pub fn apply_transaction(&mut self, transaction: &Transaction) -> Result<(), ExecutionError> {
        let sender = transaction.recover_sender()?;
        let intrinsic_gas = transaction.intrinsic_gas();
        if transaction.gas < U256::from(intrinsic_gas) {
            return Err(ExecutionError::IntrinsicGas {
                limit: transaction.gas,
                required: intrinsic_gas,
            });
        }
        let available = self
            .header
            .gas_limit
            .saturating_sub(self.cumulative_gas_used);
        if transaction.gas > available {
            return Err(ExecutionError::BlockGasLimit {
                available,
                required: transaction.gas,
            });
        }

        let sender_account = self.accounts.get(&sender).cloned().unwrap_or_default();
        if U256::from(sender_account.nonce) != transaction.nonce {
            return Err(ExecutionError::InvalidNonce {
                expected: sender_account.nonce,
                got: transaction.nonce,
            });
        }
        let cost = transaction
            .gas
            .saturating_mul(transaction.gas_price)
            .saturating_add(transaction.value);
        if sender_account.balance < cost {
            return Err(ExecutionError::InsufficientBalance {
                balance: sender_account.balance,
                cost,
            });
        }

        let gas_used = U256::from(intrinsic_gas);
        let fee = gas_used * transaction.gas_price;
        let recipient = match transaction.to {
            ToAddress::Exists(address) => address,
            ToAddress::Empty => sender.create(sender_account.nonce),
        };

        let sender_account = self.accounts.entry(sender).or_default();
        sender_account.balance -= transaction.value + fee;
        sender_account.nonce += 1;
        self.accounts.entry(recipient).or_default().balance += transaction.value;
        self.credit(self.header.author, fee);

        self.cumulative_gas_used += gas_used;
        self.receipts
            .push(Receipt::new(true, self.cumulative_gas_used));
        self.transactions.push(transaction.clone());
        trace!(hash = %transaction.hash(), %sender, %recipient, "Applied transaction");
        Ok(())
    }

    /// Execute every pending transaction of `queue` in order. Returns the hashes of those left
    /// out of the block.
    pub fn execute_transactions(
        &mut self,
        queue: &TransactionQueue,
        gas_pricer: &dyn GasPricer,
    ) -> Vec<B256> {
        let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["execute_transactions"]);
        let ask = gas_pricer.ask(&self.header);
        let mut excluded = vec![];
        for transaction in queue.pending() {
            let result = match transaction.gas_price < ask {
                true => Err(ExecutionError::GasPriceTooLow {
                    price: transaction.gas_price,
                    ask,
                }),
                false => self.apply_transaction(transaction),
            };
            if let Err(err) = result {
                debug!(hash = %transaction.hash(), %err, "Dropping transaction from block");
                excluded.push(transaction.hash());
            }
        }
        stop_timer(timer);
        excluded
    }

    fn credit(&mut self, address: Address, amount: U256) {
        let account: &mut Account = self.accounts.entry(address).or_default();
        account.balance += amount;
    }

    /// Pay the block rewards and fill in the roots and gas used. Committing twice is a no-op.
    pub fn commit_to_seal(&mut self) -> Result<(), StateError> {
        if self.committed.is_some() {
            return Ok(());
        }
        for (beneficiary, reward) in get_block_reward(&self.header, &self.uncles) {
            self.credit(beneficiary, reward);
        }

        let state = StateSnapshot::from_accounts(&self.accounts)?;
        self.header.state_root = state.root();
        self.header.transactions_root = transactions_root(&self.transactions)?;
        self.header.receipts_root = receipts_root(&self.receipts)?;
        self.header.uncles_hash = uncles_hash(&self.uncles);
        let mut logs_bloom = Bloom::ZERO;
        for receipt in &self.receipts {
            logs_bloom.accrue_bloom(&receipt.logs_bloom);
        }
        self.header.logs_bloom = logs_bloom;
        self.header.gas_used = self.cumulative_gas_used;
        debug!(
            number = self.header.number,
            state_root = %self.header.state_root,
            transactions = self.transactions.len(),
            uncles = self.uncles.len(),
            "Committed block to seal"
        );

        self.committed = Some(state);
        Ok(())
    }

    /// The resulting state, committed if that has not happened yet.
    pub fn into_state(self) -> Result<StateSnapshot, StateError> {
        match self.committed {
            Some(state) => Ok(state),
            None => StateSnapshot::from_accounts(&self.accounts),
        }
    }
}
