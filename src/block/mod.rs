pub mod assembler;
pub mod container;
pub mod overrides;
pub mod test_block;
pub mod test_transaction;
pub mod transaction_queue;
