pub mod block_queue;
pub mod block_reward;
pub mod error;
pub mod executor;
pub mod store;
pub mod test_chain;
