pub mod error;
pub mod node_db;
pub mod snapshot;
pub mod utils;
