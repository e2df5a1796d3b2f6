#![warn(clippy::unwrap_used)]

pub mod block;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod seal;
pub mod storage;
pub mod types;
pub mod utils;
