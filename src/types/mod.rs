pub mod account;
pub mod field;
pub mod header;
pub mod receipt;
pub mod transaction;
