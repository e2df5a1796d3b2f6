use std::{
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_primitives::U256;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

const TRIN_BLOCK_HARNESS_DATA_DIR: &str = "trin-block-harness";

/// A error related to hexadecimal or decimal text decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    /// A failure to convert a string into a byte vector.
    #[error("Could not decode hex: {0}")]
    DecodeError(#[from] hex::FromHexError),
    /// A numeric string that is neither `0x` hex nor decimal.
    #[error("Could not parse number {0}")]
    NumberError(String),
    /// A numeric value which does not fit the 256 bit range.
    #[error("Number {0} exceeds 256 bits")]
    Overflow(String),
}

/// Encode hex with 0x prefix
pub fn hex_encode<T: AsRef<[u8]>>(data: T) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode hex, the "0x" prefix is optional.
pub fn hex_decode(data: &str) -> Result<Vec<u8>, HexError> {
    let data = strip_hex_prefix(data).unwrap_or(data);
    hex::decode(data).map_err(|e| e.into())
}

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
}

/// Parse a number from either `0x` prefixed hex or decimal text.
///
/// `"0x"` on its own is zero, matching how test fixtures spell empty integers.
pub fn parse_u256(value: &str) -> Result<U256, HexError> {
    let value = value.trim();
    match strip_hex_prefix(value) {
        Some("") => Ok(U256::ZERO),
        Some(hex) => {
            if hex.len() > 64 {
                let trimmed = hex.trim_start_matches('0');
                if trimmed.len() > 64 {
                    return Err(HexError::Overflow(value.to_owned()));
                }
                if trimmed.is_empty() {
                    return Ok(U256::ZERO);
                }
                return U256::from_str_radix(trimmed, 16)
                    .map_err(|_| HexError::NumberError(value.to_owned()));
            }
            U256::from_str_radix(hex, 16).map_err(|_| HexError::NumberError(value.to_owned()))
        }
        None => {
            if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(HexError::NumberError(value.to_owned()));
            }
            U256::from_str_radix(value, 10).map_err(|_| HexError::Overflow(value.to_owned()))
        }
    }
}

/// Parse a number that must fit into 64 bits.
pub fn parse_u64(value: &str) -> Result<u64, HexError> {
    let number = parse_u256(value)?;
    u64::try_from(number).map_err(|_| HexError::Overflow(value.to_owned()))
}

/// Seconds since the unix epoch.
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

/// Create a directory on the file system that is deleted once it goes out of scope
pub fn setup_temp_dir() -> anyhow::Result<TempDir> {
    let mut os_temp = env::temp_dir();
    os_temp.push(TRIN_BLOCK_HARNESS_DATA_DIR);
    debug!("Creating temp dir: {os_temp:?}");
    fs::create_dir_all(&os_temp)?;

    let temp_dir = TempDir::new_in(&os_temp)?;

    Ok(temp_dir)
}
