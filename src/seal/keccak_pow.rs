use alloy_primitives::{keccak256, B256, B64, U256};
use tracing::trace;

use super::{SealEngine, SealError};
use crate::types::header::Header;

/// A light proof of work: `mix = keccak(seal_hash ++ nonce)` and the seal is valid when
/// `keccak(mix ++ seal_hash) <= 2^256 / difficulty`.
#[derive(Debug, Clone)]
pub struct KeccakPow {
    /// Upper bound of the nonce search.
    pub max_nonce: u64,
}

impl Default for KeccakPow {
    fn default() -> Self {
        Self {
            max_nonce: u64::MAX,
        }
    }
}

impl KeccakPow {
    fn boundary(difficulty: U256) -> Result<U256, SealError> {
        if difficulty.is_zero() {
            return Err(SealError::ZeroDifficulty);
        }
        Ok(U256::MAX / difficulty)
    }

    fn compute(seal_hash: B256, nonce: B64) -> (B256, U256) {
        let mix = keccak256([seal_hash.as_slice(), nonce.as_slice()].concat());
        let result = keccak256([mix.as_slice(), seal_hash.as_slice()].concat());
        (mix, U256::from_be_bytes(result.0))
    }
}

impl SealEngine for KeccakPow {
    fn name(&self) -> &'static str {
        "KeccakPow"
    }

    fn verify_seal(&self, header: &Header) -> Result<(), SealError> {
        let boundary = Self::boundary(header.difficulty)?;
        let (mix, result) = Self::compute(header.seal_hash(), header.nonce);
        if mix != header.mix_hash {
            return Err(SealError::InvalidSeal(format!(
                "mix hash mismatch: expected {mix}, got {}",
                header.mix_hash
            )));
        }
        if result > boundary {
            return Err(SealError::InvalidSeal(format!(
                "nonce {} does not meet difficulty {}",
                header.nonce, header.difficulty
            )));
        }
        Ok(())
    }

    fn generate_seal(&self, header: &Header) -> Result<Header, SealError> {
        let boundary = Self::boundary(header.difficulty)?;
        let seal_hash = header.seal_hash();
        for nonce in 0..=self.max_nonce {
            let nonce = B64::from(nonce.to_be_bytes());
            let (mix, result) = Self::compute(seal_hash, nonce);
            if result <= boundary {
                trace!(%nonce, %seal_hash, "Found seal");
                let mut sealed = header.clone();
                sealed.mix_hash = mix;
                sealed.nonce = nonce;
                return Ok(sealed);
            }
        }
        Err(SealError::InvalidSeal(format!(
            "no nonce up to {} satisfies difficulty {}",
            self.max_nonce, header.difficulty
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(difficulty: u64) -> Header {
        Header {
            difficulty: U256::from(difficulty),
            gas_limit: U256::from(3_141_592),
            number: 1,
            ..Default::default()
        }
    }

    #[test_log::test]
    fn mined_header_verifies() {
        let engine = KeccakPow::default();
        let sealed = engine.mine(&header(1_024)).unwrap();
        assert_eq!(engine.verify_seal(&sealed), Ok(()));
        assert_eq!(sealed.seal_hash(), header(1_024).seal_hash());
    }

    #[test_log::test]
    fn unsealed_header_fails() {
        let engine = KeccakPow::default();
        assert!(matches!(
            engine.verify_seal(&header(1_024)),
            Err(SealError::InvalidSeal(_))
        ));
    }

    #[test_log::test]
    fn changed_header_invalidates_seal() {
        let engine = KeccakPow::default();
        let mut sealed = engine.mine(&header(1_024)).unwrap();
        sealed.timestamp += 1;
        assert!(engine.verify_seal(&sealed).is_err());
    }

    #[test]
    fn bounded_search_gives_up() {
        let engine = KeccakPow { max_nonce: 0 };
        // a boundary of 1 is never met in practice
        let result = engine.mine(&Header {
            difficulty: U256::MAX,
            ..header(1)
        });
        assert!(matches!(result, Err(SealError::InvalidSeal(_))));
    }
}
