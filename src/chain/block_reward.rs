use alloy_primitives::{Address, U256};

use crate::types::header::Header;

pub const ETH_TO_WEI: u128 = 1_000_000_000_000_000_000;

/// Frontier and Homestead pay 5 ether per block.
pub const BASE_BLOCK_REWARD: u128 = 5 * ETH_TO_WEI;

// Calculate block reward
// https://github.com/paradigmxyz/reth/blob/v0.2.0-beta.6/crates/consensus/common/src/calc.rs
pub fn get_block_reward(header: &Header, uncles: &[Header]) -> Vec<(Address, U256)> {
    let base_block_reward = U256::from(BASE_BLOCK_REWARD);
    let mut beneficiaries = vec![];

    for uncle in uncles {
        let generations = U256::from(8 + uncle.number).saturating_sub(U256::from(header.number));
        beneficiaries.push((uncle.author, (generations * base_block_reward) >> 3));
    }

    beneficiaries.push((
        header.author,
        base_block_reward + (base_block_reward >> 5) * U256::from(uncles.len()),
    ));

    beneficiaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_without_uncles() {
        let header = Header {
            number: 1,
            author: Address::repeat_byte(0x88),
            ..Default::default()
        };
        assert_eq!(
            get_block_reward(&header, &[]),
            vec![(header.author, U256::from(BASE_BLOCK_REWARD))]
        );
    }

    #[test]
    fn reward_with_uncles() {
        let header = Header {
            number: 3,
            author: Address::repeat_byte(0x88),
            ..Default::default()
        };
        let uncle = Header {
            number: 2,
            author: Address::repeat_byte(0x11),
            ..Default::default()
        };
        let old_uncle = Header {
            number: 1,
            author: Address::repeat_byte(0x22),
            ..Default::default()
        };

        let rewards = get_block_reward(&header, &[uncle, old_uncle]);
        let reward = U256::from(BASE_BLOCK_REWARD);
        assert_eq!(
            rewards[0],
            (Address::repeat_byte(0x11), reward * U256::from(7) / U256::from(8))
        );
        assert_eq!(
            rewards[1],
            (Address::repeat_byte(0x22), reward * U256::from(6) / U256::from(8))
        );
        assert_eq!(
            rewards[2],
            (header.author, reward + reward / U256::from(32) * U256::from(2))
        );
    }
}
