use std::cmp::{max, min};

use alloy_primitives::U256;

use crate::types::header::Header;

pub const MINIMUM_DIFFICULTY: u64 = 131_072;
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;
pub const DURATION_LIMIT: u64 = 10;
pub const EXP_DIFF_PERIOD: u64 = 100_000;

/// Homestead difficulty of the child of `parent` sealed at `timestamp`, including the difficulty
/// bomb.
pub fn calculate_difficulty(parent: &Header, timestamp: u64) -> U256 {
    let quotient = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    let step = timestamp.saturating_sub(parent.timestamp) / DURATION_LIMIT;
    let mut difficulty = match step {
        0 => parent.difficulty.saturating_add(quotient),
        step => parent
            .difficulty
            .saturating_sub(quotient.saturating_mul(U256::from(min(step - 1, 99)))),
    };

    let period = parent.number.saturating_add(1) / EXP_DIFF_PERIOD;
    if period > 1 {
        difficulty = difficulty.saturating_add(U256::from(1) << (period - 2) as usize);
    }

    max(difficulty, U256::from(MINIMUM_DIFFICULTY))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parent(difficulty: u64, number: u64) -> Header {
        Header {
            difficulty: U256::from(difficulty),
            number,
            timestamp: 1_000,
            ..Default::default()
        }
    }

    #[rstest]
    // fast block raises difficulty by parent / 2048
    #[case(131_072, 1_005, 131_136)]
    // 10..20 seconds keeps it
    #[case(2_048_000, 1_015, 2_048_000)]
    // 20..30 seconds lowers it by one step
    #[case(2_048_000, 1_025, 2_047_000)]
    // never below the minimum
    #[case(131_072, 1_500, 131_072)]
    fn homestead_adjustment(
        #[case] difficulty: u64,
        #[case] timestamp: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(
            calculate_difficulty(&parent(difficulty, 1), timestamp),
            U256::from(expected)
        );
    }

    #[test]
    fn decrease_is_capped() {
        let parent = parent(2_048_000_000, 1);
        assert_eq!(
            calculate_difficulty(&parent, 1_000 + 10_000),
            U256::from(2_048_000_000u64 - 99 * 1_000_000)
        );
    }

    #[test]
    fn bomb_kicks_in_after_two_periods() {
        let parent = parent(2_048_000, 299_999);
        // period 3 adds 2^1
        assert_eq!(
            calculate_difficulty(&parent, 1_015),
            U256::from(2_048_000 + 2)
        );
    }
}
