use std::time::Duration;

use crate::{cli::HarnessCliConfig, seal::SealEngineKind};

/// How long [`crate::chain::test_chain::TestChain::add_block`] keeps retrying a block whose
/// timestamp is still in the future. The first budget to run out ends the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRetryPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for ImportRetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_attempts: 600,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub seal_engine: SealEngineKind,
    pub import_retry: ImportRetryPolicy,
    /// Pause after each uncle is queued so its seal verification can finish.
    pub uncle_settle_interval: Duration,
    pub admission_workers: usize,
    /// Skip the future timestamp check on import.
    pub allow_future_blocks: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seal_engine: SealEngineKind::default(),
            import_retry: ImportRetryPolicy::default(),
            uncle_settle_interval: Duration::from_secs(1),
            admission_workers: 4,
            allow_future_blocks: false,
        }
    }
}

impl From<HarnessCliConfig> for HarnessConfig {
    fn from(cli_config: HarnessCliConfig) -> Self {
        Self {
            seal_engine: cli_config.seal_engine,
            import_retry: ImportRetryPolicy {
                delay: Duration::from_millis(cli_config.import_retry_delay_ms),
                max_attempts: cli_config.import_retry_max_attempts,
                timeout: Duration::from_secs(cli_config.import_retry_timeout_secs),
            },
            uncle_settle_interval: Duration::from_millis(cli_config.uncle_settle_interval_ms),
            admission_workers: cli_config.admission_workers.max(1),
            allow_future_blocks: cli_config.allow_future_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::APP_NAME;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let config = HarnessConfig::from(HarnessCliConfig::parse_from([APP_NAME]));
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn zero_workers_is_raised_to_one() {
        let config = HarnessConfig::from(HarnessCliConfig::parse_from([
            APP_NAME,
            "--admission-workers",
            "0",
        ]));
        assert_eq!(config.admission_workers, 1);
    }
}
