use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::seal::SealEngineKind;

pub const APP_NAME: &str = "trin-block-harness";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Trin Block Harness",
    about = "Build, seal and verify deterministic test blocks"
)]
pub struct HarnessCliConfig {
    #[arg(
        long,
        help = "Json object with the genesis header fields, defaults to the standard genesis"
    )]
    pub block_json: Option<PathBuf>,

    #[arg(
        long,
        help = "Json object with the genesis accounts, defaults to one funded account"
    )]
    pub state_json: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value_t = SealEngineKind::NoProof,
        help = "The seal engine used to mine and verify blocks"
    )]
    pub seal_engine: SealEngineKind,

    #[arg(
        long,
        default_value_t = 100,
        help = "Milliseconds to wait before retrying the import of a block from the future"
    )]
    pub import_retry_delay_ms: u64,

    #[arg(
        long,
        default_value_t = 600,
        help = "Maximum number of import attempts for a block from the future"
    )]
    pub import_retry_max_attempts: u32,

    #[arg(
        long,
        default_value_t = 60,
        help = "Seconds after which a block from the future is given up on"
    )]
    pub import_retry_timeout_secs: u64,

    #[arg(
        long,
        default_value_t = 1000,
        help = "Milliseconds to wait after each uncle is queued for verification"
    )]
    pub uncle_settle_interval_ms: u64,

    #[arg(
        long,
        default_value_t = 4,
        help = "Number of concurrent seal verifications when admitting uncles"
    )]
    pub admission_workers: usize,

    #[arg(
        long,
        help = "Import blocks whose timestamp is ahead of the local clock without waiting"
    )]
    pub allow_future_blocks: bool,

    #[arg(
        long,
        help = "Enable prometheus metrics reporting (provide local IP/Port from which your Prometheus server is configured to fetch metrics)"
    )]
    pub enable_metrics_with_url: Option<SocketAddr>,
}
