use std::{fs, path::Path};

use anyhow::bail;
use clap::Parser;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;
use trin_block_harness::{
    block::{assembler::RecalcMode, test_block::TestBlock},
    chain::test_chain::TestChain,
    cli::HarnessCliConfig,
    config::HarnessConfig,
    logging::init_tracing_logger,
    types::account::account_map_to_json,
    utils::hex_encode,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenesisSummary {
    hash: String,
    state_root: String,
    rlp: String,
    failures: Vec<String>,
}

fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(&fs::read_to_string(path)?)? {
        Value::Object(object) => Ok(object),
        other => bail!("{} does not hold a json object: {other}", path.display()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing_logger();

    let cli_config = HarnessCliConfig::parse();

    // Initialize prometheus metrics
    if let Some(addr) = cli_config.enable_metrics_with_url {
        prometheus_exporter::start(addr)?;
    }

    let header = match &cli_config.block_json {
        Some(path) => read_json_object(path)?,
        None => TestChain::default_genesis_fields()
            .iter()
            .map(|(field, value)| (field.name().to_owned(), Value::String(value.to_owned())))
            .collect(),
    };
    let state = match &cli_config.state_json {
        Some(path) => read_json_object(path)?,
        None => account_map_to_json(&TestChain::default_account_map()),
    };

    let config = HarnessConfig::from(cli_config);
    let seal_engine = config.seal_engine.build();
    info!(engine = seal_engine.name(), "Building genesis block");
    let genesis = TestBlock::from_json(&header, &state, RecalcMode::UpdateAndVerify, seal_engine)?;

    // the chain refuses a genesis whose state root does not match its accounts
    let chain = TestChain::new(&genesis, config)?;
    info!(hash = %chain.store().genesis_hash(), "Genesis block is known to the chain");

    let summary = GenesisSummary {
        hash: hex_encode(genesis.hash()),
        state_root: hex_encode(genesis.header().state_root),
        rlp: hex_encode(genesis.bytes()),
        failures: genesis
            .failures()
            .iter()
            .map(|failure| format!("{}: {}", failure.kind, failure.message))
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
