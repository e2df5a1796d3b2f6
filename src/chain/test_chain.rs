use std::{str::FromStr, sync::Arc, time::Instant};

use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

use super::{
    block_queue::BlockQueue, error::ImportError, executor::ExecutionContext, store::ChainStore,
};
use crate::{
    block::{assembler::RecalcMode, test_block::TestBlock},
    config::HarnessConfig,
    error::HarnessError,
    metrics::{start_timer_vec, stop_timer, BLOCK_HARNESS_TIMES},
    seal::SealEngine,
    types::{
        account::{Account, AccountMap},
        field::{HeaderField, SparseFieldSet},
    },
};

const DEFAULT_GENESIS_ACCOUNT: &str = "0xa94f5374fce5edbc8e2a8697c15331677e6ebf0b";
const DEFAULT_GENESIS_BALANCE: u64 = 10_000_000_000;

/// A chain of test blocks backed by a [`ChainStore`] in a temporary directory.
#[derive(Debug)]
pub struct TestChain {
    store: ChainStore,
    genesis: TestBlock,
    last_block: TestBlock,
    config: HarnessConfig,
}

impl TestChain {
    /// Open a chain on `genesis`. Fails when the genesis state root does not commit to its
    /// accounts.
    pub fn new(genesis: &TestBlock, config: HarnessConfig) -> Result<Self, HarnessError> {
        let store = Self::open_store(genesis, &config)?;
        Ok(Self {
            store,
            genesis: genesis.clone(),
            last_block: genesis.clone(),
            config,
        })
    }

    fn open_store(genesis: &TestBlock, config: &HarnessConfig) -> Result<ChainStore, HarnessError> {
        ChainStore::open(
            genesis.bytes(),
            genesis.accounts(),
            genesis.seal_engine().clone(),
            config.allow_future_blocks,
        )
    }

    /// Drop every block and start over from `genesis`.
    pub fn reset(&mut self, genesis: &TestBlock) -> Result<(), HarnessError> {
        self.store = Self::open_store(genesis, &self.config)?;
        self.genesis = genesis.clone();
        self.last_block = genesis.clone();
        Ok(())
    }

    /// Import `block`, waiting for it while its timestamp is in the future.
    ///
    /// When the block becomes the best block it is also the new last block, with its state
    /// taken from the chain.
    pub async fn add_block(&mut self, block: &TestBlock) -> Result<(), HarnessError> {
        let policy = &self.config.import_retry;
        let hash = block.hash();
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.import(block.bytes()) {
                Ok(_) => break,
                Err(err) if err.is_future_time() => {
                    let elapsed = started.elapsed();
                    if attempts >= policy.max_attempts || elapsed >= policy.timeout {
                        warn!(%hash, attempts, ?elapsed, "Giving up on block from the future");
                        return Err(HarnessError::FutureTimeExhausted {
                            hash,
                            attempts,
                            elapsed,
                        });
                    }
                    debug!(%hash, attempts, %err, "Block is from the future, retrying");
                    tokio::time::sleep(policy.delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if block.bytes() == self.store.best_block_bytes()?.as_slice() {
            let mut last_block = block.clone();
            last_block.install_state(self.store.post_state(&hash)?)?;
            info!(%hash, number = block.header().number, "New best block");
            self.last_block = last_block;
        }
        Ok(())
    }

    /// Queue `uncles` for verification and import the ones that pass into the chain. Returns
    /// the uncles that were accepted by the queue, never an error.
    pub async fn sync_uncles(&self, uncles: &[TestBlock]) -> Vec<TestBlock> {
        if uncles.is_empty() {
            return vec![];
        }
        let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["sync_uncles"]);
        let mut queue = BlockQueue::new(
            self.genesis.seal_engine().clone(),
            self.config.admission_workers,
        );

        let mut valid_uncles = vec![];
        for uncle in uncles {
            match queue.import(uncle.bytes(), &self.store) {
                Ok(hash) => {
                    debug!(%hash, "Queued uncle");
                    tokio::time::sleep(self.config.uncle_settle_interval).await;
                    valid_uncles.push(uncle.clone());
                }
                Err(err) => debug!(
                    hash = %uncle.hash(),
                    %err,
                    "Error importing uncle, this produces an invalid block"
                ),
            }
        }

        let imported = self.store.sync(queue).await;
        debug!(queued = valid_uncles.len(), imported = imported.len(), "Synced uncles");
        stop_timer(timer);
        valid_uncles
    }

    pub fn genesis(&self) -> &TestBlock {
        &self.genesis
    }

    pub fn last_block(&self) -> &TestBlock {
        &self.last_block
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// A pending block on top of the best block.
    pub fn execution_context(&self) -> Result<ExecutionContext, ImportError> {
        self.store.execution_context()
    }

    pub fn default_account_map() -> AccountMap {
        let mut accounts = AccountMap::new();
        if let Ok(address) = Address::from_str(DEFAULT_GENESIS_ACCOUNT) {
            accounts.insert(
                address,
                Account::with_balance(U256::from(DEFAULT_GENESIS_BALANCE)),
            );
        }
        accounts
    }

    pub fn default_genesis_fields() -> SparseFieldSet {
        SparseFieldSet::new()
            .with(HeaderField::Bloom, "00".repeat(256))
            .with(HeaderField::Coinbase, "0x8888f1f195afa192cfee860698584c030f4c9db1")
            .with(HeaderField::Difficulty, "131072")
            .with(HeaderField::ExtraData, "0x42")
            .with(HeaderField::GasLimit, "3141592")
            .with(HeaderField::GasUsed, "0")
            .with(
                HeaderField::MixHash,
                "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            )
            .with(HeaderField::Nonce, "0x0102030405060708")
            .with(HeaderField::Number, "0")
            .with(
                HeaderField::ParentHash,
                "0x0000000000000000000000000000000000000000000000000000000000000000",
            )
            .with(
                HeaderField::ReceiptTrie,
                "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            )
            .with(
                HeaderField::StateRoot,
                "0xf99eb1626cfa6db435c0836235942d7ccaa935f1ae247d3f1c21e495685f903a",
            )
            .with(HeaderField::Timestamp, "0x54c98c81")
            .with(
                HeaderField::TransactionsTrie,
                "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            )
            .with(
                HeaderField::UncleHash,
                "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            )
    }

    /// The standard genesis: difficulty 131072, gas limit 3141592 and one funded account.
    pub fn default_genesis_block(
        seal_engine: Arc<dyn SealEngine>,
    ) -> Result<TestBlock, HarnessError> {
        TestBlock::from_fields(
            &Self::default_genesis_fields(),
            &Self::default_account_map(),
            RecalcMode::UpdateAndVerify,
            seal_engine,
        )
    }
}
