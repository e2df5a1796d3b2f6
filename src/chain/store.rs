use std::{collections::HashSet, fmt, sync::Arc};

use alloy_primitives::{B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use parking_lot::RwLock;
use redb::{Database as ReDB, ReadableTable, TableDefinition};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{block_queue::BlockQueue, error::ImportError, executor::ExecutionContext};
use crate::{
    block::container::{disassemble, transactions_root, uncles_hash},
    error::HarnessError,
    metrics::{inc_counter_vec, start_timer_vec, stop_timer, BLOCK_HARNESS_TIMES, BLOCK_IMPORTS},
    seal::{SealEngine, Strictness},
    storage::{error::StateError, snapshot::StateSnapshot, utils::setup_redb},
    types::{
        account::{AccountMap, AccountRecord},
        header::Header,
    },
    utils::{setup_temp_dir, timestamp_now},
};

type HashTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

const BLOCKS_TABLE: HashTable = TableDefinition::new("blocks");
const HEADERS_TABLE: HashTable = TableDefinition::new("headers");
const POST_STATES_TABLE: HashTable = TableDefinition::new("post_states");
const DETAILS_TABLE: HashTable = TableDefinition::new("details");

/// Generations an uncle may lag behind the block including it.
pub const MAX_UNCLE_DEPTH: usize = 6;
pub const MAX_UNCLES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockDetails {
    pub number: u64,
    pub total_difficulty: U256,
}

/// A persistent chain of blocks rooted at a genesis, with the post-state of every block.
///
/// Lives in its own temporary directory which is removed on drop.
pub struct ChainStore {
    db: ReDB,
    genesis_hash: B256,
    best: RwLock<B256>,
    seal_engine: Arc<dyn SealEngine>,
    allow_future_blocks: bool,
    temp_dir: TempDir,
}

impl fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainStore")
            .field("genesis_hash", &self.genesis_hash)
            .field("best", &*self.best.read())
            .field("path", &self.temp_dir.path())
            .finish()
    }
}

impl ChainStore {
    /// Open a chain on `genesis`. Its state root must commit to `accounts`.
    pub fn open(
        genesis: &[u8],
        accounts: &AccountMap,
        seal_engine: Arc<dyn SealEngine>,
        allow_future_blocks: bool,
    ) -> Result<Self, HarnessError> {
        let block = disassemble(genesis)?;
        let genesis_hash = block.header.hash();
        let state_root = StateSnapshot::from_accounts(accounts)?.root();
        if state_root != block.header.state_root {
            return Err(HarnessError::UnknownGenesis {
                hash: genesis_hash,
                reason: format!(
                    "state root {} does not match the account map root {state_root}",
                    block.header.state_root
                ),
            });
        }

        let temp_dir = setup_temp_dir()?;
        let db = setup_redb(temp_dir.path()).map_err(StateError::from)?;
        let store = Self {
            db,
            genesis_hash,
            best: RwLock::new(genesis_hash),
            seal_engine,
            allow_future_blocks,
            temp_dir,
        };
        store.insert_block(
            genesis_hash,
            genesis,
            &block.header,
            accounts,
            &BlockDetails {
                number: block.header.number,
                total_difficulty: block.header.difficulty,
            },
        )?;
        info!(hash = %genesis_hash, path = %store.temp_dir.path().display(), "Opened chain store");
        Ok(store)
    }

    fn insert_block(
        &self,
        hash: B256,
        bytes: &[u8],
        header: &Header,
        post_state: &AccountMap,
        details: &BlockDetails,
    ) -> Result<(), StateError> {
        let records: Vec<AccountRecord> = post_state
            .iter()
            .map(|(address, account)| AccountRecord::new(*address, account))
            .collect();

        let txn = self.db.begin_write()?;
        {
            let mut blocks = txn.open_table(BLOCKS_TABLE)?;
            blocks.insert(hash.as_slice(), bytes)?;
            let mut headers = txn.open_table(HEADERS_TABLE)?;
            headers.insert(hash.as_slice(), alloy_rlp::encode(header).as_slice())?;
            let mut post_states = txn.open_table(POST_STATES_TABLE)?;
            post_states.insert(hash.as_slice(), alloy_rlp::encode(&records).as_slice())?;
            let mut details_table = txn.open_table(DETAILS_TABLE)?;
            details_table.insert(hash.as_slice(), alloy_rlp::encode(details).as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn read(&self, table: HashTable, hash: &B256) -> Result<Option<Vec<u8>>, StateError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        Ok(table.get(hash.as_slice())?.map(|value| value.value().to_vec()))
    }

    pub fn genesis_hash(&self) -> B256 {
        self.genesis_hash
    }

    pub fn is_known(&self, hash: &B256) -> Result<bool, StateError> {
        Ok(self.read(HEADERS_TABLE, hash)?.is_some())
    }

    pub fn header(&self, hash: &B256) -> Result<Option<Header>, StateError> {
        match self.read(HEADERS_TABLE, hash)? {
            Some(raw) => Ok(Some(Header::decode(&mut raw.as_slice())?)),
            None => Ok(None),
        }
    }

    pub fn block_bytes(&self, hash: &B256) -> Result<Option<Vec<u8>>, StateError> {
        self.read(BLOCKS_TABLE, hash)
    }

    pub fn details(&self, hash: &B256) -> Result<Option<BlockDetails>, StateError> {
        match self.read(DETAILS_TABLE, hash)? {
            Some(raw) => Ok(Some(BlockDetails::decode(&mut raw.as_slice())?)),
            None => Ok(None),
        }
    }

    /// Accounts after executing block `hash`.
    pub fn post_state(&self, hash: &B256) -> Result<AccountMap, StateError> {
        let raw = self.read(POST_STATES_TABLE, hash)?.ok_or(StateError::Undefined)?;
        Ok(Vec::<AccountRecord>::decode(&mut raw.as_slice())?
            .into_iter()
            .map(AccountRecord::into_account)
            .collect())
    }

    pub fn best_hash(&self) -> B256 {
        *self.best.read()
    }

    pub fn best_header(&self) -> Result<Header, StateError> {
        self.header(&self.best_hash())?.ok_or(StateError::Undefined)
    }

    pub fn best_block_bytes(&self) -> Result<Vec<u8>, StateError> {
        self.block_bytes(&self.best_hash())?
            .ok_or(StateError::Undefined)
    }

    /// A pending block on top of the best block, timestamped now.
    pub fn execution_context(&self) -> Result<ExecutionContext, ImportError> {
        let best_hash = self.best_hash();
        let parent = self.best_header()?;
        Ok(ExecutionContext::new(
            &parent,
            self.post_state(&best_hash)?,
            timestamp_now(),
        )?)
    }

    /// Fully verify, execute and store an encoded block. Returns its hash.
    pub fn import(&self, bytes: &[u8]) -> Result<B256, ImportError> {
        let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["import"]);
        let result = self.import_inner(bytes);
        stop_timer(timer);
        match &result {
            Ok(hash) => {
                inc_counter_vec(&BLOCK_IMPORTS, &["imported"]);
                debug!(%hash, best = %self.best_hash(), "Imported block");
            }
            Err(err) if err.is_future_time() => inc_counter_vec(&BLOCK_IMPORTS, &["future"]),
            Err(err) => {
                inc_counter_vec(&BLOCK_IMPORTS, &["rejected"]);
                debug!(%err, "Rejected block");
            }
        }
        result
    }

    fn import_inner(&self, bytes: &[u8]) -> Result<B256, ImportError> {
        let block = disassemble(bytes)?;
        let header = &block.header;
        let hash = header.hash();
        self.check_known(&hash)?;
        let parent = self
            .header(&header.parent_hash)?
            .ok_or(ImportError::UnknownParent(header.parent_hash))?;
        self.check_future_time(header)?;

        self.seal_engine
            .verify(Strictness::CheckEverything, header, Some(&parent), Some(bytes))?;

        let computed_uncles_hash = uncles_hash(&block.uncles);
        if computed_uncles_hash != header.uncles_hash {
            return Err(ImportError::UnclesHashMismatch {
                expected: header.uncles_hash,
                got: computed_uncles_hash,
            });
        }
        let transactions = block.decode_transactions()?;
        let computed_transactions_root = transactions_root(&transactions)?;
        if computed_transactions_root != header.transactions_root {
            return Err(ImportError::TransactionsRootMismatch {
                expected: header.transactions_root,
                got: computed_transactions_root,
            });
        }
        self.verify_uncles(header, &block.uncles)?;

        let mut context = ExecutionContext::for_import(header, self.post_state(&parent.hash())?);
        for (index, transaction) in transactions.iter().enumerate() {
            context
                .apply_transaction(transaction)
                .map_err(|err| ImportError::InvalidTransaction {
                    index,
                    reason: err.to_string(),
                })?;
        }
        context.set_uncles(block.uncles.clone());
        context.commit_to_seal()?;
        let executed = context.header();
        if executed.state_root != header.state_root {
            return Err(ImportError::StateRootMismatch {
                expected: header.state_root,
                got: executed.state_root,
            });
        }
        if executed.receipts_root != header.receipts_root {
            return Err(ImportError::ReceiptsRootMismatch {
                expected: header.receipts_root,
                got: executed.receipts_root,
            });
        }
        if executed.gas_used != header.gas_used {
            return Err(ImportError::GasUsedMismatch {
                expected: header.gas_used,
                got: executed.gas_used,
            });
        }

        let parent_details = self
            .details(&parent.hash())?
            .ok_or(ImportError::UnknownParent(parent.hash()))?;
        let details = BlockDetails {
            number: header.number,
            total_difficulty: parent_details.total_difficulty + header.difficulty,
        };
        self.insert_block(hash, bytes, header, context.accounts(), &details)?;

        let mut best = self.best.write();
        let best_details = self.details(&*best)?.ok_or(StateError::Undefined)?;
        if details.total_difficulty > best_details.total_difficulty {
            *best = hash;
        }
        Ok(hash)
    }

    pub(super) fn check_known(&self, hash: &B256) -> Result<(), ImportError> {
        if self.is_known(hash)? {
            return Err(ImportError::AlreadyKnown(*hash));
        }
        Ok(())
    }

    pub(super) fn check_future_time(&self, header: &Header) -> Result<(), ImportError> {
        if !self.allow_future_blocks {
            let now = timestamp_now();
            if header.timestamp > now {
                return Err(ImportError::FutureTime {
                    timestamp: header.timestamp,
                    now,
                });
            }
        }
        Ok(())
    }

    fn verify_uncles(&self, header: &Header, uncles: &[Header]) -> Result<(), ImportError> {
        if uncles.is_empty() {
            return Ok(());
        }
        if uncles.len() > MAX_UNCLES {
            return Err(ImportError::InvalidUncle {
                hash: uncles[MAX_UNCLES].hash(),
                reason: format!("a block may include at most {MAX_UNCLES} uncles"),
            });
        }

        // The uncle's parent must be one of these, so the uncle is at most MAX_UNCLE_DEPTH behind.
        let mut ancestors = vec![];
        let mut included = HashSet::new();
        let mut cursor = header.parent_hash;
        while ancestors.len() <= MAX_UNCLE_DEPTH {
            let Some(ancestor) = self.header(&cursor)? else {
                break;
            };
            if let Some(raw) = self.block_bytes(&cursor)? {
                included.extend(disassemble(&raw)?.uncles.iter().map(Header::hash));
            }
            cursor = ancestor.parent_hash;
            let is_genesis = ancestor.number == 0;
            ancestors.push(ancestor);
            if is_genesis {
                break;
            }
        }

        let mut seen = HashSet::new();
        for uncle in uncles {
            let hash = uncle.hash();
            let invalid = |reason: String| ImportError::InvalidUncle { hash, reason };
            if !seen.insert(hash) {
                return Err(invalid("duplicate uncle".to_owned()));
            }
            if ancestors.iter().any(|ancestor| ancestor.hash() == hash) {
                return Err(invalid("uncle is an ancestor".to_owned()));
            }
            if included.contains(&hash) {
                return Err(invalid("uncle already included".to_owned()));
            }
            let Some(uncle_parent) = ancestors
                .iter()
                .find(|ancestor| ancestor.hash() == uncle.parent_hash)
            else {
                return Err(invalid(format!(
                    "parent {} is not an ancestor within {MAX_UNCLE_DEPTH} generations",
                    uncle.parent_hash
                )));
            };
            self.seal_engine
                .verify(Strictness::IgnoreSeal, uncle, Some(uncle_parent), None)
                .map_err(|err| invalid(err.to_string()))?;
            self.seal_engine
                .verify(Strictness::JustSeal, uncle, None, None)
                .map_err(|err| invalid(err.to_string()))?;
        }
        Ok(())
    }

    /// Import every block `queue` verified, in queue order. Failures are logged and skipped.
    pub async fn sync(&self, queue: BlockQueue) -> Vec<B256> {
        let mut imported = vec![];
        for (hash, verified) in queue.drain().await {
            let bytes = match verified {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%hash, %err, "Queued block failed verification");
                    continue;
                }
            };
            match self.import(&bytes) {
                Ok(hash) => imported.push(hash),
                Err(err) => debug!(%hash, %err, "Queued block was not imported"),
            }
        }
        imported
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use alloy_primitives::Address;

    use super::*;
    use crate::{
        block::container::assemble,
        chain::block_reward::BASE_BLOCK_REWARD,
        seal::NoProof,
        types::account::Account,
    };

    fn accounts() -> AccountMap {
        let mut accounts = AccountMap::new();
        accounts.insert(
            Address::from_str("0xa94f5374fce5edbc8e2a8697c15331677e6ebf0b").unwrap(),
            Account::with_balance(U256::from(10_000_000_000u64)),
        );
        accounts
    }

    fn genesis() -> Header {
        Header {
            author: Address::repeat_byte(0x88),
            state_root: StateSnapshot::from_accounts(&accounts()).unwrap().root(),
            difficulty: U256::from(131_072),
            gas_limit: U256::from(3_141_592),
            timestamp: 1_422_494_849,
            ..Default::default()
        }
    }

    fn open() -> ChainStore {
        ChainStore::open(
            &assemble(&genesis(), &[], &[]),
            &accounts(),
            Arc::new(NoProof),
            false,
        )
        .unwrap()
    }

    fn child(store: &ChainStore, parent: &B256, timestamp: u64, author: Address) -> Vec<u8> {
        let parent_header = store.header(parent).unwrap().unwrap();
        let mut context = ExecutionContext::new(
            &parent_header,
            store.post_state(parent).unwrap(),
            timestamp,
        )
        .unwrap();
        context.set_author(author);
        context.commit_to_seal().unwrap();
        assemble(context.header(), &[], &[])
    }

    #[test_log::test]
    fn genesis_must_match_accounts() {
        let mut header = genesis();
        header.state_root = B256::repeat_byte(1);
        let result = ChainStore::open(
            &assemble(&header, &[], &[]),
            &accounts(),
            Arc::new(NoProof),
            false,
        );
        assert!(matches!(result, Err(HarnessError::UnknownGenesis { .. })));
    }

    #[test_log::test]
    fn imports_child_and_moves_best() {
        let store = open();
        let genesis_hash = store.genesis_hash();
        let bytes = child(&store, &genesis_hash, 0, Address::repeat_byte(0x88));

        let hash = store.import(&bytes).unwrap();
        assert_eq!(store.best_hash(), hash);
        assert_eq!(store.best_block_bytes().unwrap(), bytes);
        assert_eq!(store.details(&hash).unwrap().unwrap().number, 1);
        assert!(matches!(
            store.import(&bytes),
            Err(ImportError::AlreadyKnown(_))
        ));
    }

    #[test_log::test]
    fn rejects_unknown_parent_and_bad_state_root() {
        let store = open();
        let genesis_hash = store.genesis_hash();

        let mut orphan = disassemble(&child(&store, &genesis_hash, 0, Address::ZERO))
            .unwrap()
            .header;
        orphan.parent_hash = B256::repeat_byte(7);
        assert!(matches!(
            store.import(&assemble(&orphan, &[], &[])),
            Err(ImportError::UnknownParent(_))
        ));

        let mut wrong_root = disassemble(&child(&store, &genesis_hash, 0, Address::ZERO))
            .unwrap()
            .header;
        wrong_root.state_root = B256::repeat_byte(9);
        assert!(matches!(
            store.import(&assemble(&wrong_root, &[], &[])),
            Err(ImportError::StateRootMismatch { .. })
        ));
    }

    #[test_log::test]
    fn rejects_future_blocks() {
        let store = open();
        let genesis_hash = store.genesis_hash();
        let bytes = child(&store, &genesis_hash, timestamp_now() + 3_600, Address::ZERO);
        let err = store.import(&bytes).unwrap_err();
        assert!(err.is_future_time());
    }

    #[test_log::test]
    fn imports_block_with_uncle() {
        let store = open();
        let genesis_hash = store.genesis_hash();

        let first = child(&store, &genesis_hash, 0, Address::repeat_byte(0x88));
        let sibling = child(&store, &genesis_hash, 0, Address::repeat_byte(0x11));
        let first_hash = store.import(&first).unwrap();
        store.import(&sibling).unwrap();
        let uncle = disassemble(&sibling).unwrap().header;

        let parent_header = store.header(&first_hash).unwrap().unwrap();
        let mut context = ExecutionContext::new(
            &parent_header,
            store.post_state(&first_hash).unwrap(),
            0,
        )
        .unwrap();
        context.set_author(Address::repeat_byte(0x88));
        context.set_uncles(vec![uncle.clone()]);
        context.commit_to_seal().unwrap();
        let bytes = assemble(context.header(), &[], &[uncle.clone()]);
        let hash = store.import(&bytes).unwrap();

        assert_eq!(store.best_hash(), hash);
        // the sibling's own reward lives on the other branch, only the uncle reward counts here
        let uncle_reward = store.post_state(&hash).unwrap()[&Address::repeat_byte(0x11)].balance;
        assert_eq!(
            uncle_reward,
            U256::from(BASE_BLOCK_REWARD) * U256::from(7) / U256::from(8)
        );

        // including the same uncle again is refused
        let parent_header = store.header(&hash).unwrap().unwrap();
        let mut context =
            ExecutionContext::new(&parent_header, store.post_state(&hash).unwrap(), 0).unwrap();
        context.set_uncles(vec![uncle.clone()]);
        context.commit_to_seal().unwrap();
        let again = assemble(context.header(), &[], &[uncle]);
        assert!(matches!(
            store.import(&again),
            Err(ImportError::InvalidUncle { .. })
        ));
    }
}
