use std::sync::Arc;

use alloy_primitives::B256;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    assembler::{construct_header, recalculate, RecalcMode},
    container::{assemble, disassemble},
    overrides::OverrideSet,
    test_transaction::TestTransaction,
    transaction_queue::TransactionQueue,
};
use crate::{
    chain::{executor::ZeroGasPricer, test_chain::TestChain},
    error::HarnessError,
    metrics::{start_timer_vec, stop_timer, BLOCK_HARNESS_TIMES},
    report::{Failure, FailureKind, Report},
    seal::{SealEngine, Strictness},
    storage::{error::StateError, snapshot::StateSnapshot},
    types::{
        account::{account_map_from_json, AccountMap},
        field::{FieldError, HeaderField, SparseFieldSet},
        header::Header,
        transaction::TransactionError,
    },
};

/// A block under test: a header, the pending transactions and uncles it carries, the state it
/// commits to and its current encoding.
///
/// The encoding is refreshed on every mutation. Failures that should not abort a test are kept
/// in [`TestBlock::report`].
#[derive(Debug)]
pub struct TestBlock {
    header: Header,
    bytes: Vec<u8>,
    transactions: Vec<TestTransaction>,
    transaction_queue: TransactionQueue,
    uncles: Vec<TestBlock>,
    state: Option<StateSnapshot>,
    accounts: AccountMap,
    premine: OverrideSet,
    seal_engine: Arc<dyn SealEngine>,
    report: Report,
}

struct Mined {
    header: Header,
    state: StateSnapshot,
    accounts: AccountMap,
    excluded: Vec<B256>,
}

impl TestBlock {
    /// An empty block with a default header and no state.
    pub fn new(seal_engine: Arc<dyn SealEngine>) -> Self {
        let header = Header::default();
        Self {
            bytes: assemble(&header, &[], &[]),
            header,
            transactions: vec![],
            transaction_queue: TransactionQueue::new(),
            uncles: vec![],
            state: None,
            accounts: AccountMap::new(),
            premine: OverrideSet::new(),
            seal_engine,
            report: Report::default(),
        }
    }

    /// Build a block from sparse header fields and the accounts of its state.
    ///
    /// When `accounts` is not empty the state root is taken from them. A header that cannot be
    /// constructed is reported and the default header is used instead.
    pub fn from_fields(
        fields: &SparseFieldSet,
        accounts: &AccountMap,
        mode: RecalcMode,
        seal_engine: Arc<dyn SealEngine>,
    ) -> Result<Self, HarnessError> {
        Self::from_fields_with_report(fields, accounts, mode, seal_engine, Report::default())
    }

    fn from_fields_with_report(
        fields: &SparseFieldSet,
        accounts: &AccountMap,
        mode: RecalcMode,
        seal_engine: Arc<dyn SealEngine>,
        report: Report,
    ) -> Result<Self, HarnessError> {
        let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["construct"]);
        let mut block = Self::new(seal_engine);
        block.report = report;

        let state = StateSnapshot::from_accounts(accounts)?;
        let state_root = (!accounts.is_empty()).then(|| state.root());
        block.state = Some(state);
        block.accounts = accounts.clone();

        match construct_header(fields, state_root) {
            Ok(header) => block.header = header,
            Err(err) => block.report.record(
                FailureKind::HeaderConstruction,
                format!("block population did throw an exception: {err}"),
            ),
        }
        stop_timer(timer);

        block.recalculate(mode)?;
        Ok(block)
    }

    /// Build a block from fixture objects: the header fields and the account state.
    pub fn from_json(
        header: &Map<String, Value>,
        state: &Map<String, Value>,
        mode: RecalcMode,
        seal_engine: Arc<dyn SealEngine>,
    ) -> Result<Self, HarnessError> {
        let mut report = Report::default();
        let accounts = account_map_from_json(state).unwrap_or_else(|err| {
            report.record(FailureKind::AccountImport, err.to_string());
            AccountMap::new()
        });
        let fields = SparseFieldSet::from_json(header).unwrap_or_else(|err| {
            report.record(FailureKind::HeaderConstruction, err.to_string());
            SparseFieldSet::new()
        });
        Self::from_fields_with_report(&fields, &accounts, mode, seal_engine, report)
    }

    /// Rebuild a block from its encoding. The bytes are kept as given.
    pub fn from_rlp(bytes: &[u8], seal_engine: Arc<dyn SealEngine>) -> Result<Self, HarnessError> {
        let decoded = disassemble(bytes)?;
        let mut block = Self::new(seal_engine.clone());

        if let Err(err) = seal_engine.verify(Strictness::IgnoreSeal, &decoded.header, None, None) {
            block.report.record(FailureKind::SealVerification, err.to_string());
        }
        block.header = decoded.header;

        for (index, raw) in decoded.transactions.iter().enumerate() {
            match block.transaction_queue.import(raw) {
                Ok(hash) => {
                    if let Some(transaction) = block.transaction_queue.pending().last() {
                        debug!(%hash, index, "Reimported transaction");
                        block
                            .transactions
                            .push(TestTransaction::new(transaction.clone()));
                    }
                }
                Err(err) => block.report.record(
                    FailureKind::TransactionImport,
                    format!("transaction {index} was not imported: {err}"),
                ),
            }
        }

        for uncle_header in decoded.uncles {
            if let Err(err) = seal_engine.verify(Strictness::IgnoreSeal, &uncle_header, None, None)
            {
                block.report.record(
                    FailureKind::SealVerification,
                    format!("uncle {}: {err}", uncle_header.hash()),
                );
            }
            let mut uncle = Self::new(seal_engine.clone());
            uncle.set_header(uncle_header, RecalcMode::None)?;
            block.uncles.push(uncle);
        }

        block.bytes = bytes.to_vec();
        Ok(block)
    }

    /// Re-derive the header fields that depend on the content and refresh the encoding.
    pub fn recalculate(&mut self, mode: RecalcMode) -> Result<(), HarnessError> {
        let uncles = self.uncle_headers();
        let recalculated = recalculate(
            &mut self.header,
            self.transaction_queue.pending(),
            &uncles,
            mode,
            self.seal_engine.as_ref(),
            &self.premine,
        )?;
        if let Err(err) = recalculated.verification {
            self.report.record(
                FailureKind::SealVerification,
                format!("block header verification failed: {err}"),
            );
        }
        self.bytes = recalculated.bytes;
        Ok(())
    }

    fn reassemble(&mut self) {
        self.bytes = assemble(
            &self.header,
            self.transaction_queue.pending(),
            &self.uncle_headers(),
        );
    }

    fn uncle_headers(&self) -> Vec<Header> {
        self.uncles.iter().map(|uncle| uncle.header.clone()).collect()
    }

    /// Execute the pending transactions on top of `chain`'s best block and seal the result.
    ///
    /// Only zero difficulty is fatal. Any other failure is reported and leaves the block as it
    /// was.
    pub fn mine(&mut self, chain: &TestChain) -> Result<(), HarnessError> {
        let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["mine"]);
        let result = self.mine_on(chain);
        stop_timer(timer);

        let mined = match result {
            Ok(mined) => mined,
            Err(HarnessError::ZeroDifficulty) => return Err(HarnessError::ZeroDifficulty),
            Err(err) => {
                self.report.record(
                    FailureKind::Mining,
                    format!("block sync or mining did throw an exception: {err}"),
                );
                return Ok(());
            }
        };

        // transactions that failed execution are not part of the mined block
        for hash in &mined.excluded {
            self.transaction_queue.remove(hash);
            self.transactions
                .retain(|transaction| &transaction.transaction().hash() != hash);
        }
        self.header = mined.header;
        self.state = Some(mined.state);
        self.accounts = mined.accounts;
        self.recalculate(RecalcMode::UpdateAndVerify)
    }

    fn mine_on(&self, chain: &TestChain) -> Result<Mined, HarnessError> {
        let mut context = chain.execution_context()?;
        context.set_author(chain.genesis().header().author);
        context.apply_overrides(&self.premine, &self.header);
        let excluded = context.execute_transactions(&self.transaction_queue, &ZeroGasPricer);
        context.set_uncles(self.uncle_headers());
        context.commit_to_seal()?;

        let mut header = context.header().clone();
        self.premine.apply_results(&self.header, &mut header);
        if header.difficulty.is_zero() {
            return Err(HarnessError::ZeroDifficulty);
        }
        let header = self.seal_engine.mine(&header)?;
        self.seal_engine
            .verify(Strictness::JustSeal, &header, None, None)?;

        let accounts = context.accounts().clone();
        Ok(Mined {
            header,
            state: context.into_state()?,
            accounts,
            excluded,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    pub fn state(&self) -> Result<&StateSnapshot, StateError> {
        self.state.as_ref().ok_or(StateError::Undefined)
    }

    /// Accounts the block's state was built from.
    pub fn accounts(&self) -> &AccountMap {
        &self.accounts
    }

    pub fn test_transactions(&self) -> &[TestTransaction] {
        &self.transactions
    }

    pub fn transaction_queue(&self) -> &TransactionQueue {
        &self.transaction_queue
    }

    pub fn uncles(&self) -> &[TestBlock] {
        &self.uncles
    }

    pub fn seal_engine(&self) -> &Arc<dyn SealEngine> {
        &self.seal_engine
    }

    pub fn premine(&self) -> &OverrideSet {
        &self.premine
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn failures(&self) -> &[Failure] {
        self.report.failures()
    }

    pub fn set_header(&mut self, header: Header, mode: RecalcMode) -> Result<(), HarnessError> {
        self.header = header;
        self.recalculate(mode)
    }

    /// Queue a transaction. A rejected one is reported and left out.
    pub fn add_transaction(
        &mut self,
        transaction: TestTransaction,
    ) -> Result<B256, TransactionError> {
        match self
            .transaction_queue
            .import_transaction(transaction.transaction().clone())
        {
            Ok(hash) => {
                self.transactions.push(transaction);
                self.reassemble();
                Ok(hash)
            }
            Err(err) => {
                self.report.record(
                    FailureKind::TransactionImport,
                    format!("test transaction was not imported: {err}"),
                );
                Err(err)
            }
        }
    }

    pub fn add_uncle(&mut self, uncle: TestBlock) {
        self.uncles.push(uncle);
        self.reassemble();
    }

    pub fn set_uncles(&mut self, uncles: Vec<TestBlock>) {
        self.uncles = uncles;
        self.reassemble();
    }

    /// Replace the state with a copy of `state`.
    pub fn set_state(&mut self, state: &StateSnapshot) -> Result<(), StateError> {
        let copy = state.try_clone()?;
        self.accounts = copy.export()?;
        self.state = Some(copy);
        Ok(())
    }

    pub(crate) fn install_state(&mut self, accounts: AccountMap) -> Result<(), StateError> {
        self.state = Some(StateSnapshot::from_accounts(&accounts)?);
        self.accounts = accounts;
        Ok(())
    }

    /// Keep the current value of `field` when the block is mined. Seal fields are refused.
    pub fn set_premine(&mut self, field: HeaderField) -> bool {
        self.premine.insert(field)
    }

    pub fn set_premine_by_name(&mut self, name: &str) -> Result<bool, FieldError> {
        Ok(self.set_premine(name.parse()?))
    }

    /// Drop the state of this block and of every uncle it owns.
    pub fn clear_state(&mut self) {
        self.state = None;
        for uncle in &mut self.uncles {
            uncle.clear_state();
        }
    }
}

impl Clone for TestBlock {
    fn clone(&self) -> Self {
        let state = match &self.state {
            Some(state) => match state.try_clone() {
                Ok(copy) => Some(copy),
                Err(err) => {
                    warn!(%err, hash = %self.hash(), "Failed to copy block state");
                    None
                }
            },
            None => {
                debug!(hash = %self.hash(), "Copying block with undefined state");
                None
            }
        };

        let mut transaction_queue = TransactionQueue::new();
        for transaction in self.transaction_queue.pending() {
            if let Err(err) = transaction_queue.import(&alloy_rlp::encode(transaction)) {
                warn!(%err, hash = %transaction.hash(), "Failed to copy pending transaction");
            }
        }

        Self {
            header: self.header.clone(),
            bytes: self.bytes.clone(),
            transactions: self.transactions.clone(),
            transaction_queue,
            uncles: self.uncles.clone(),
            state,
            accounts: self.accounts.clone(),
            premine: self.premine.clone(),
            seal_engine: self.seal_engine.clone(),
            report: self.report.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{b256, U256};

    use super::*;
    use crate::{
        chain::test_chain::TestChain,
        seal::NoProof,
        types::field::FieldValue,
    };

    fn engine() -> Arc<dyn SealEngine> {
        Arc::new(NoProof)
    }

    fn genesis() -> TestBlock {
        TestChain::default_genesis_block(engine()).unwrap()
    }

    #[test_log::test]
    fn default_genesis_scenario() {
        let block = genesis();
        assert_eq!(block.header().difficulty, U256::from(131_072));
        assert_eq!(block.header().number, 0);
        assert_eq!(
            block.header().state_root,
            b256!("f99eb1626cfa6db435c0836235942d7ccaa935f1ae247d3f1c21e495685f903a")
        );
        assert_eq!(block.header().state_root, block.state().unwrap().root());
        assert!(block.report().is_empty());
        assert_eq!(disassemble(block.bytes()).unwrap().header, *block.header());
    }

    #[test_log::test]
    fn empty_accounts_keep_given_state_root() {
        let root = B256::repeat_byte(0x42);
        let fields = SparseFieldSet::new()
            .with(HeaderField::Difficulty, "131072")
            .with(HeaderField::GasLimit, "3141592")
            .with(HeaderField::StateRoot, root.to_string());
        let block =
            TestBlock::from_fields(&fields, &AccountMap::new(), RecalcMode::Update, engine())
                .unwrap();
        assert_eq!(block.header().state_root, root);
    }

    #[test_log::test]
    fn malformed_header_is_reported() {
        let fields = SparseFieldSet::new()
            .with(HeaderField::Difficulty, "131072")
            .with(HeaderField::Coinbase, "0xzz");
        let block =
            TestBlock::from_fields(&fields, &AccountMap::new(), RecalcMode::None, engine())
                .unwrap();
        assert!(block.report().has(FailureKind::HeaderConstruction));
        assert_eq!(*block.header(), Header::default());
    }

    #[test_log::test]
    fn malformed_state_json_is_reported() {
        let header: Map<String, Value> = serde_json::from_str(
            r#"{"difficulty": "131072", "gasLimit": "3141592", "hash": "0x00"}"#,
        )
        .unwrap();
        let state: Map<String, Value> =
            serde_json::from_str(r#"{"not an address": {"balance": "1"}}"#).unwrap();

        let block =
            TestBlock::from_json(&header, &state, RecalcMode::UpdateAndVerify, engine()).unwrap();
        assert!(block.report().has(FailureKind::AccountImport));
        assert!(block.accounts().is_empty());
        assert_eq!(block.header().difficulty, U256::from(131_072));
    }

    #[test_log::test]
    fn zero_difficulty_is_fatal() {
        let fields = SparseFieldSet::new().with(HeaderField::Difficulty, "0");
        let result = TestBlock::from_fields(
            &fields,
            &TestChain::default_account_map(),
            RecalcMode::UpdateAndVerify,
            engine(),
        );
        assert!(matches!(result, Err(HarnessError::ZeroDifficulty)));
    }

    #[test_log::test]
    fn from_rlp_keeps_bytes() {
        let mut block = genesis();
        block
            .add_transaction(TestTransaction::default_transaction().unwrap())
            .unwrap();
        let mut uncle = genesis();
        uncle
            .set_header(
                Header {
                    number: 1,
                    ..uncle.header().clone()
                },
                RecalcMode::None,
            )
            .unwrap();
        block.add_uncle(uncle);

        let rebuilt = TestBlock::from_rlp(block.bytes(), engine()).unwrap();
        assert_eq!(rebuilt.bytes(), block.bytes());
        assert_eq!(rebuilt.header(), block.header());
        assert_eq!(rebuilt.test_transactions().len(), 1);
        assert_eq!(rebuilt.uncles().len(), 1);
        assert!(rebuilt.state().is_err());

        let mut reassembled = rebuilt.clone();
        reassembled.recalculate(RecalcMode::None).unwrap();
        assert_eq!(reassembled.bytes(), block.bytes());
    }

    #[test]
    fn from_rlp_rejects_garbage() {
        assert!(matches!(
            TestBlock::from_rlp(&[0xc0], engine()),
            Err(HarnessError::Decode(_))
        ));
    }

    #[test_log::test]
    fn duplicate_transaction_is_reported() {
        let mut block = genesis();
        let transaction = TestTransaction::default_transaction().unwrap();
        block.add_transaction(transaction.clone()).unwrap();
        assert!(matches!(
            block.add_transaction(transaction),
            Err(TransactionError::AlreadyPending(_))
        ));
        assert!(block.report().has(FailureKind::TransactionImport));
        assert_eq!(block.transaction_queue().len(), 1);
    }

    #[test_log::test]
    fn premine_refuses_seal_fields() {
        let mut block = genesis();
        assert!(!block.set_premine(HeaderField::Nonce));
        assert!(block.set_premine_by_name("timestamp").unwrap());
        assert!(block.set_premine_by_name("wrong").is_err());
        assert!(block.premine().contains(HeaderField::Timestamp));
    }

    #[test_log::test]
    fn clone_owns_its_state() {
        let block = genesis();
        let copy = block.clone();
        let original = block.state().unwrap();
        let copied = copy.state().unwrap();
        assert_eq!(original.root(), copied.root());
        assert_ne!(original.path(), copied.path());
        assert_eq!(copy.bytes(), block.bytes());
    }

    #[test_log::test]
    fn clear_state_reaches_uncles_only_downwards() {
        let mut block = genesis();
        block.set_uncles(vec![genesis(), genesis()]);

        let mut sibling = block.clone();
        let mut uncles = sibling.uncles().to_vec();
        uncles[0].clear_state();
        assert!(uncles[0].state().is_err());
        assert!(uncles[1].state().is_ok());
        sibling.set_uncles(uncles);

        block.clear_state();
        assert!(block.state().is_err());
        assert!(block.uncles().iter().all(|uncle| uncle.state().is_err()));
        assert!(sibling.state().is_ok());
        assert!(sibling.uncles()[1].state().is_ok());
    }

    #[test]
    fn header_values_survive_construction() {
        let fields = SparseFieldSet::new()
            .with(HeaderField::Difficulty, "0x020000")
            .with(HeaderField::GasLimit, "3141592")
            .with(HeaderField::ExtraData, "0x42")
            .with(HeaderField::Timestamp, "0x54c98c81");
        let block = TestBlock::from_fields(
            &fields,
            &AccountMap::new(),
            RecalcMode::None,
            engine(),
        )
        .unwrap();
        for (field, text) in fields.iter() {
            assert_eq!(
                block.header().field_value(field),
                FieldValue::parse(field, text).unwrap()
            );
        }
    }
}
