use std::{collections::HashSet, sync::Arc};

use alloy_primitives::B256;
use thiserror::Error;
use tokio::{
    sync::{AcquireError, Semaphore},
    task::{JoinError, JoinHandle},
};
use tracing::{debug, trace};

use super::{error::ImportError, store::ChainStore};
use crate::{
    block::container::disassemble,
    seal::{SealEngine, SealError, Strictness},
};

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("seal verification failed: {0}")]
    Seal(#[from] SealError),

    #[error("verification task failed: {0}")]
    Join(#[from] JoinError),

    #[error("verification workers were shut down: {0}")]
    Closed(#[from] AcquireError),
}

type Verification = JoinHandle<Result<Vec<u8>, VerificationError>>;

/// Blocks waiting to be imported into a [`ChainStore`].
///
/// Cheap checks run on [`BlockQueue::import`]. Seal verification runs in the background on a
/// bounded number of workers and is collected by [`BlockQueue::drain`].
#[derive(Debug)]
pub struct BlockQueue {
    seal_engine: Arc<dyn SealEngine>,
    workers: Arc<Semaphore>,
    queued: HashSet<B256>,
    verifications: Vec<(B256, Verification)>,
}

impl BlockQueue {
    pub fn new(seal_engine: Arc<dyn SealEngine>, workers: usize) -> Self {
        Self {
            seal_engine,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            queued: HashSet::new(),
            verifications: vec![],
        }
    }

    /// Queue an encoded block for verification. Must be called within a tokio runtime.
    pub fn import(&mut self, bytes: &[u8], store: &ChainStore) -> Result<B256, ImportError> {
        let header = disassemble(bytes)?.header;
        let hash = header.hash();
        store.check_known(&hash)?;
        if self.queued.contains(&hash) {
            return Err(ImportError::AlreadyQueued(hash));
        }
        if !store.is_known(&header.parent_hash)? && !self.queued.contains(&header.parent_hash) {
            return Err(ImportError::UnknownParent(header.parent_hash));
        }
        store.check_future_time(&header)?;

        let seal_engine = self.seal_engine.clone();
        let workers = self.workers.clone();
        let bytes = bytes.to_vec();
        let verification = tokio::spawn(async move {
            let permit = workers.acquire_owned().await?;
            let verified = tokio::task::spawn_blocking(move || {
                seal_engine
                    .verify(Strictness::CheckNothingNew, &header, None, Some(&bytes))
                    .map(|_| bytes)
            })
            .await?;
            drop(permit);
            Ok::<_, VerificationError>(verified?)
        });

        trace!(%hash, "Queued block for verification");
        self.queued.insert(hash);
        self.verifications.push((hash, verification));
        Ok(hash)
    }

    pub fn len(&self) -> usize {
        self.verifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifications.is_empty()
    }

    pub fn contains(&self, hash: &B256) -> bool {
        self.queued.contains(hash)
    }

    /// Wait for every verification, in queue order.
    pub async fn drain(self) -> Vec<(B256, Result<Vec<u8>, VerificationError>)> {
        let mut results = Vec::with_capacity(self.verifications.len());
        for (hash, verification) in self.verifications {
            let result = match verification.await {
                Ok(result) => result,
                Err(err) => Err(err.into()),
            };
            debug!(%hash, verified = result.is_ok(), "Drained queued block");
            results.push((hash, result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};

    use super::*;
    use crate::{
        block::container::assemble,
        seal::{KeccakPow, NoProof},
        storage::snapshot::StateSnapshot,
        types::{
            account::{Account, AccountMap},
            header::Header,
        },
    };

    fn store(engine: Arc<dyn SealEngine>) -> ChainStore {
        let mut accounts = AccountMap::new();
        accounts.insert(
            Address::repeat_byte(0xa9),
            Account::with_balance(U256::from(10_000_000_000u64)),
        );
        let genesis = Header {
            state_root: StateSnapshot::from_accounts(&accounts).unwrap().root(),
            difficulty: U256::from(131_072),
            gas_limit: U256::from(3_141_592),
            timestamp: 1_422_494_849,
            ..Default::default()
        };
        ChainStore::open(&assemble(&genesis, &[], &[]), &accounts, engine, false).unwrap()
    }

    fn child(store: &ChainStore, author: Address) -> Header {
        let mut context = store.execution_context().unwrap();
        context.set_author(author);
        context.commit_to_seal().unwrap();
        context.header().clone()
    }

    #[test_log::test(tokio::test)]
    async fn queued_blocks_sync_into_store() {
        let store = store(Arc::new(NoProof));
        let mut queue = BlockQueue::new(Arc::new(NoProof), 2);

        let first = assemble(&child(&store, Address::repeat_byte(1)), &[], &[]);
        let second = assemble(&child(&store, Address::repeat_byte(2)), &[], &[]);
        queue.import(&first, &store).unwrap();
        queue.import(&second, &store).unwrap();
        assert!(matches!(
            queue.import(&first, &store),
            Err(ImportError::AlreadyQueued(_))
        ));
        assert_eq!(queue.len(), 2);

        let imported = store.sync(queue).await;
        assert_eq!(imported.len(), 2);
        assert!(imported.iter().all(|hash| store.is_known(hash).unwrap()));
    }

    #[test_log::test(tokio::test)]
    async fn unknown_parent_is_refused() {
        let store = store(Arc::new(NoProof));
        let mut queue = BlockQueue::new(Arc::new(NoProof), 1);
        let mut orphan = child(&store, Address::ZERO);
        orphan.parent_hash = B256::repeat_byte(0xee);
        assert!(matches!(
            queue.import(&assemble(&orphan, &[], &[]), &store),
            Err(ImportError::UnknownParent(_))
        ));
        assert!(queue.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn bad_seal_fails_verification() {
        let engine: Arc<dyn SealEngine> = Arc::new(KeccakPow::default());
        let store = store(engine.clone());
        let mut queue = BlockQueue::new(engine, 1);

        // never mined, so the mix hash does not match
        let bytes = assemble(&child(&store, Address::ZERO), &[], &[]);
        let hash = queue.import(&bytes, &store).unwrap();
        let drained = queue.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, hash);
        assert!(matches!(drained[0].1, Err(VerificationError::Seal(_))));
    }
}
