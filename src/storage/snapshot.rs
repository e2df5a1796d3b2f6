use std::{fmt, path::Path, sync::Arc};

use alloy_primitives::{keccak256, Address, B256};
use alloy_rlp::Decodable;
use eth_trie::{EthTrie, Trie};
use redb::{Database as ReDB, ReadableTable, TableDefinition};
use tempfile::TempDir;
use tracing::debug;

use super::{
    error::StateError,
    node_db::{NodeDB, NodeSpace},
    utils::setup_redb,
};
use crate::{
    types::{
        account::{Account, AccountMap, AccountRecord, AccountState},
        header::EMPTY_ROOT_HASH,
    },
    utils::setup_temp_dir,
};

const ACCOUNTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("accounts");

/// An isolated account store living in its own temporary directory.
///
/// Two snapshots never share storage: copying goes through [`StateSnapshot::try_clone`] which
/// exports every account and reimports it into a fresh directory. The directory is removed when
/// the snapshot is dropped.
pub struct StateSnapshot {
    root: B256,
    trie: EthTrie<NodeDB>,
    db: Arc<ReDB>,
    temp_dir: TempDir,
}

impl fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("root", &self.root)
            .field("path", &self.temp_dir.path())
            .finish()
    }
}

impl StateSnapshot {
    /// Open an empty snapshot in a fresh temporary directory.
    pub fn new() -> Result<Self, StateError> {
        let temp_dir = setup_temp_dir()?;
        let db = Arc::new(setup_redb(temp_dir.path())?);
        let txn = db.begin_write()?;
        txn.open_table(ACCOUNTS_TABLE)?;
        txn.commit()?;
        let trie = EthTrie::new(Arc::new(NodeDB::accounts(db.clone())?));
        Ok(Self {
            root: EMPTY_ROOT_HASH,
            trie,
            db,
            temp_dir,
        })
    }

    /// Open a snapshot seeded with `accounts`.
    pub fn from_accounts(accounts: &AccountMap) -> Result<Self, StateError> {
        let mut snapshot = Self::new()?;
        snapshot.import_accounts(accounts)?;
        Ok(snapshot)
    }

    /// Write `accounts` over the current state and commit, returning the new state root.
    pub fn import_accounts(&mut self, accounts: &AccountMap) -> Result<B256, StateError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ACCOUNTS_TABLE)?;
            for (address, account) in accounts {
                let record = alloy_rlp::encode(AccountRecord::new(*address, account));
                table.insert(address.as_slice(), record.as_slice())?;
            }
        }
        txn.commit()?;

        for (address, account) in accounts {
            let address_hash = keccak256(address);
            let account_state = AccountState {
                nonce: account.nonce,
                balance: account.balance,
                storage_root: self.commit_storage(address_hash, account)?,
                code_hash: account.code_hash(),
            };
            self.trie.insert(
                address_hash.as_slice(),
                &alloy_rlp::encode(&account_state),
            )?;
        }

        self.root = self.trie.root_hash()?;
        debug!(root = %self.root, accounts = accounts.len(), "Committed state snapshot");
        Ok(self.root)
    }

    fn commit_storage(&self, address_hash: B256, account: &Account) -> Result<B256, StateError> {
        if account.storage.is_empty() {
            return Ok(EMPTY_ROOT_HASH);
        }
        let mut storage_trie = EthTrie::new(Arc::new(NodeDB::storage(
            address_hash,
            self.db.clone(),
        )?));
        for (key, value) in &account.storage {
            storage_trie.insert(
                keccak256(key.to_be_bytes::<32>()).as_slice(),
                &alloy_rlp::encode(value),
            )?;
        }
        Ok(storage_trie.root_hash()?)
    }

    pub fn root(&self) -> B256 {
        self.root
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ACCOUNTS_TABLE)?;
        let Some(raw_record) = table.get(address.as_slice())? else {
            return Ok(None);
        };
        let record = AccountRecord::decode(&mut raw_record.value())?;
        Ok(Some(record.into_account().1))
    }

    /// Read an account the way the state trie commits to it.
    pub fn account_state(&self, address: &Address) -> Result<Option<AccountState>, StateError> {
        match self.trie.get(keccak256(address).as_slice())? {
            Some(raw_state) => Ok(Some(AccountState::decode(&mut raw_state.as_slice())?)),
            None => Ok(None),
        }
    }

    /// Every account held by the snapshot.
    pub fn export(&self) -> Result<AccountMap, StateError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ACCOUNTS_TABLE)?;
        let mut accounts = AccountMap::new();
        for entry in table.iter()? {
            let (_, raw_record) = entry?;
            let (address, account) = AccountRecord::decode(&mut raw_record.value())?.into_account();
            accounts.insert(address, account);
        }
        Ok(accounts)
    }

    /// Deep copy into a new temporary directory.
    pub fn try_clone(&self) -> Result<Self, StateError> {
        let copy = Self::from_accounts(&self.export()?)?;
        debug!(
            from = %self.temp_dir.path().display(),
            to = %copy.temp_dir.path().display(),
            "Copied state snapshot"
        );
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, U256};

    use super::*;

    fn accounts() -> AccountMap {
        let mut contract = Account::with_balance(U256::from(7));
        contract.code = Bytes::from(vec![0x60, 0x01]);
        contract.set_storage(U256::from(1), U256::from(0xff));
        AccountMap::from([
            (
                Address::repeat_byte(0xa9),
                Account::with_balance(U256::from(10_000_000_000u64)),
            ),
            (Address::repeat_byte(0x09), contract),
        ])
    }

    #[test_log::test]
    fn empty_snapshot_has_empty_root() {
        let snapshot = StateSnapshot::new().unwrap();
        assert_eq!(snapshot.root(), EMPTY_ROOT_HASH);
        assert!(snapshot.export().unwrap().is_empty());
    }

    #[test_log::test]
    fn import_commits_root_and_accounts() {
        let snapshot = StateSnapshot::from_accounts(&accounts()).unwrap();
        assert_ne!(snapshot.root(), EMPTY_ROOT_HASH);
        assert_ne!(snapshot.root(), B256::ZERO);
        assert_eq!(snapshot.export().unwrap(), accounts());

        let state = snapshot
            .account_state(&Address::repeat_byte(0x09))
            .unwrap()
            .unwrap();
        assert_eq!(state.balance, U256::from(7));
        assert_ne!(state.storage_root, EMPTY_ROOT_HASH);
        assert_eq!(state.code_hash, keccak256([0x60, 0x01]));
        assert!(snapshot
            .account(&Address::repeat_byte(0x01))
            .unwrap()
            .is_none());
    }

    #[test_log::test]
    fn same_accounts_same_root() {
        let first = StateSnapshot::from_accounts(&accounts()).unwrap();
        let second = StateSnapshot::from_accounts(&accounts()).unwrap();
        assert_eq!(first.root(), second.root());
        assert_ne!(first.path(), second.path());
    }

    #[test_log::test]
    fn clone_is_isolated() {
        let original = StateSnapshot::from_accounts(&accounts()).unwrap();
        let mut copy = original.try_clone().unwrap();
        assert_eq!(copy.root(), original.root());

        let update = AccountMap::from([(
            Address::repeat_byte(0xa9),
            Account::with_balance(U256::from(1)),
        )]);
        copy.import_accounts(&update).unwrap();
        assert_ne!(copy.root(), original.root());
        assert_eq!(
            original
                .account(&Address::repeat_byte(0xa9))
                .unwrap()
                .unwrap()
                .balance,
            U256::from(10_000_000_000u64)
        );
    }

    #[test_log::test]
    fn drop_removes_directory() {
        let snapshot = StateSnapshot::from_accounts(&accounts()).unwrap();
        let path = snapshot.path().to_path_buf();
        assert!(path.exists());
        drop(snapshot);
        assert!(!path.exists());
    }
}
