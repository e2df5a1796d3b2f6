use std::sync::Arc;

use alloy_primitives::{keccak256, B256};
use eth_trie::DB;
use redb::{Database as ReDB, ReadableTable, TableDefinition};

use super::error::StateError;

static NULL_RLP_STATIC: [u8; 1] = [0x80; 1];

const ACCOUNT_TRIE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("account_trie");
const STORAGE_TRIE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("storage_trie");

/// Which trie a [`NodeDB`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSpace {
    /// The account trie, keyed by node hash.
    Accounts,
    /// The storage trie of one account, keyed by hashed address then node hash.
    Storage(B256),
}

/// Trie node storage on top of a snapshot's redb database.
#[derive(Debug, Clone)]
pub struct NodeDB {
    space: NodeSpace,
    db: Arc<ReDB>,
}

impl NodeDB {
    pub fn new(space: NodeSpace, db: Arc<ReDB>) -> Result<Self, StateError> {
        let node_db = Self { space, db };
        let txn = node_db.db.begin_write()?;
        txn.open_table(node_db.table())?;
        txn.commit()?;
        Ok(node_db)
    }

    pub fn accounts(db: Arc<ReDB>) -> Result<Self, StateError> {
        Self::new(NodeSpace::Accounts, db)
    }

    pub fn storage(address_hash: B256, db: Arc<ReDB>) -> Result<Self, StateError> {
        Self::new(NodeSpace::Storage(address_hash), db)
    }

    fn table(&self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        match self.space {
            NodeSpace::Accounts => ACCOUNT_TRIE_TABLE,
            NodeSpace::Storage(_) => STORAGE_TRIE_TABLE,
        }
    }

    pub fn get_db_key(&self, key: &[u8]) -> Vec<u8> {
        match self.space {
            NodeSpace::Accounts => key.to_vec(),
            NodeSpace::Storage(address_hash) => [address_hash.as_slice(), key].concat(),
        }
    }

    // Storage tries resolve the empty node without touching the table.
    fn is_null_node(&self, key: &[u8]) -> bool {
        matches!(self.space, NodeSpace::Storage(_)) && key == keccak256([]).as_slice()
    }
}

impl DB for NodeDB {
    type Error = StateError;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        if self.is_null_node(key) {
            return Ok(Some(NULL_RLP_STATIC.to_vec()));
        }

        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;
        let db_key = self.get_db_key(key);
        Ok(table
            .get(db_key.as_slice())?
            .map(|access_guard| access_guard.value().to_vec()))
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        if self.is_null_node(key) {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.table())?;
            table.insert(self.get_db_key(key).as_slice(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), Self::Error> {
        // Account trie nodes are shared between roots and are never pruned.
        if self.is_null_node(key) || self.space == NodeSpace::Accounts {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.table())?;
            table.remove(self.get_db_key(key).as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::storage::utils::setup_redb;

    #[test]
    fn storage_spaces_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(setup_redb(dir.path()).unwrap());
        let first = NodeDB::storage(B256::repeat_byte(1), db.clone()).unwrap();
        let second = NodeDB::storage(B256::repeat_byte(2), db.clone()).unwrap();
        let accounts = NodeDB::accounts(db).unwrap();

        let key = B256::repeat_byte(0xaa);
        first.insert(key.as_slice(), vec![1]).unwrap();
        assert_eq!(first.get(key.as_slice()).unwrap(), Some(vec![1]));
        assert_eq!(second.get(key.as_slice()).unwrap(), None);
        assert_eq!(accounts.get(key.as_slice()).unwrap(), None);

        first.remove(key.as_slice()).unwrap();
        assert_eq!(first.get(key.as_slice()).unwrap(), None);
    }

    #[test]
    fn storage_null_node_is_implicit() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(setup_redb(dir.path()).unwrap());
        let storage = NodeDB::storage(B256::repeat_byte(1), db).unwrap();
        assert_eq!(
            storage.get(keccak256([]).as_slice()).unwrap(),
            Some(vec![0x80])
        );
    }
}
