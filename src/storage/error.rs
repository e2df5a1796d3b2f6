use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("trie error {0}")]
    Trie(#[from] eth_trie::TrieError),

    #[error("rlp error {0}")]
    RLP(#[from] alloy_rlp::Error),

    #[error("redb error {0}")]
    DB(#[from] Box<redb::Error>),

    #[error("io error {0}")]
    Io(#[from] std::io::Error),

    #[error("state error {0}")]
    ANYHOW(#[from] anyhow::Error),

    /// The block has no state snapshot attached.
    #[error("block state undefined")]
    Undefined,
}

impl From<redb::Error> for StateError {
    fn from(e: redb::Error) -> Self {
        StateError::DB(Box::new(e))
    }
}

impl From<redb::DatabaseError> for StateError {
    fn from(err: redb::DatabaseError) -> Self {
        StateError::from(redb::Error::from(err))
    }
}

impl From<redb::TransactionError> for StateError {
    fn from(err: redb::TransactionError) -> Self {
        StateError::from(redb::Error::from(err))
    }
}

impl From<redb::TableError> for StateError {
    fn from(err: redb::TableError) -> Self {
        StateError::from(redb::Error::from(err))
    }
}

impl From<redb::StorageError> for StateError {
    fn from(err: redb::StorageError) -> Self {
        StateError::from(redb::Error::from(err))
    }
}

impl From<redb::CommitError> for StateError {
    fn from(err: redb::CommitError) -> Self {
        StateError::from(redb::Error::from(err))
    }
}
