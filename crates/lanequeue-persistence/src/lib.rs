mod store;

pub use store::{MessageStore, MessageStoreConfig, StoredMessage};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Column family not found: {0}")]
    MissingColumnFamily(&'static str),

    #[error("Corrupt key in {0}")]
    CorruptKey(&'static str),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
