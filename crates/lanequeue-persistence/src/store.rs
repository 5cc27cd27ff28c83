use crate::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use lanequeue_core::LaneSpec;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration for the message store
#[derive(Debug, Clone)]
pub struct MessageStoreConfig {
    pub data_dir: PathBuf,
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        MessageStoreConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Column family names
const CF_LANES: &str = "lanes";
const CF_MESSAGES: &str = "messages";

/// A persistent message waiting in a durable lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Broker-wide sequence number, also the FIFO order within a priority
    pub id: u64,
    pub lane: String,
    pub priority: u8,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

impl StoredMessage {
    // lane name, 0x00, big-endian id: messages of a lane are contiguous and
    // ordered by id
    fn key(&self) -> Vec<u8> {
        message_key(&self.lane, self.id)
    }
}

fn message_key(lane: &str, id: u64) -> Vec<u8> {
    let mut key = lane_prefix(lane);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn lane_prefix(lane: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(lane.len() + 9);
    prefix.extend_from_slice(lane.as_bytes());
    prefix.push(0);
    prefix
}

/// Durable storage for lane declarations and unacknowledged persistent
/// messages, backed by RocksDB.
///
/// A message is written when it is published and deleted when it is
/// acknowledged; whatever remains is restored on the next start.
pub struct MessageStore {
    db: DB,
}

impl MessageStore {
    /// Open or create the message store
    pub fn open(config: MessageStoreConfig) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&config.data_dir)?;

        // Configure RocksDB
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Define column families
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_LANES, Options::default()),
            ColumnFamilyDescriptor::new(CF_MESSAGES, Options::default()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, config.data_dir.join("messages"), cf_descriptors)?;

        info!("Opened message store at {:?}", config.data_dir);

        Ok(MessageStore { db })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or(PersistenceError::MissingColumnFamily(name))
    }

    /// Record a durable lane declaration
    pub fn save_lane(&self, lane: &LaneSpec) -> Result<()> {
        let value = bincode::serialize(lane)?;
        self.db.put_cf(self.cf(CF_LANES)?, lane.name.as_bytes(), value)?;
        Ok(())
    }

    /// All durable lanes declared before
    pub fn load_lanes(&self) -> Result<Vec<LaneSpec>> {
        let mut lanes = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_LANES)?, IteratorMode::Start) {
            let (_key, value) = item?;
            lanes.push(bincode::deserialize(&value)?);
        }
        Ok(lanes)
    }

    /// Store a published message
    pub fn put(&self, message: &StoredMessage) -> Result<()> {
        // Store under lane prefix + id so a lane scans in publish order
        let value = bincode::serialize(message)?;
        self.db.put_cf(self.cf(CF_MESSAGES)?, message.key(), value)?;
        debug!(lane = %message.lane, id = message.id, "Stored message");
        Ok(())
    }

    /// Delete an acknowledged message
    pub fn remove(&self, lane: &str, id: u64) -> Result<()> {
        self.db.delete_cf(self.cf(CF_MESSAGES)?, message_key(lane, id))?;
        Ok(())
    }

    /// Atomically move a message to another lane (dead-lettering)
    pub fn relocate(&self, from_lane: &str, message: &StoredMessage) -> Result<()> {
        let cf = self.cf(CF_MESSAGES)?;
        // Delete and put in one atomic write
        let mut batch = WriteBatch::default();
        batch.delete_cf(cf, message_key(from_lane, message.id));
        batch.put_cf(cf, message.key(), bincode::serialize(message)?);
        self.db.write(batch)?;
        Ok(())
    }

    /// Messages still stored for a lane, in id order
    pub fn load_lane(&self, lane: &str) -> Result<Vec<StoredMessage>> {
        let prefix = lane_prefix(lane);
        let mut messages = Vec::new();

        let iter = self.db.iterator_cf(
            self.cf(CF_MESSAGES)?,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            // Keys are sorted, so the first foreign key ends the lane
            if !key.starts_with(&prefix) {
                break;
            }
            messages.push(bincode::deserialize(&value)?);
        }

        Ok(messages)
    }

    /// Highest message id ever stored, used to resume the broker sequence
    pub fn max_message_id(&self) -> Result<Option<u64>> {
        let mut max = None;
        for item in self.db.iterator_cf(self.cf(CF_MESSAGES)?, IteratorMode::Start) {
            let (key, _value) = item?;
            // Id is the big-endian suffix of the key
            let id_bytes: [u8; 8] = key
                .get(key.len().saturating_sub(8)..)
                .and_then(|tail| tail.try_into().ok())
                .ok_or(PersistenceError::CorruptKey(CF_MESSAGES))?;
            let id = u64::from_be_bytes(id_bytes);
            max = Some(max.map_or(id, |m: u64| m.max(id)));
        }
        Ok(max)
    }

    /// Flush memtables to disk
    pub fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
