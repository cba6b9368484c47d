//! # ParcelDB — Persistent Storage Engine
//!
//! Durable home of the registry, built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree              | Key                   | Value                          |
//! |-------------------|-----------------------|--------------------------------|
//! | `payment_methods` | index (8B BE)         | `bincode(AccountId)`           |
//! | `properties`      | property id (8B BE)   | `bincode(PropertyRecord)`      |
//! | `tokenizations`   | handle (20B)          | `bincode(TokenizationInstance)`|
//! | `metadata`        | key (UTF-8)           | u64 (8B BE)                    |
//!
//! Integer keys are big-endian so sled's lexicographic order matches numeric
//! order and full scans come back sorted.
//!
//! ## Atomicity
//!
//! A listing writes its record, its tokenization instance, the advanced
//! `next_property_id` and the advanced `factory_nonce` in one multi-tree
//! transaction. Either all four land or none do, so a restart can never hand
//! out an id or a handle that was already issued.

use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Batch, Db, Transactional, Tree};
use std::path::Path;

use crate::config::STORAGE_SCHEMA_VERSION;
use crate::types::{PaymentMethod, PropertyId, PropertyRecord, TokenizationInstance};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted store: {0}")]
    Corrupted(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SCHEMA_VERSION: &[u8] = b"schema_version";
const META_NEXT_PROPERTY_ID: &[u8] = b"next_property_id";
const META_FACTORY_NONCE: &[u8] = b"factory_nonce";

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything needed to rebuild the in-memory registry after a restart.
#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub payment_methods: Vec<PaymentMethod>,
    pub properties: Vec<PropertyRecord>,
    pub tokenizations: Vec<TokenizationInstance>,
    /// `None` on a fresh database.
    pub next_property_id: Option<PropertyId>,
    pub factory_nonce: Option<u64>,
}

// ---------------------------------------------------------------------------
// ParcelDB
// ---------------------------------------------------------------------------

/// Persistent storage engine for the property registry.
///
/// Cheap to clone: every field is a reference-counted sled handle. Writers
/// are serialized by the market's locks, not here.
#[derive(Debug, Clone)]
pub struct ParcelDB {
    db: Db,
    payment_methods: Tree,
    properties: Tree,
    tokenizations: Tree,
    metadata: Tree,
}

impl ParcelDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let payment_methods = db.open_tree("payment_methods")?;
        let properties = db.open_tree("properties")?;
        let tokenizations = db.open_tree("tokenizations")?;
        let metadata = db.open_tree("metadata")?;

        let store = Self {
            db,
            payment_methods,
            properties,
            tokenizations,
            metadata,
        };
        store.check_schema()?;
        Ok(store)
    }

    /// Stamps a fresh database with the schema version, or rejects one
    /// written by an incompatible version.
    fn check_schema(&self) -> DbResult<()> {
        match read_u64(&self.metadata, META_SCHEMA_VERSION)? {
            Some(v) if v == STORAGE_SCHEMA_VERSION => Ok(()),
            Some(v) => Err(DbError::Corrupted(format!(
                "schema version {v}, expected {STORAGE_SCHEMA_VERSION}"
            ))),
            None => {
                self.metadata
                    .insert(META_SCHEMA_VERSION, &STORAGE_SCHEMA_VERSION.to_be_bytes()[..])?;
                Ok(())
            }
        }
    }

    // -- Payment methods ----------------------------------------------------

    /// Append payment methods starting at ledger position `start`, in one
    /// atomic batch.
    pub fn append_payment_methods(&self, start: u64, methods: &[PaymentMethod]) -> DbResult<()> {
        let mut batch = Batch::default();
        for (offset, method) in methods.iter().enumerate() {
            let index = start + offset as u64;
            batch.insert(&index.to_be_bytes()[..], encode(method)?);
        }
        self.payment_methods.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Return the number of payment methods stored.
    pub fn payment_method_count(&self) -> usize {
        self.payment_methods.len()
    }

    // -- Listings -----------------------------------------------------------

    /// Persist a listing: its record, its tokenization instance and both
    /// advanced counters, atomically.
    pub fn commit_listing(
        &self,
        record: &PropertyRecord,
        instance: &TokenizationInstance,
    ) -> DbResult<()> {
        let id_key = record.id.to_be_bytes();
        let record_bytes = encode(record)?;
        let instance_bytes = encode(instance)?;
        let next_id = (record.id + 1).to_be_bytes();
        let next_nonce = (instance.sequence + 1).to_be_bytes();

        (&self.properties, &self.tokenizations, &self.metadata)
            .transaction(
                |(properties, tokenizations, metadata)| -> ConflictableTransactionResult<(), ()> {
                    properties.insert(&id_key[..], record_bytes.as_slice())?;
                    tokenizations
                        .insert(&instance.handle.as_bytes()[..], instance_bytes.as_slice())?;
                    metadata.insert(META_NEXT_PROPERTY_ID, &next_id[..])?;
                    metadata.insert(META_FACTORY_NONCE, &next_nonce[..])?;
                    Ok(())
                },
            )
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Storage(err) => DbError::Sled(err),
                TransactionError::Abort(()) => {
                    DbError::Corrupted("listing transaction aborted".to_string())
                }
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// Retrieve a property record by id.
    pub fn get_property(&self, id: PropertyId) -> DbResult<Option<PropertyRecord>> {
        self.properties
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Return the number of property records stored.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    // -- Recovery -----------------------------------------------------------

    /// Read back the full persisted state, ordered by key.
    pub fn load(&self) -> DbResult<StoredState> {
        Ok(StoredState {
            payment_methods: scan(&self.payment_methods)?,
            properties: scan(&self.properties)?,
            tokenizations: scan(&self.tokenizations)?,
            next_property_id: read_u64(&self.metadata, META_NEXT_PROPERTY_ID)?,
            factory_nonce: read_u64(&self.metadata, META_FACTORY_NONCE)?,
        })
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn scan<T: serde::de::DeserializeOwned>(tree: &Tree) -> DbResult<Vec<T>> {
    tree.iter()
        .values()
        .map(|value| decode(&value?))
        .collect()
}

fn read_u64(tree: &Tree, key: &[u8]) -> DbResult<Option<u64>> {
    match tree.get(key)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                DbError::Corrupted(format!(
                    "metadata key {} is not a u64",
                    String::from_utf8_lossy(key)
                ))
            })?;
            Ok(Some(u64::from_be_bytes(raw)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, TokenizationHandle};
    use chrono::Utc;

    fn instance(sequence: u64) -> TokenizationInstance {
        TokenizationInstance {
            handle: TokenizationHandle::from_bytes([sequence as u8 + 1; 20]),
            sequence,
            symbol: "TV69".into(),
            name: "The 69 View".into(),
            owner: AccountId::new("0xOwner"),
            created_at: Utc::now(),
        }
    }

    fn record(id: PropertyId, instance: &TokenizationInstance) -> PropertyRecord {
        PropertyRecord {
            id,
            registration_number: 69,
            registration_code: "AQR696969HEY".into(),
            name: "The 69 View".into(),
            symbol: "TV69".into(),
            metadata_uri: "ipfs://x".into(),
            owner: AccountId::new("0xOwner"),
            verified: true,
            tokenization: instance.handle,
            listed_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_database_is_empty() {
        let db = ParcelDB::open_temporary().unwrap();
        let state = db.load().unwrap();
        assert!(state.payment_methods.is_empty());
        assert!(state.properties.is_empty());
        assert!(state.next_property_id.is_none());
        assert!(state.factory_nonce.is_none());
    }

    #[test]
    fn payment_methods_keep_order_across_batches() {
        let db = ParcelDB::open_temporary().unwrap();
        db.append_payment_methods(0, &[AccountId::new("0xA1"), AccountId::new("0xB2")])
            .unwrap();
        db.append_payment_methods(2, &[AccountId::new("0xC3")])
            .unwrap();

        let state = db.load().unwrap();
        let stored: Vec<&str> = state.payment_methods.iter().map(|m| m.as_str()).collect();
        assert_eq!(stored, vec!["0xA1", "0xB2", "0xC3"]);
        assert_eq!(db.payment_method_count(), 3);
    }

    #[test]
    fn commit_listing_writes_record_instance_and_counters() {
        let db = ParcelDB::open_temporary().unwrap();
        let inst = instance(0);
        let rec = record(1, &inst);
        db.commit_listing(&rec, &inst).unwrap();

        assert_eq!(db.get_property(1).unwrap(), Some(rec));
        assert_eq!(db.get_property(2).unwrap(), None);

        let state = db.load().unwrap();
        assert_eq!(state.tokenizations, vec![inst]);
        assert_eq!(state.next_property_id, Some(2));
        assert_eq!(state.factory_nonce, Some(1));
    }

    #[test]
    fn properties_load_in_id_order() {
        let db = ParcelDB::open_temporary().unwrap();
        for (seq, id) in [(0, 1), (1, 2), (2, 10)] {
            let inst = instance(seq);
            db.commit_listing(&record(id, &inst), &inst).unwrap();
        }
        let ids: Vec<_> = db.load().unwrap().properties.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        assert_eq!(db.property_count(), 3);
    }

    #[test]
    fn reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let db = ParcelDB::open(&path).unwrap();
            let inst = instance(0);
            db.commit_listing(&record(1, &inst), &inst).unwrap();
            db.append_payment_methods(0, &[AccountId::new("0xA1")])
                .unwrap();
        }
        let db = ParcelDB::open(&path).unwrap();
        let state = db.load().unwrap();
        assert_eq!(state.properties.len(), 1);
        assert_eq!(state.payment_methods.len(), 1);
        assert_eq!(state.next_property_id, Some(2));
    }

    #[test]
    fn flush_does_not_error() {
        let db = ParcelDB::open_temporary().unwrap();
        db.flush().unwrap();
    }
}
