//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `entries` - Append-only ledger entries (key: account_id || 0x00 || sequence)
//! - `idempotency` - Applied `(kind, reference)` pairs (key: kind || reference)
//! - `referral_codes` - Referral code index (key: code)
//! - `records` - Opaque records owned by higher layers (key: namespace || 0x00 || key)
//!
//! Every mutation goes through [`Storage::commit`], which writes one
//! `WriteBatch`: either all of a commit is visible or none of it is.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, EntryKind, LedgerEntry},
    Config,
};
use rocksdb::{
    BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use serde::{Deserialize, Serialize};

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_ENTRIES: &str = "entries";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_REFERRAL_CODES: &str = "referral_codes";
const CF_RECORDS: &str = "records";

const KEY_SEPARATOR: u8 = 0x00;

/// Location of an entry, stored in the idempotency index
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryLocator {
    account_id: AccountId,
    sequence: u64,
}

/// Everything one atomic commit writes
#[derive(Debug, Default)]
pub struct CommitSet {
    /// Account records to overwrite
    pub accounts: Vec<Account>,
    /// New referral code mappings
    pub referral_codes: Vec<(String, AccountId)>,
    /// New ledger entries
    pub entries: Vec<LedgerEntry>,
    /// Records to upsert: (namespace, key, bincode bytes)
    pub record_puts: Vec<(String, String, Vec<u8>)>,
    /// Records to delete: (namespace, key)
    pub record_deletes: Vec<(String, String)>,
}

impl CommitSet {
    /// True if the commit would write nothing
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.referral_codes.is_empty()
            && self.entries.is_empty()
            && self.record_puts.is_empty()
            && self.record_deletes.is_empty()
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_REFERRAL_CODES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_RECORDS, Self::cf_options_log()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened wallet ledger storage");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Accounts

    /// Get account record
    pub fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, account_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All registered account IDs
    pub fn account_ids(&self) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            ids.push(AccountId::new(String::from_utf8_lossy(&key).into_owned()));
        }
        Ok(ids)
    }

    /// Resolve a referral code
    pub fn account_by_referral_code(&self, code: &str) -> Result<Option<AccountId>> {
        let cf = self.cf_handle(CF_REFERRAL_CODES)?;
        match self.db.get_cf(cf, code.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // Entries

    /// Entry previously applied for `(kind, reference)`
    pub fn get_applied(&self, kind: EntryKind, reference: &str) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;
        let Some(bytes) = self.db.get_cf(cf, Self::idempotency_key(kind, reference))? else {
            return Ok(None);
        };
        let locator: EntryLocator = bincode::deserialize(&bytes)?;
        self.get_entry(&locator.account_id, locator.sequence).and_then(|entry| {
            entry.map(Some).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "idempotency index points at missing entry {}#{}",
                    locator.account_id, locator.sequence
                ))
            })
        })
    }

    /// Get entry by account and sequence
    pub fn get_entry(&self, account_id: &AccountId, sequence: u64) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        match self.db.get_cf(cf, Self::entry_key(account_id, sequence))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Entries of an account with sequence greater than `after`, ascending
    pub fn entries_after(
        &self,
        account_id: &AccountId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let prefix = Self::account_prefix(account_id);
        let start = Self::entry_key(account_id, after.saturating_add(1));

        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward))
        {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    // Records

    /// Get a record's raw bytes
    pub fn get_record(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_RECORDS)?;
        Ok(self.db.get_cf(cf, Self::record_key(namespace, key))?)
    }

    /// Records in `namespace` whose key starts with `key_prefix`, in key order
    pub fn scan_records(&self, namespace: &str, key_prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let cf = self.cf_handle(CF_RECORDS)?;
        let ns_prefix = Self::record_key(namespace, "");
        let start = Self::record_key(namespace, key_prefix);

        let mut records = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&start) {
                break;
            }
            let record_key = String::from_utf8_lossy(&key[ns_prefix.len()..]).into_owned();
            records.push((record_key, value.into_vec()));
        }
        Ok(records)
    }

    // Commit

    /// Write a commit set atomically
    pub fn commit(&self, set: &CommitSet) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for account in &set.accounts {
            batch.put_cf(
                cf_accounts,
                account.account_id.as_str().as_bytes(),
                bincode::serialize(account)?,
            );
        }

        let cf_codes = self.cf_handle(CF_REFERRAL_CODES)?;
        for (code, account_id) in &set.referral_codes {
            batch.put_cf(cf_codes, code.as_bytes(), bincode::serialize(account_id)?);
        }

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_idempotency = self.cf_handle(CF_IDEMPOTENCY)?;
        for entry in &set.entries {
            batch.put_cf(
                cf_entries,
                Self::entry_key(&entry.account_id, entry.sequence),
                bincode::serialize(entry)?,
            );
            let locator = EntryLocator {
                account_id: entry.account_id.clone(),
                sequence: entry.sequence,
            };
            batch.put_cf(
                cf_idempotency,
                Self::idempotency_key(entry.kind, &entry.reference),
                bincode::serialize(&locator)?,
            );
        }

        let cf_records = self.cf_handle(CF_RECORDS)?;
        for (namespace, key, value) in &set.record_puts {
            batch.put_cf(cf_records, Self::record_key(namespace, key), value);
        }
        for (namespace, key) in &set.record_deletes {
            batch.delete_cf(cf_records, Self::record_key(namespace, key));
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            accounts = set.accounts.len(),
            entries = set.entries.len(),
            records = set.record_puts.len() + set.record_deletes.len(),
            "Commit written"
        );

        Ok(())
    }

    // Key helpers

    fn account_prefix(account_id: &AccountId) -> Vec<u8> {
        let mut key = account_id.as_str().as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn entry_key(account_id: &AccountId, sequence: u64) -> Vec<u8> {
        let mut key = Self::account_prefix(account_id);
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    fn idempotency_key(kind: EntryKind, reference: &str) -> Vec<u8> {
        let mut key = vec![kind as u8];
        key.extend_from_slice(reference.as_bytes());
        key
    }

    fn record_key(namespace: &str, key: &str) -> Vec<u8> {
        let mut full = namespace.as_bytes().to_vec();
        full.push(KEY_SEPARATOR);
        full.extend_from_slice(key.as_bytes());
        full
    }
}
