//! RocksDB-backed persistent ledger storage.
//!
//! Implements [`LedgerStore`] using RocksDB column families for associations,
//! usage bins, banks, and metadata (the ledger header). Every commit is one
//! atomic [`WriteBatch`].

use std::collections::BTreeMap;
use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use tracing::debug;

use fairshare_core::error::{AdminError, LedgerError};
use fairshare_core::store::{association_not_found, LedgerBatch, LedgerStore, LedgerWrite};
use fairshare_core::types::{Association, AssociationKey, Bank, LedgerHeader, UsageBins};

// --- Column family names ---

const CF_ASSOCIATIONS: &str = "associations";
const CF_USAGE_BINS: &str = "usage_bins";
const CF_BANKS: &str = "banks";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_ASSOCIATIONS, CF_USAGE_BINS, CF_BANKS, CF_METADATA];

// --- Metadata keys ---

const META_HEADER: &[u8] = b"ledger_header";

/// RocksDB-backed ledger storage.
///
/// Associations and their bins are keyed by `username \0 bank`, so iteration
/// order matches [`AssociationKey`] ordering. Banks are keyed by name.
pub struct RocksLedger {
    db: DB,
}

/// Rows touched by a batch, applied in memory before anything is written.
#[derive(Default)]
struct StagedRows {
    header: Option<LedgerHeader>,
    associations: BTreeMap<AssociationKey, Association>,
    bins: BTreeMap<AssociationKey, UsageBins>,
    banks: BTreeMap<String, Bank>,
}

impl RocksLedger {
    /// Open or create a ledger database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        debug!(path = %path.as_ref().display(), "ledger database opened");
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db
            .flush()
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, LedgerError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("missing column family: {name}")))
    }

    fn association_key(key: &AssociationKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(key.username.len() + key.bank.len() + 1);
        out.extend_from_slice(key.username.as_bytes());
        out.push(0);
        out.extend_from_slice(key.bank.as_bytes());
        out
    }

    fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, LedgerError> {
        bincode::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, LedgerError> {
        let (value, _): (T, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(value)
    }

    fn get_row<T: bincode::Decode<()>>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, LedgerError> {
        let cf = self.cf_handle(cf_name)?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| LedgerError::Storage(e.to_string()))?
        {
            Some(data) => Ok(Some(Self::decode(&data)?)),
            None => Ok(None),
        }
    }

    fn all_rows<T: bincode::Decode<()>>(&self, cf_name: &str) -> Result<Vec<T>, LedgerError> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value_bytes) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            rows.push(Self::decode(&value_bytes)?);
        }
        Ok(rows)
    }

    /// The association as of the writes staged so far.
    fn staged_association<'a>(
        &self,
        staged: &'a mut StagedRows,
        key: &AssociationKey,
    ) -> Result<&'a mut Association, LedgerError> {
        if !staged.associations.contains_key(key) {
            let row = self
                .association(key)?
                .ok_or_else(|| association_not_found(key))?;
            staged.associations.insert(key.clone(), row);
        }
        staged
            .associations
            .get_mut(key)
            .ok_or_else(|| association_not_found(key))
    }

    /// The bank as of the writes staged so far.
    fn staged_bank<'a>(
        &self,
        staged: &'a mut StagedRows,
        name: &str,
    ) -> Result<&'a mut Bank, LedgerError> {
        if !staged.banks.contains_key(name) {
            let row = self
                .bank(name)?
                .ok_or_else(|| AdminError::BankNotFound(name.to_string()))?;
            staged.banks.insert(name.to_string(), row);
        }
        staged
            .banks
            .get_mut(name)
            .ok_or_else(|| AdminError::BankNotFound(name.to_string()).into())
    }

    fn stage(&self, staged: &mut StagedRows, write: LedgerWrite) -> Result<(), LedgerError> {
        match write {
            LedgerWrite::PutHeader(header) => staged.header = Some(header),
            LedgerWrite::PutBank(bank) => {
                staged.banks.insert(bank.name.clone(), bank);
            }
            LedgerWrite::PutAssociation(association) => {
                staged.associations.insert(association.key(), association);
            }
            LedgerWrite::PutUsageBins { key, bins } => {
                self.staged_association(staged, &key)?;
                staged.bins.insert(key, bins);
            }
            LedgerWrite::SetAssociationUsage { key, job_usage } => {
                self.staged_association(staged, &key)?.job_usage = job_usage;
            }
            LedgerWrite::SetAssociationActive { key, active } => {
                self.staged_association(staged, &key)?.active = active;
            }
            LedgerWrite::SetBankUsage { bank, job_usage } => {
                self.staged_bank(staged, &bank)?.job_usage = job_usage;
            }
            LedgerWrite::SetIgnoreOlderThan { bank, timestamp } => {
                self.staged_bank(staged, &bank)?.ignore_older_than = Some(timestamp);
            }
        }
        Ok(())
    }
}

impl LedgerStore for RocksLedger {
    fn header(&self) -> Result<Option<LedgerHeader>, LedgerError> {
        self.get_row(CF_METADATA, META_HEADER)
    }

    fn associations(&self) -> Result<Vec<Association>, LedgerError> {
        self.all_rows(CF_ASSOCIATIONS)
    }

    fn association(&self, key: &AssociationKey) -> Result<Option<Association>, LedgerError> {
        self.get_row(CF_ASSOCIATIONS, &Self::association_key(key))
    }

    fn banks(&self) -> Result<Vec<Bank>, LedgerError> {
        self.all_rows(CF_BANKS)
    }

    fn bank(&self, name: &str) -> Result<Option<Bank>, LedgerError> {
        self.get_row(CF_BANKS, name.as_bytes())
    }

    fn usage_bins(&self, key: &AssociationKey) -> Result<Option<UsageBins>, LedgerError> {
        self.get_row(CF_USAGE_BINS, &Self::association_key(key))
    }

    fn commit(&mut self, batch: LedgerBatch) -> Result<(), LedgerError> {
        let write_count = batch.len();
        let mut staged = StagedRows::default();
        for write in batch.into_writes() {
            self.stage(&mut staged, write)?;
        }

        let cf_assoc = self.cf_handle(CF_ASSOCIATIONS)?;
        let cf_bins = self.cf_handle(CF_USAGE_BINS)?;
        let cf_banks = self.cf_handle(CF_BANKS)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        let mut wb = WriteBatch::default();
        if let Some(header) = &staged.header {
            wb.put_cf(&cf_meta, META_HEADER, Self::encode(header)?);
        }
        for (key, association) in &staged.associations {
            wb.put_cf(&cf_assoc, Self::association_key(key), Self::encode(association)?);
        }
        for (key, bins) in &staged.bins {
            wb.put_cf(&cf_bins, Self::association_key(key), Self::encode(bins)?);
        }
        for (name, bank) in &staged.banks {
            wb.put_cf(&cf_banks, name.as_bytes(), Self::encode(bank)?);
        }

        self.db
            .write(wb)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        debug!(
            writes = write_count,
            associations = staged.associations.len(),
            banks = staged.banks.len(),
            "ledger batch committed"
        );
        Ok(())
    }
}
