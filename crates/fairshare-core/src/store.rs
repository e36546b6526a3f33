//! Ledger storage interface and in-memory implementation.
//!
//! Provides the [`LedgerStore`] trait for reading associations, banks, usage
//! bins, and the ledger header, and for committing a [`LedgerBatch`] of writes.
//! The [`MemoryLedgerStore`] is suitable for testing; the production ledger
//! uses RocksDB (fairshare-ledger).
//!
//! A batch is the transaction boundary: a store either applies every write in
//! it or none of them. Dropping a batch without committing is a rollback.

use std::collections::BTreeMap;

use crate::error::{AdminError, LedgerError};
use crate::types::{Association, AssociationKey, Bank, LedgerHeader, UsageBins};

/// One staged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    /// Create or replace the ledger header.
    PutHeader(LedgerHeader),
    /// Create or replace a bank row.
    PutBank(Bank),
    /// Create or replace an association row.
    PutAssociation(Association),
    /// Create or replace an association's usage bins.
    PutUsageBins { key: AssociationKey, bins: UsageBins },
    SetAssociationUsage { key: AssociationKey, job_usage: f64 },
    SetAssociationActive { key: AssociationKey, active: bool },
    SetBankUsage { bank: String, job_usage: f64 },
    SetIgnoreOlderThan { bank: String, timestamp: f64 },
}

/// An ordered set of writes applied atomically by [`LedgerStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerBatch {
    writes: Vec<LedgerWrite>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<LedgerWrite> {
        self.writes
    }
}

impl Extend<LedgerWrite> for LedgerBatch {
    fn extend<I: IntoIterator<Item = LedgerWrite>>(&mut self, iter: I) {
        self.writes.extend(iter);
    }
}

/// Persistent ledger state.
///
/// Reads observe the last committed state only; staged writes are invisible
/// until [`commit`](LedgerStore::commit) returns `Ok`.
///
/// Not thread-safe; callers serialize update passes.
pub trait LedgerStore {
    /// The ledger header, or `None` if the ledger was never initialized.
    fn header(&self) -> Result<Option<LedgerHeader>, LedgerError>;

    /// All associations, ordered by (username, bank).
    fn associations(&self) -> Result<Vec<Association>, LedgerError>;

    /// Look up one association.
    fn association(&self, key: &AssociationKey) -> Result<Option<Association>, LedgerError>;

    /// All banks, ordered by name.
    fn banks(&self) -> Result<Vec<Bank>, LedgerError>;

    /// Look up one bank by name.
    fn bank(&self, name: &str) -> Result<Option<Bank>, LedgerError>;

    /// Usage bins of one association. `None` if the row is missing.
    fn usage_bins(&self, key: &AssociationKey) -> Result<Option<UsageBins>, LedgerError>;

    /// Apply every write in `batch` atomically.
    ///
    /// # Errors
    ///
    /// - [`AdminError::AssociationNotFound`] / [`AdminError::BankNotFound`] if a
    ///   `Set*` write targets a row that neither exists nor is created earlier
    ///   in the same batch
    /// - [`LedgerError::Storage`] on backend failure
    ///
    /// On error nothing is applied.
    fn commit(&mut self, batch: LedgerBatch) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    header: Option<LedgerHeader>,
    associations: BTreeMap<AssociationKey, Association>,
    bins: BTreeMap<AssociationKey, UsageBins>,
    banks: BTreeMap<String, Bank>,
}

impl MemoryState {
    fn apply(&mut self, write: LedgerWrite) -> Result<(), LedgerError> {
        match write {
            LedgerWrite::PutHeader(header) => self.header = Some(header),
            LedgerWrite::PutBank(bank) => {
                self.banks.insert(bank.name.clone(), bank);
            }
            LedgerWrite::PutAssociation(association) => {
                self.associations.insert(association.key(), association);
            }
            LedgerWrite::PutUsageBins { key, bins } => {
                if !self.associations.contains_key(&key) {
                    return Err(association_not_found(&key));
                }
                self.bins.insert(key, bins);
            }
            LedgerWrite::SetAssociationUsage { key, job_usage } => {
                self.association_mut(&key)?.job_usage = job_usage;
            }
            LedgerWrite::SetAssociationActive { key, active } => {
                self.association_mut(&key)?.active = active;
            }
            LedgerWrite::SetBankUsage { bank, job_usage } => {
                self.bank_mut(&bank)?.job_usage = job_usage;
            }
            LedgerWrite::SetIgnoreOlderThan { bank, timestamp } => {
                self.bank_mut(&bank)?.ignore_older_than = Some(timestamp);
            }
        }
        Ok(())
    }

    fn association_mut(&mut self, key: &AssociationKey) -> Result<&mut Association, LedgerError> {
        self.associations
            .get_mut(key)
            .ok_or_else(|| association_not_found(key))
    }

    fn bank_mut(&mut self, name: &str) -> Result<&mut Bank, LedgerError> {
        self.banks
            .get_mut(name)
            .ok_or_else(|| AdminError::BankNotFound(name.to_string()).into())
    }
}

/// [`AdminError::AssociationNotFound`] for `key`, as a [`LedgerError`].
pub fn association_not_found(key: &AssociationKey) -> LedgerError {
    AdminError::AssociationNotFound {
        username: key.username.clone(),
        bank: key.bank.clone(),
    }
    .into()
}

/// In-memory ledger storage for testing.
///
/// Commits apply to a copy of the state which replaces the live state only
/// when every write succeeded.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: MemoryState,
    commits: u64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits, for asserting on write behaviour.
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Remove an association's bin row, bypassing every check.
    ///
    /// Only useful to exercise integrity failures in tests.
    pub fn remove_usage_bins(&mut self, key: &AssociationKey) -> Option<UsageBins> {
        self.state.bins.remove(key)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn header(&self) -> Result<Option<LedgerHeader>, LedgerError> {
        Ok(self.state.header)
    }

    fn associations(&self) -> Result<Vec<Association>, LedgerError> {
        Ok(self.state.associations.values().cloned().collect())
    }

    fn association(&self, key: &AssociationKey) -> Result<Option<Association>, LedgerError> {
        Ok(self.state.associations.get(key).cloned())
    }

    fn banks(&self) -> Result<Vec<Bank>, LedgerError> {
        Ok(self.state.banks.values().cloned().collect())
    }

    fn bank(&self, name: &str) -> Result<Option<Bank>, LedgerError> {
        Ok(self.state.banks.get(name).cloned())
    }

    fn usage_bins(&self, key: &AssociationKey) -> Result<Option<UsageBins>, LedgerError> {
        Ok(self.state.bins.get(key).cloned())
    }

    fn commit(&mut self, batch: LedgerBatch) -> Result<(), LedgerError> {
        let mut staged = self.state.clone();
        for write in batch.into_writes() {
            staged.apply(write)?;
        }
        self.state = staged;
        self.commits += 1;
        Ok(())
    }
}
