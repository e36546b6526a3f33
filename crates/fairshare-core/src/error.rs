//! Error types for the fairshare ledger.
use thiserror::Error;

/// Configuration-integrity violations. Always fatal for the pass that hits them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("no root bank (every bank has a parent)")] NoRootBank,
    #[error("multiple root banks: {0:?}")] MultipleRootBanks(Vec<String>),
    #[error("bank {bank} names unknown parent {parent}")] UnknownParentBank { bank: String, parent: String },
    #[error("bank tree contains a cycle through {0}")] CyclicBankTree(String),
    #[error("association {username}/{bank} has no usage bin row")] MissingUsageBins { username: String, bank: String },
    #[error("association {username}/{bank} has {got} usage periods, ledger has {expected}")] UsagePeriodMismatch { username: String, bank: String, got: usize, expected: usize },
    #[error("association {username}/{bank} belongs to unknown bank")] OrphanAssociation { username: String, bank: String },
    #[error("ledger header missing: ledger not initialized")] MissingLedgerHeader,
    #[error("invalid ledger parameter: {0}")] InvalidParameter(String),
}

/// Malformed job records. The offending record is skipped, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobRecordError {
    #[error("job {jobid}: missing t_run")] MissingRunTime { jobid: u64 },
    #[error("job {jobid}: missing t_inactive")] MissingInactiveTime { jobid: u64 },
    #[error("job {jobid}: non-finite timestamps")] NonFiniteTime { jobid: u64 },
    #[error("job {jobid}: t_inactive {t_inactive} precedes t_run {t_run}")] NegativeElapsed { jobid: u64, t_run: f64, t_inactive: f64 },
}

/// Rejected administrative requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("ledger already initialized")] AlreadyInitialized,
    #[error("bank not found: {0}")] BankNotFound(String),
    #[error("bank already exists: {0}")] DuplicateBank(String),
    #[error("a root bank already exists: {0}")] RootExists(String),
    #[error("association not found: {username}/{bank}")] AssociationNotFound { username: String, bank: String },
    #[error("association already exists: {username}/{bank}")] DuplicateAssociation { username: String, bank: String },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)] Integrity(#[from] IntegrityError),
    #[error(transparent)] JobRecord(#[from] JobRecordError),
    #[error(transparent)] Admin(#[from] AdminError),
    #[error("job source: {0}")] JobSource(String),
    #[error("storage: {0}")] Storage(String),
}
