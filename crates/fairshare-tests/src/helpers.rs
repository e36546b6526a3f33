//! Shared test helpers for integration tests.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use fairshare_core::error::LedgerError;
use fairshare_core::jobs::MemoryJobSource;
use fairshare_core::store::{LedgerBatch, LedgerStore, LedgerWrite, MemoryLedgerStore};
use fairshare_core::traits::JobSource;
use fairshare_core::types::{AssociationKey, JobRecord, UsageBins};
use fairshare_ledger::UsageLedger;

/// Ledger creation time used by every fixture.
pub const T0: f64 = 1_700_000_000.0;

pub type MemoryLedger = UsageLedger<MemoryLedgerStore, MemoryJobSource>;

/// A completed job.
pub fn job(
    jobid: u64,
    userid: u32,
    bank: Option<&str>,
    nnodes: u32,
    t_run: f64,
    t_inactive: f64,
) -> JobRecord {
    JobRecord {
        jobid,
        userid,
        bank: bank.map(str::to_string),
        nnodes,
        t_run: Some(t_run),
        t_inactive: Some(t_inactive),
    }
}

/// Build the standard tree on an initialized ledger:
///
/// ```text
/// root
/// ├── A
/// │   ├── D   (1001)
/// │   └── E   (1003)
/// └── C       (1002)
/// ```
pub fn build_sample_tree<S: LedgerStore, J: JobSource>(
    ledger: &mut UsageLedger<S, J>,
) -> Result<(), LedgerError> {
    ledger.initialize_at(T0, 1, 4)?;
    ledger.add_bank("root", None, 1.0)?;
    ledger.add_bank("A", Some("root"), 1.0)?;
    ledger.add_bank("C", Some("root"), 1.0)?;
    ledger.add_bank("D", Some("A"), 1.0)?;
    ledger.add_bank("E", Some("A"), 1.0)?;
    ledger.add_association("1001", 1001, "D", true)?;
    ledger.add_association("1002", 1002, "C", true)?;
    ledger.add_association("1003", 1003, "E", true)?;
    Ok(())
}

/// In-memory ledger with the standard tree and no jobs.
pub fn sample_ledger() -> MemoryLedger {
    let mut ledger = UsageLedger::new(MemoryLedgerStore::new(), MemoryJobSource::default());
    build_sample_tree(&mut ledger).unwrap();
    ledger
}

/// Overwrite an association's history, keeping its `job_usage` consistent.
pub fn seed_bins<S: LedgerStore>(store: &mut S, key: &AssociationKey, bins: UsageBins) {
    let total: f64 = bins.periods.iter().sum();
    let mut batch = LedgerBatch::new();
    batch.push(LedgerWrite::PutUsageBins {
        key: key.clone(),
        bins,
    });
    batch.push(LedgerWrite::SetAssociationUsage {
        key: key.clone(),
        job_usage: total,
    });
    store.commit(batch).unwrap();
}

/// Replace the memory ledger's store contents via `f`, then rebuild it.
pub fn with_store(ledger: MemoryLedger, f: impl FnOnce(&mut MemoryLedgerStore)) -> MemoryLedger {
    let (mut store, jobs) = ledger.into_parts();
    f(&mut store);
    UsageLedger::new(store, jobs)
}

/// Write `jobs` as a JSON-lines archive.
pub fn write_jsonl(path: &Path, jobs: &[JobRecord]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for job in jobs {
        serde_json::to_writer(&mut out, job)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Stored `job_usage` of a bank.
pub fn bank_usage<S: LedgerStore, J: JobSource>(ledger: &UsageLedger<S, J>, bank: &str) -> f64 {
    ledger.store().bank(bank).unwrap().unwrap().job_usage
}

/// Stored `job_usage` of an association.
pub fn association_usage<S: LedgerStore, J: JobSource>(
    ledger: &UsageLedger<S, J>,
    username: &str,
    bank: &str,
) -> f64 {
    ledger
        .store()
        .association(&AssociationKey::new(username, bank))
        .unwrap()
        .unwrap()
        .job_usage
}

/// Stored bins of an association.
pub fn bins_of<S: LedgerStore, J: JobSource>(
    ledger: &UsageLedger<S, J>,
    username: &str,
    bank: &str,
) -> UsageBins {
    ledger
        .store()
        .usage_bins(&AssociationKey::new(username, bank))
        .unwrap()
        .unwrap()
}
