//! End-to-end tests over the RocksDB ledger and the JSON-lines job archive.
//!
//! Each test opens a ledger in a temp directory, drives it through the
//! facade, and where relevant reopens it to check what actually persisted.

use fairshare_core::error::{IntegrityError, LedgerError};
use fairshare_core::store::{LedgerBatch, LedgerStore, LedgerWrite};
use fairshare_core::types::{AssociationKey, UsageBins};
use fairshare_ledger::{JsonlJobSource, LedgerConfig, RocksLedger, UsageLedger};
use fairshare_tests::helpers::*;

type DiskLedger = UsageLedger<RocksLedger, JsonlJobSource>;

/// Create a ledger backed by a temp directory with the standard tree.
fn disk_ledger() -> (DiskLedger, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        data_dir: dir.path().to_path_buf(),
        ..LedgerConfig::default()
    };
    let store = RocksLedger::open(config.db_path()).unwrap();
    let mut ledger = UsageLedger::new(store, JsonlJobSource::default());
    build_sample_tree(&mut ledger).unwrap();
    (ledger, dir)
}

fn reopen(ledger: DiskLedger, dir: &tempfile::TempDir) -> DiskLedger {
    drop(ledger);
    let config = LedgerConfig {
        data_dir: dir.path().to_path_buf(),
        ..LedgerConfig::default()
    };
    UsageLedger::new(RocksLedger::open(config.db_path()).unwrap(), JsonlJobSource::default())
}

#[test]
fn pass_from_archive_persists() {
    let (mut ledger, dir) = disk_ledger();
    let archive = dir.path().join("jobs.jsonl");
    write_jsonl(
        &archive,
        &[
            job(1, 1001, Some("D"), 5, T0 + 10.0, T0 + 15.0),
            job(2, 1003, Some("E"), 1, T0 + 10.0, T0 + 20.0),
            job(3, 1002, None, 2, T0 + 10.0, T0 + 13.5),
        ],
    )
    .unwrap();
    ledger.set_jobs(JsonlJobSource::open(&archive).unwrap());

    let report = ledger.update_usage_at(T0 + 100.0, 1).unwrap();
    assert_eq!(report.jobs_folded, 3);
    assert_eq!(report.root_usage, 42.0);

    let ledger = reopen(ledger, &dir);
    assert_eq!(bank_usage(&ledger, "A"), 35.0);
    assert_eq!(bank_usage(&ledger, "C"), 7.0);
    assert_eq!(bins_of(&ledger, "1001", "D").last_job_timestamp, T0 + 15.0);
    let header = ledger.store().header().unwrap().unwrap();
    assert_eq!(header.end_half_life_period, report.end_half_life_period);
}

#[test]
fn integrity_failure_commits_nothing() {
    let (mut ledger, dir) = disk_ledger();
    let archive = dir.path().join("jobs.jsonl");
    write_jsonl(&archive, &[job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 30.0)]).unwrap();
    ledger.set_jobs(JsonlJobSource::open(&archive).unwrap());

    // Corrupt one association's bin row behind the facade's back.
    let (mut store, jobs) = ledger.into_parts();
    let mut batch = LedgerBatch::new();
    batch.push(LedgerWrite::PutUsageBins {
        key: AssociationKey::new("1003", "E"),
        bins: UsageBins::zeroed(3),
    });
    store.commit(batch).unwrap();
    let header_before = store.header().unwrap();
    let mut ledger = UsageLedger::new(store, jobs);

    let err = ledger.update_usage_at(T0 + 100.0, 1).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Integrity(IntegrityError::UsagePeriodMismatch { got: 3, expected: 4, .. })
    ));

    // Association 1001 sorts first and was updated in memory, but never written.
    assert_eq!(association_usage(&ledger, "1001", "D"), 0.0);
    assert_eq!(bank_usage(&ledger, "root"), 0.0);
    assert_eq!(ledger.store().header().unwrap(), header_before);
}

#[test]
fn clear_usage_survives_reopen() {
    let (mut ledger, dir) = disk_ledger();
    let archive = dir.path().join("jobs.jsonl");
    write_jsonl(&archive, &[job(1, 1002, Some("C"), 4, T0 + 10.0, T0 + 20.0)]).unwrap();
    ledger.set_jobs(JsonlJobSource::open(&archive).unwrap());
    ledger.update_usage_at(T0 + 100.0, 1).unwrap();
    assert_eq!(bank_usage(&ledger, "root"), 40.0);

    ledger.clear_usage_at(T0 + 200.0, "C").unwrap();
    let ledger = reopen(ledger, &dir);
    assert_eq!(association_usage(&ledger, "1002", "C"), 0.0);
    assert_eq!(bank_usage(&ledger, "root"), 0.0);
    assert_eq!(ledger.store().bank("C").unwrap().unwrap().ignore_older_than, Some(T0 + 200.0));
}

#[test]
fn garbage_archive_lines_are_skipped() {
    let (mut ledger, dir) = disk_ledger();
    let archive = dir.path().join("jobs.jsonl");
    write_jsonl(&archive, &[job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 11.0)]).unwrap();
    let mut text = std::fs::read_to_string(&archive).unwrap();
    text.push_str("{\"jobid\": \"oops\"}\n");
    std::fs::write(&archive, text).unwrap();

    let source = JsonlJobSource::open(&archive).unwrap();
    assert_eq!(source.skipped_lines(), 1);
    ledger.set_jobs(source);
    let report = ledger.update_usage_at(T0 + 100.0, 1).unwrap();
    assert_eq!(report.jobs_folded, 1);
}

#[test]
fn second_initialize_is_rejected_after_reopen() {
    let (ledger, dir) = disk_ledger();
    let mut ledger = reopen(ledger, &dir);
    assert!(ledger.initialize_at(T0, 1, 4).is_err());
    assert_eq!(ledger.usage_report().unwrap().banks.len(), 5);
}
