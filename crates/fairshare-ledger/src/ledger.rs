//! The usage ledger facade.
//!
//! [`UsageLedger`] runs a full update pass: it reads every association and
//! its new jobs, updates each association's bins, re-aggregates the bank tree,
//! advances the decay clock, and commits everything as one [`LedgerBatch`].
//! Any error before the commit drops the batch and leaves the ledger as it was.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use fairshare_core::error::{AdminError, IntegrityError, LedgerError};
use fairshare_core::store::{association_not_found, LedgerBatch, LedgerStore, LedgerWrite};
use fairshare_core::traits::{JobQuery, JobSource};
use fairshare_core::types::{Association, AssociationKey, Bank, LedgerHeader, UsageBins};
use fairshare_decay::{check_timestamp, AssociationUsageUpdater, BankTree, DecayClock, UsageBinSet, UsageCase};

/// Summary of one update pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsagePassReport {
    /// Pass time, Unix seconds.
    pub now: f64,
    /// Whether the pass started a new half-life window.
    pub new_window: bool,
    pub associations: usize,
    pub no_change_in_window: usize,
    pub decay_only: usize,
    pub append_in_window: usize,
    pub append_across_window: usize,
    pub jobs_folded: usize,
    pub jobs_skipped: usize,
    /// Aggregated usage of the root bank after the pass.
    pub root_usage: f64,
    /// Decay clock after the pass.
    pub end_half_life_period: f64,
}

impl UsagePassReport {
    fn count(&mut self, case: UsageCase) {
        self.associations += 1;
        match case {
            UsageCase::NoChangeInWindow => self.no_change_in_window += 1,
            UsageCase::DecayOnly => self.decay_only += 1,
            UsageCase::AppendInWindow => self.append_in_window += 1,
            UsageCase::AppendAcrossWindow => self.append_across_window += 1,
        }
    }
}

/// One association row of a [`UsageReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationUsage {
    pub username: String,
    pub userid: u32,
    pub active: bool,
    pub job_usage: f64,
    pub last_job_timestamp: f64,
    pub periods: Vec<f64>,
}

/// One bank row of a [`UsageReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankUsageRow {
    pub name: String,
    /// Distance from the root bank.
    pub depth: usize,
    pub job_usage: f64,
    pub associations: Vec<AssociationUsage>,
}

/// The bank tree in pre-order with each bank's usage and its direct
/// associations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageReport {
    pub banks: Vec<BankUsageRow>,
}

impl UsageReport {
    pub fn bank(&self, name: &str) -> Option<&BankUsageRow> {
        self.banks.iter().find(|row| row.name == name)
    }
}

/// Current wall-clock time as fractional Unix seconds.
pub fn now_secs() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

/// Names are non-empty and NUL-free; association rows are keyed `username\0bank`.
fn check_name(what: &str, name: &str) -> Result<(), IntegrityError> {
    if name.is_empty() {
        return Err(IntegrityError::InvalidParameter(format!("{what} must not be empty")));
    }
    if name.contains('\0') {
        return Err(IntegrityError::InvalidParameter(format!("{what} {name:?} contains NUL")));
    }
    Ok(())
}

/// Usage ledger over a store and a job source.
///
/// Passes are serialized by `&mut self`; nothing here locks.
pub struct UsageLedger<S, J> {
    store: S,
    jobs: J,
    updater: AssociationUsageUpdater,
}

impl<S: LedgerStore, J: JobSource> UsageLedger<S, J> {
    pub fn new(store: S, jobs: J) -> Self {
        Self {
            store,
            jobs,
            updater: AssociationUsageUpdater::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    /// Swap the job source, e.g. for the next archive export.
    pub fn set_jobs(&mut self, jobs: J) {
        self.jobs = jobs;
    }

    pub fn into_parts(self) -> (S, J) {
        (self.store, self.jobs)
    }

    fn header(&self) -> Result<LedgerHeader, LedgerError> {
        Ok(self
            .store
            .header()?
            .ok_or(IntegrityError::MissingLedgerHeader)?)
    }

    // --- Administration ---

    /// Create the ledger header. The first period ends one half-life from now.
    pub fn initialize(
        &mut self,
        half_life_weeks: u32,
        usage_periods: usize,
    ) -> Result<LedgerHeader, LedgerError> {
        self.initialize_at(now_secs(), half_life_weeks, usage_periods)
    }

    pub fn initialize_at(
        &mut self,
        now: f64,
        half_life_weeks: u32,
        usage_periods: usize,
    ) -> Result<LedgerHeader, LedgerError> {
        let now = check_timestamp(now)?;
        if self.store.header()?.is_some() {
            return Err(AdminError::AlreadyInitialized.into());
        }
        if usage_periods == 0 {
            return Err(IntegrityError::InvalidParameter("usage_periods must be at least 1".into()).into());
        }
        let clock = DecayClock::new(now, half_life_weeks)?;
        let header = LedgerHeader::starting_at(clock.end_half_life_period(), half_life_weeks, usage_periods);

        let mut batch = LedgerBatch::new();
        batch.push(LedgerWrite::PutHeader(header));
        self.store.commit(batch)?;
        info!(
            half_life_weeks,
            usage_periods,
            end_half_life_period = header.end_half_life_period,
            "ledger initialized"
        );
        Ok(header)
    }

    /// Add a bank. `parent` is `None` for the root, of which there is one.
    pub fn add_bank(&mut self, name: &str, parent: Option<&str>, priority: f64) -> Result<Bank, LedgerError> {
        check_name("bank name", name)?;
        if self.store.bank(name)?.is_some() {
            return Err(AdminError::DuplicateBank(name.to_string()).into());
        }
        match parent {
            None => {
                if let Some(root) = self.store.banks()?.into_iter().find(Bank::is_root) {
                    return Err(AdminError::RootExists(root.name).into());
                }
            }
            Some(parent) => {
                if self.store.bank(parent)?.is_none() {
                    return Err(AdminError::BankNotFound(parent.to_string()).into());
                }
            }
        }

        let bank = Bank {
            priority,
            ..Bank::new(name, parent.map(str::to_string))
        };
        let mut batch = LedgerBatch::new();
        batch.push(LedgerWrite::PutBank(bank.clone()));
        self.store.commit(batch)?;
        info!(bank = name, parent = parent.unwrap_or(""), "bank added");
        Ok(bank)
    }

    /// Add an association with a zeroed bin row.
    ///
    /// A user's first association is always their default. Making a later
    /// one the default repoints the user's other associations to it.
    pub fn add_association(
        &mut self,
        username: &str,
        userid: u32,
        bank: &str,
        is_default: bool,
    ) -> Result<Association, LedgerError> {
        check_name("username", username)?;
        let header = self.header()?;
        if self.store.bank(bank)?.is_none() {
            return Err(AdminError::BankNotFound(bank.to_string()).into());
        }
        let key = AssociationKey::new(username, bank);
        if self.store.association(&key)?.is_some() {
            return Err(AdminError::DuplicateAssociation {
                username: username.to_string(),
                bank: bank.to_string(),
            }
            .into());
        }

        let existing: Vec<Association> = self
            .store
            .associations()?
            .into_iter()
            .filter(|a| a.username == username)
            .collect();
        let current_default = existing.iter().find(|a| a.is_default()).map(|a| a.default_bank.clone());

        let mut batch = LedgerBatch::new();
        let default_bank = match current_default {
            Some(current) if !is_default => current,
            _ => {
                for mut other in existing {
                    other.default_bank = bank.to_string();
                    batch.push(LedgerWrite::PutAssociation(other));
                }
                bank.to_string()
            }
        };

        let association = Association {
            default_bank,
            ..Association::new(username, userid, bank)
        };
        batch.push(LedgerWrite::PutAssociation(association.clone()));
        batch.push(LedgerWrite::PutUsageBins {
            key,
            bins: UsageBins::zeroed(header.usage_periods),
        });
        self.store.commit(batch)?;
        info!(
            association = %association.key(),
            userid,
            default = association.is_default(),
            "association added"
        );
        Ok(association)
    }

    /// Logically enable or disable an association. Usage history is kept.
    pub fn set_association_active(&mut self, key: &AssociationKey, active: bool) -> Result<(), LedgerError> {
        if self.store.association(key)?.is_none() {
            return Err(association_not_found(key));
        }
        let mut batch = LedgerBatch::new();
        batch.push(LedgerWrite::SetAssociationActive {
            key: key.clone(),
            active,
        });
        self.store.commit(batch)?;
        info!(association = %key, active, "association activity changed");
        Ok(())
    }

    // --- Usage ---

    /// Run one update pass at the current time.
    pub fn update_usage(&mut self, half_life_weeks: u32) -> Result<UsagePassReport, LedgerError> {
        self.update_usage_at(now_secs(), half_life_weeks)
    }

    /// Run one update pass as of `now`.
    ///
    /// # Errors
    ///
    /// Configuration-integrity violations and storage failures abort the pass
    /// with nothing committed. Malformed job records are skipped.
    pub fn update_usage_at(&mut self, now: f64, half_life_weeks: u32) -> Result<UsagePassReport, LedgerError> {
        let now = check_timestamp(now)?;
        let header = self.header()?;
        let clock = DecayClock::from_header(&header)?.with_half_life(half_life_weeks)?;
        let window = clock.observe(now);
        let next = clock.advanced(now)?;

        let banks = self.store.banks()?;
        let tree = BankTree::build(&banks)?;
        let ignore_older_than: HashMap<&str, Option<f64>> = banks
            .iter()
            .map(|b| (b.name.as_str(), b.ignore_older_than))
            .collect();

        let mut report = UsagePassReport {
            now,
            new_window: window.new_window,
            ..UsagePassReport::default()
        };
        let mut batch = LedgerBatch::new();
        let mut usage: Vec<(AssociationKey, f64)> = Vec::new();

        for association in self.store.associations()? {
            let key = association.key();
            let bins = self.checked_bins(&key, header.usage_periods)?;
            let ignore = ignore_older_than.get(key.bank.as_str()).copied().flatten();
            let query = JobQuery::for_association(&association, bins.last_job_timestamp, ignore);
            let jobs = self.jobs.completed_jobs(&query)?;

            let update = self.updater.update(key, bins, jobs, &window);
            report.count(update.case);
            report.jobs_folded += update.jobs_folded;
            report.jobs_skipped += update.jobs_skipped;
            batch.extend(update.writes());

            let job_usage = if update.case.writes_back() {
                update.job_usage
            } else {
                association.job_usage
            };
            usage.push((update.key, job_usage));
        }

        let totals = tree.aggregate(usage.iter().map(|(key, u)| (key, *u)))?;
        batch.extend(totals.writes());

        batch.push(LedgerWrite::PutHeader(next.to_header(header.usage_periods)));

        report.root_usage = totals.root_usage();
        report.end_half_life_period = next.end_half_life_period();

        self.store.commit(batch)?;
        info!(
            now,
            new_window = report.new_window,
            associations = report.associations,
            jobs_folded = report.jobs_folded,
            jobs_skipped = report.jobs_skipped,
            root_usage = report.root_usage,
            end_half_life_period = report.end_half_life_period,
            "usage pass committed"
        );
        Ok(report)
    }

    /// Reset usage of one bank at the current time.
    pub fn clear_usage(&mut self, bank: &str) -> Result<(), LedgerError> {
        self.clear_usage_at(now_secs(), bank)
    }

    /// Reset usage of `bank` as of `now`.
    ///
    /// Every direct association's usage and bins go to zero (watermarks are
    /// kept), jobs completed at or before `now` are excluded from this bank
    /// from now on, and the tree is re-aggregated. One atomic commit.
    pub fn clear_usage_at(&mut self, now: f64, bank: &str) -> Result<(), LedgerError> {
        let now = check_timestamp(now)?;
        let header = self.header()?;
        if self.store.bank(bank)?.is_none() {
            return Err(AdminError::BankNotFound(bank.to_string()).into());
        }
        let tree = BankTree::build(&self.store.banks()?)?;

        let mut batch = LedgerBatch::new();
        let mut usage: Vec<(AssociationKey, f64)> = Vec::new();
        let mut cleared = 0usize;
        for association in self.store.associations()? {
            let key = association.key();
            if association.bank != bank {
                usage.push((key, association.job_usage));
                continue;
            }
            let mut set = UsageBinSet::from_bins(self.checked_bins(&key, header.usage_periods)?);
            set.clear();
            batch.push(LedgerWrite::PutUsageBins {
                key: key.clone(),
                bins: set.to_bins(),
            });
            batch.push(LedgerWrite::SetAssociationUsage {
                key: key.clone(),
                job_usage: 0.0,
            });
            usage.push((key, 0.0));
            cleared += 1;
        }

        batch.push(LedgerWrite::SetBankUsage {
            bank: bank.to_string(),
            job_usage: 0.0,
        });
        batch.push(LedgerWrite::SetIgnoreOlderThan {
            bank: bank.to_string(),
            timestamp: now,
        });

        let totals = tree.aggregate(usage.iter().map(|(key, u)| (key, *u)))?;
        batch.extend(totals.writes());

        self.store.commit(batch)?;
        info!(bank, associations = cleared, ignore_older_than = now, "bank usage cleared");
        Ok(())
    }

    /// Every bank in pre-order with its usage and direct associations.
    pub fn usage_report(&self) -> Result<UsageReport, LedgerError> {
        let banks = self.store.banks()?;
        let tree = BankTree::build(&banks)?;
        let bank_usage: HashMap<&str, f64> = banks.iter().map(|b| (b.name.as_str(), b.job_usage)).collect();

        let mut by_bank: HashMap<String, Vec<AssociationUsage>> = HashMap::new();
        for association in self.store.associations()? {
            let key = association.key();
            let bins = self
                .store
                .usage_bins(&key)?
                .ok_or_else(|| missing_bins(&key))?;
            by_bank.entry(association.bank).or_default().push(AssociationUsage {
                username: association.username,
                userid: association.userid,
                active: association.active,
                job_usage: association.job_usage,
                last_job_timestamp: bins.last_job_timestamp,
                periods: bins.periods,
            });
        }

        let rows = tree
            .pre_order()
            .into_iter()
            .map(|(depth, name)| BankUsageRow {
                name: name.to_string(),
                depth,
                job_usage: bank_usage.get(name).copied().unwrap_or_default(),
                associations: by_bank.remove(name).unwrap_or_default(),
            })
            .collect();
        debug!(banks = banks.len(), "usage report built");
        Ok(UsageReport { banks: rows })
    }

    /// Bins of `key`, checked against the ledger's bin count.
    fn checked_bins(&self, key: &AssociationKey, usage_periods: usize) -> Result<UsageBins, LedgerError> {
        let bins = self
            .store
            .usage_bins(key)?
            .ok_or_else(|| missing_bins(key))?;
        if bins.periods.len() != usage_periods {
            return Err(IntegrityError::UsagePeriodMismatch {
                username: key.username.clone(),
                bank: key.bank.clone(),
                got: bins.periods.len(),
                expected: usage_periods,
            }
            .into());
        }
        Ok(bins)
    }
}

fn missing_bins(key: &AssociationKey) -> IntegrityError {
    IntegrityError::MissingUsageBins {
        username: key.username.clone(),
        bank: key.bank.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairshare_core::constants::SECONDS_PER_WEEK;
    use fairshare_core::jobs::MemoryJobSource;
    use fairshare_core::store::MemoryLedgerStore;
    use fairshare_core::types::JobRecord;

    const T0: f64 = 1_000_000.0;

    fn job(jobid: u64, userid: u32, bank: Option<&str>, nnodes: u32, t_run: f64, t_inactive: f64) -> JobRecord {
        JobRecord {
            jobid,
            userid,
            bank: bank.map(str::to_string),
            nnodes,
            t_run: Some(t_run),
            t_inactive: Some(t_inactive),
        }
    }

    /// root -> {A -> {D, E}, C}
    fn ledger() -> UsageLedger<MemoryLedgerStore, MemoryJobSource> {
        let mut ledger = UsageLedger::new(MemoryLedgerStore::new(), MemoryJobSource::default());
        ledger.initialize_at(T0, 1, 4).unwrap();
        ledger.add_bank("root", None, 1.0).unwrap();
        ledger.add_bank("A", Some("root"), 1.0).unwrap();
        ledger.add_bank("C", Some("root"), 1.0).unwrap();
        ledger.add_bank("D", Some("A"), 1.0).unwrap();
        ledger.add_bank("E", Some("A"), 1.0).unwrap();
        ledger.add_association("1001", 1001, "D", true).unwrap();
        ledger.add_association("1002", 1002, "C", true).unwrap();
        ledger.add_association("1003", 1003, "E", true).unwrap();
        ledger
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let mut l = ledger();
        let err = l.initialize_at(T0, 1, 4).unwrap_err();
        assert!(matches!(err, LedgerError::Admin(AdminError::AlreadyInitialized)));
    }

    #[test]
    fn second_root_is_rejected() {
        let mut l = ledger();
        let err = l.add_bank("other", None, 1.0).unwrap_err();
        assert!(matches!(err, LedgerError::Admin(AdminError::RootExists(r)) if r == "root"));
    }

    #[test]
    fn association_needs_known_bank_and_unique_pair() {
        let mut l = ledger();
        assert!(matches!(
            l.add_association("x", 1, "nope", true),
            Err(LedgerError::Admin(AdminError::BankNotFound(_)))
        ));
        assert!(matches!(
            l.add_association("1001", 1001, "D", false),
            Err(LedgerError::Admin(AdminError::DuplicateAssociation { .. }))
        ));
    }

    #[test]
    fn new_default_repoints_other_associations() {
        let mut l = ledger();
        let second = l.add_association("1001", 1001, "E", false).unwrap();
        assert_eq!(second.default_bank, "D");
        l.add_association("1001", 1001, "C", true).unwrap();
        let d = l.store().association(&AssociationKey::new("1001", "D")).unwrap().unwrap();
        assert_eq!(d.default_bank, "C");
        assert!(!d.is_default());
    }

    #[test]
    fn pass_folds_jobs_and_aggregates() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![
            job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 35.0),
            job(2, 1003, Some("E"), 2, T0 + 10.0, T0 + 15.0),
            job(3, 1002, None, 1, T0 + 10.0, T0 + 17.0),
        ]));
        let report = l.update_usage_at(T0 + 100.0, 1).unwrap();
        assert!(!report.new_window);
        assert_eq!(report.append_in_window, 3);
        assert_eq!(report.jobs_folded, 3);
        assert_eq!(report.root_usage, 42.0);

        let s = l.store();
        assert_eq!(s.bank("D").unwrap().unwrap().job_usage, 25.0);
        assert_eq!(s.bank("E").unwrap().unwrap().job_usage, 10.0);
        assert_eq!(s.bank("A").unwrap().unwrap().job_usage, 35.0);
        assert_eq!(s.bank("C").unwrap().unwrap().job_usage, 7.0);
    }

    #[test]
    fn second_pass_in_window_is_idempotent() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 35.0)]));
        l.update_usage_at(T0 + 100.0, 1).unwrap();
        let before = l.usage_report().unwrap();
        let report = l.update_usage_at(T0 + 200.0, 1).unwrap();
        assert_eq!(report.no_change_in_window, 3);
        assert_eq!(l.usage_report().unwrap(), before);
    }

    #[test]
    fn rollover_decays_and_advances_clock() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 50.0)]));
        l.update_usage_at(T0 + 100.0, 1).unwrap();

        let later = T0 + 2.5 * SECONDS_PER_WEEK;
        let report = l.update_usage_at(later, 1).unwrap();
        assert!(report.new_window);
        assert_eq!(report.decay_only, 3);
        assert!(report.end_half_life_period > later - SECONDS_PER_WEEK);

        let key = AssociationKey::new("1001", "D");
        let bins = l.store().usage_bins(&key).unwrap().unwrap();
        assert_eq!(bins.periods, vec![0.0, 20.0, 0.0, 0.0]);
        assert_eq!(l.store().bank("root").unwrap().unwrap().job_usage, 20.0);
    }

    #[test]
    fn missing_bins_abort_pass_without_writes() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 50.0)]));
        let commits = l.store().commit_count();
        let (mut store, jobs) = l.into_parts();
        store.remove_usage_bins(&AssociationKey::new("1002", "C"));
        let mut l = UsageLedger::new(store, jobs);

        let err = l.update_usage_at(T0 + 100.0, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Integrity(IntegrityError::MissingUsageBins { .. })));
        assert_eq!(l.store().commit_count(), commits);
        assert_eq!(l.store().bank("root").unwrap().unwrap().job_usage, 0.0);
    }

    #[test]
    fn pass_without_header_fails() {
        let mut l = UsageLedger::new(MemoryLedgerStore::new(), MemoryJobSource::default());
        assert!(matches!(
            l.update_usage_at(T0, 1),
            Err(LedgerError::Integrity(IntegrityError::MissingLedgerHeader))
        ));
    }

    #[test]
    fn clear_usage_resets_bank_and_ancestors() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![
            job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 35.0),
            job(2, 1003, Some("E"), 2, T0 + 10.0, T0 + 15.0),
        ]));
        l.update_usage_at(T0 + 100.0, 1).unwrap();
        l.clear_usage_at(T0 + 150.0, "D").unwrap();

        let key = AssociationKey::new("1001", "D");
        let assoc = l.store().association(&key).unwrap().unwrap();
        let bins = l.store().usage_bins(&key).unwrap().unwrap();
        assert_eq!(assoc.job_usage, 0.0);
        assert!(bins.periods.iter().all(|p| *p == 0.0));
        assert_eq!(bins.last_job_timestamp, T0 + 35.0);

        let d = l.store().bank("D").unwrap().unwrap();
        assert_eq!(d.job_usage, 0.0);
        assert_eq!(d.ignore_older_than, Some(T0 + 150.0));
        assert_eq!(l.store().bank("A").unwrap().unwrap().job_usage, 10.0);
        assert_eq!(l.store().bank("root").unwrap().unwrap().job_usage, 10.0);
    }

    #[test]
    fn non_finite_pass_time_is_rejected_before_staging() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![job(1, 1001, Some("D"), 1, T0 + 10.0, T0 + 50.0)]));
        let commits = l.store().commit_count();
        let header = l.store().header().unwrap();

        for now in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                l.update_usage_at(now, 1),
                Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
            ));
            assert!(matches!(
                l.clear_usage_at(now, "D"),
                Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
            ));
        }
        assert_eq!(l.store().commit_count(), commits);
        assert_eq!(l.store().header().unwrap(), header);
        assert_eq!(l.store().bank("D").unwrap().unwrap().ignore_older_than, None);

        // The ledger is still usable afterwards.
        let report = l.update_usage_at(T0 + 100.0, 1).unwrap();
        assert_eq!(report.jobs_folded, 1);
    }

    #[test]
    fn initialize_rejects_non_finite_time() {
        let mut l = UsageLedger::new(MemoryLedgerStore::new(), MemoryJobSource::default());
        assert!(matches!(
            l.initialize_at(f64::NAN, 1, 4),
            Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
        ));
        assert!(l.store().header().unwrap().is_none());
    }

    #[test]
    fn far_future_pass_returns() {
        let mut l = ledger();
        match l.update_usage_at(1e22, 1) {
            Ok(report) => assert!(report.end_half_life_period.is_finite()),
            Err(err) => assert!(matches!(err, LedgerError::Integrity(IntegrityError::InvalidParameter(_)))),
        }
    }

    #[test]
    fn names_with_nul_are_rejected() {
        let mut l = ledger();
        assert!(matches!(
            l.add_bank("b\0c", Some("root"), 1.0),
            Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
        ));
        assert!(matches!(
            l.add_association("a\0b", 7, "C", true),
            Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
        ));
        assert!(matches!(
            l.add_association("", 7, "C", true),
            Err(LedgerError::Integrity(IntegrityError::InvalidParameter(_)))
        ));
        assert!(l.store().bank("b\0c").unwrap().is_none());
    }

    #[test]
    fn clear_unknown_bank_fails() {
        let mut l = ledger();
        assert!(matches!(
            l.clear_usage_at(T0, "ghost"),
            Err(LedgerError::Admin(AdminError::BankNotFound(_)))
        ));
    }

    #[test]
    fn deactivated_association_keeps_usage() {
        let mut l = ledger();
        l.set_jobs(MemoryJobSource::new(vec![job(1, 1002, Some("C"), 1, T0 + 1.0, T0 + 9.0)]));
        l.update_usage_at(T0 + 100.0, 1).unwrap();
        let key = AssociationKey::new("1002", "C");
        l.set_association_active(&key, false).unwrap();
        let assoc = l.store().association(&key).unwrap().unwrap();
        assert!(!assoc.active);
        assert_eq!(assoc.job_usage, 8.0);
    }

    #[test]
    fn report_walks_tree_in_pre_order() {
        let l = ledger();
        let report = l.usage_report().unwrap();
        let names: Vec<(&str, usize)> = report.banks.iter().map(|b| (b.name.as_str(), b.depth)).collect();
        assert_eq!(names, vec![("root", 0), ("A", 1), ("D", 2), ("E", 2), ("C", 1)]);
        assert_eq!(report.bank("D").unwrap().associations[0].username, "1001");
        assert_eq!(report.bank("D").unwrap().associations[0].periods.len(), 4);
    }
}
