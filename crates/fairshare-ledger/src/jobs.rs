//! JSON-lines job archive.
//!
//! One [`JobRecord`] per line. Blank lines are ignored; lines that fail to
//! parse are logged and skipped so one bad export line cannot block a pass.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use fairshare_core::error::LedgerError;
use fairshare_core::traits::{JobQuery, JobSource};
use fairshare_core::types::JobRecord;

/// Job source loaded from a JSON-lines file.
#[derive(Debug, Clone, Default)]
pub struct JsonlJobSource {
    jobs: Vec<JobRecord>,
    skipped_lines: usize,
}

impl JsonlJobSource {
    /// Read every record in `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| LedgerError::JobSource(format!("{}: {e}", path.display())))?;
        let source = Self::from_reader(BufReader::new(file))?;
        debug!(
            path = %path.display(),
            jobs = source.jobs.len(),
            skipped = source.skipped_lines,
            "job archive loaded"
        );
        Ok(source)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LedgerError> {
        let mut source = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| LedgerError::JobSource(e.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JobRecord>(trimmed) {
                Ok(job) => source.jobs.push(job),
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "skipping unparseable job line");
                    source.skipped_lines += 1;
                }
            }
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Lines that were not valid job records.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl JobSource for JsonlJobSource {
    fn completed_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, LedgerError> {
        Ok(self
            .jobs
            .iter()
            .filter(|job| query.matches(job))
            .cloned()
            .collect())
    }
}
