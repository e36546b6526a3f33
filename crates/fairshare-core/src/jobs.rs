//! In-memory job archive.

use crate::error::LedgerError;
use crate::traits::{JobQuery, JobSource};
use crate::types::JobRecord;

/// Job source backed by a `Vec`, for tests and small imports.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobSource {
    jobs: Vec<JobRecord>,
}

impl MemoryJobSource {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self { jobs }
    }

    pub fn push(&mut self, job: JobRecord) {
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobSource for MemoryJobSource {
    fn completed_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, LedgerError> {
        Ok(self
            .jobs
            .iter()
            .filter(|job| query.matches(job))
            .cloned()
            .collect())
    }
}
