//! Persisted record of update cycle runs
//!
//! The scheduler consults the ledger so that a cycle fires at most once per
//! calendar day even when it wakes several times inside the trigger hour.

use crate::error::LedgerError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Which past runs block another run on the same day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Any attempt, failed or not, consumes the day
    #[default]
    OncePerDay,
    /// Only a completed cycle consumes the day; failures may be retried
    UntilSuccess,
}

/// Dates of the last attempted and last completed cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub last_attempt: Option<NaiveDate>,
    pub last_success: Option<NaiveDate>,
}

/// Run ledger, optionally persisted to a JSON file
#[derive(Debug)]
pub struct RunLedger {
    path: Option<PathBuf>,
    record: Mutex<RunRecord>,
}

impl RunLedger {
    /// Ledger that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            record: Mutex::new(RunRecord::default()),
        }
    }

    /// Open the ledger at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let record = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| LedgerError::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RunRecord::default(),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };

        debug!(path = %path.display(), ?record, "Opened run ledger");

        Ok(Self {
            path: Some(path),
            record: Mutex::new(record),
        })
    }

    pub fn record(&self) -> RunRecord {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if a run on `date` already happened under `policy`
    pub fn has_run_on(&self, date: NaiveDate, policy: RetryPolicy) -> bool {
        let record = self.record();
        let last = match policy {
            RetryPolicy::OncePerDay => record.last_attempt,
            RetryPolicy::UntilSuccess => record.last_success,
        };
        last == Some(date)
    }

    /// Record a cycle start on `date`.
    ///
    /// The in-memory record is updated even when persisting fails.
    pub fn mark_attempt(&self, date: NaiveDate) -> Result<(), LedgerError> {
        self.update(|record| record.last_attempt = Some(date))
    }

    /// Record a completed cycle on `date`
    pub fn mark_success(&self, date: NaiveDate) -> Result<(), LedgerError> {
        self.update(|record| record.last_success = Some(date))
    }

    fn update(&self, apply: impl FnOnce(&mut RunRecord)) -> Result<(), LedgerError> {
        let snapshot = {
            let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut record);
            *record
        };

        match &self.path {
            Some(path) => persist(path, &snapshot),
            None => Ok(()),
        }
    }
}

/// Write via a temp file and rename so a crash never leaves a torn ledger
fn persist(path: &Path, record: &RunRecord) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(record).map_err(|source| LedgerError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path).map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[test]
    fn test_once_per_day_counts_attempts() {
        let ledger = RunLedger::in_memory();
        assert!(!ledger.has_run_on(day(10), RetryPolicy::OncePerDay));

        ledger.mark_attempt(day(10)).unwrap();
        assert!(ledger.has_run_on(day(10), RetryPolicy::OncePerDay));
        assert!(!ledger.has_run_on(day(11), RetryPolicy::OncePerDay));
    }

    #[test]
    fn test_until_success_ignores_failed_attempts() {
        let ledger = RunLedger::in_memory();
        ledger.mark_attempt(day(10)).unwrap();
        assert!(!ledger.has_run_on(day(10), RetryPolicy::UntilSuccess));

        ledger.mark_success(day(10)).unwrap();
        assert!(ledger.has_run_on(day(10), RetryPolicy::UntilSuccess));
    }

    #[test]
    fn test_ledger_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("update-ledger.json");

        let ledger = RunLedger::open(&path).unwrap();
        assert_eq!(ledger.record(), RunRecord::default());
        ledger.mark_attempt(day(12)).unwrap();
        ledger.mark_success(day(12)).unwrap();

        let reopened = RunLedger::open(&path).unwrap();
        assert_eq!(
            reopened.record(),
            RunRecord {
                last_attempt: Some(day(12)),
                last_success: Some(day(12)),
            }
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_ledger_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("update-ledger.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = RunLedger::open(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Format { .. }));
    }

    #[test]
    fn test_persist_failure_keeps_memory_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing-dir").join("ledger.json");

        let ledger = RunLedger::open(&path).unwrap();
        assert!(ledger.mark_attempt(day(3)).is_err());
        assert!(ledger.has_run_on(day(3), RetryPolicy::OncePerDay));
    }
}
