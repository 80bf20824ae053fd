use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::models::ProcessedRecord;
use crate::store;

/// Persisted record of already-announced detections. The file is owned
/// exclusively by the deduplicator; every read-modify-write cycle runs under
/// the internal lock and lands via a full atomic rewrite.
pub struct Ledger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Ledger {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load the full ledger. An absent file is an empty ledger (first run, or
    /// a maintenance truncation forcing reprocessing); a file that exists but
    /// does not parse as a ledger is corruption and errors out.
    pub fn load(&self) -> Result<Vec<ProcessedRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let corrupt = |source: Box<dyn std::error::Error + Send + Sync>| Error::LedgerCorrupt {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| corrupt(e.into()))?;
        let headers = reader.headers().map_err(|e| corrupt(e.into()))?.clone();
        if !headers.is_empty() && headers.iter().ne(ProcessedRecord::HEADERS) {
            return Err(corrupt(
                format!("unexpected ledger columns: {headers:?}").into(),
            ));
        }

        reader
            .deserialize()
            .collect::<std::result::Result<Vec<ProcessedRecord>, csv::Error>>()
            .map_err(|e| corrupt(e.into()))
    }

    /// Append records in one shot: re-read, extend, rewrite atomically.
    /// Either every record lands or none does.
    pub fn append(&self, records: Vec<ProcessedRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows = self.load()?;
        let appended = records.len();
        rows.extend(records);
        store::write_rows_atomic(&self.path, &rows)?;
        Ok(appended)
    }

    /// Identity keys of every ledgered detection.
    pub fn known_ids(&self) -> Result<HashSet<String>> {
        Ok(self.load()?.iter().map(|r| r.transient_id()).collect())
    }
}
