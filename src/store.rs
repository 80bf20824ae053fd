use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Read a comma-separated store, treating an absent file as an empty table.
/// Stores are created lazily on first write.
pub fn read_rows_or_empty<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let unreadable = |source: csv::Error| Error::StoreUnreadable {
        path: path.to_path_buf(),
        source: source.into(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(unreadable)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(unreadable)
}

/// Rewrite a store in full: serialize to a sibling temp file, then rename
/// over the target so readers see either the old table or the new one.
pub fn write_rows_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let failed = |source: Box<dyn std::error::Error + Send + Sync>| Error::StoreWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| failed(e.into()))?;
        }
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| failed(e.into()))?;
        for row in rows {
            writer.serialize(row).map_err(|e| failed(e.into()))?;
        }
        writer.flush().map_err(|e| failed(e.into()))?;
    }
    fs::rename(&tmp, path).map_err(|e| failed(e.into()))
}
