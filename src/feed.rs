use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Centroid, DetectionRecord, Flux};

/// Raw feed row as it appears in the tab-separated file. Optional columns
/// deserialize to None whether the column is absent or the value is empty.
#[derive(Debug, Deserialize)]
struct FeedRow {
    source: String,
    observation: String,
    #[serde(rename = "ra[deg]")]
    ra_deg: f64,
    #[serde(rename = "dec[deg]")]
    dec_deg: f64,
    #[serde(rename = "centroid_ra[deg]", default)]
    centroid_ra_deg: Option<f64>,
    #[serde(rename = "centroid_dec[deg]", default)]
    centroid_dec_deg: Option<f64>,
    field: String,
    time: String,
    test_statistic: f64,
    #[serde(rename = "peak_flux[mJy]", default)]
    peak_flux_mjy: Option<f64>,
    #[serde(rename = "peak_flux_90[mJy]", default)]
    peak_flux_90_mjy: Option<f64>,
    #[serde(rename = "peak_flux_150[mJy]", default)]
    peak_flux_150_mjy: Option<f64>,
    #[serde(rename = "fwhm[days]", default)]
    fwhm_days: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    modified: String,
}

/// Read the full detection feed. Any read or parse failure is fatal for the
/// run; callers must not mutate the ledger when this errors.
pub fn read_feed(path: &Path) -> Result<Vec<DetectionRecord>> {
    let unreadable = |source: Box<dyn std::error::Error + Send + Sync>| Error::FeedUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| unreadable(e.into()))?;

    // The flux layout is a property of the whole feed, decided once from the
    // header row.
    let dual_flux = reader
        .headers()
        .map_err(|e| unreadable(e.into()))?
        .iter()
        .any(|h| h == "peak_flux_90[mJy]" || h == "peak_flux_150[mJy]");

    let mut records = Vec::new();
    for row in reader.deserialize::<FeedRow>() {
        let row = row.map_err(|e| unreadable(e.into()))?;
        records.push(into_detection(row, dual_flux, path)?);
    }
    Ok(records)
}

fn into_detection(row: FeedRow, dual_flux: bool, path: &Path) -> Result<DetectionRecord> {
    let parse_time = |value: &str| {
        parse_utc(value).ok_or_else(|| Error::FeedUnreadable {
            path: path.to_path_buf(),
            source: format!("invalid timestamp {value:?}").into(),
        })
    };

    let centroid = match (row.centroid_ra_deg, row.centroid_dec_deg) {
        (Some(ra), Some(dec)) if ra.is_finite() && dec.is_finite() => {
            Some(Centroid { ra_deg: ra, dec_deg: dec })
        }
        _ => None,
    };

    let flux = if dual_flux {
        Flux::Dual {
            peak_90_mjy: row.peak_flux_90_mjy,
            peak_150_mjy: row.peak_flux_150_mjy,
        }
    } else {
        Flux::Single {
            peak_mjy: row.peak_flux_mjy,
        }
    };

    Ok(DetectionRecord {
        time: parse_time(&row.time)?,
        modified: parse_time(&row.modified)?,
        source: row.source,
        observation: row.observation,
        ra_deg: row.ra_deg,
        dec_deg: row.dec_deg,
        centroid,
        field: row.field,
        test_statistic: row.test_statistic,
        flux,
        fwhm_days: row.fwhm_days,
        status: row.status,
    })
}

/// Feed timestamps carry no zone; they are treated as UTC.
fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
