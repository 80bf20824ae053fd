use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coords;
use crate::error::{Error, Result};
use crate::feed;
use crate::ledger::Ledger;
use crate::models::{DetectionRecord, Flux, ProcessedRecord};

/// Detections announced per run. Throttles downstream image generation and
/// posting; the overflow is picked up on the next run in feed order.
pub const ANNOUNCE_BATCH_LIMIT: usize = 5;

/// First-run lookback: only unstatused detections newer than this are
/// announced when the ledger is empty.
pub const BOOTSTRAP_WINDOW_DAYS: i64 = 30;

/// What a single check will do: `announce` goes out to the messaging layer
/// and into the ledger; `backfill` goes into the ledger silently (first-run
/// historical backlog).
#[derive(Debug, Default)]
pub struct CheckPlan {
    pub announce: Vec<DetectionRecord>,
    pub backfill: Vec<DetectionRecord>,
}

/// The ordered batch of feed rows to announce, per the dedup policy.
pub fn select_new_detections(
    feed: &[DetectionRecord],
    ledger: &[ProcessedRecord],
    now: DateTime<Utc>,
) -> Vec<DetectionRecord> {
    plan_check(feed, ledger, now).announce
}

pub fn plan_check(
    feed: &[DetectionRecord],
    ledger: &[ProcessedRecord],
    now: DateTime<Utc>,
) -> CheckPlan {
    if ledger.is_empty() {
        // First run: announcing the full historical backlog would flood the
        // channel. Announce only recent unstatused rows, and record every
        // historical "new" row as seen without announcing it.
        let cutoff = now - Duration::days(BOOTSTRAP_WINDOW_DAYS);
        let announce = feed
            .iter()
            .filter(|r| r.status.is_none() && r.time > cutoff)
            .take(ANNOUNCE_BATCH_LIMIT)
            .cloned()
            .collect();
        let backfill = feed
            .iter()
            .filter(|r| r.status.as_deref() == Some("new"))
            .cloned()
            .collect();
        return CheckPlan { announce, backfill };
    }

    let seen: HashSet<String> = ledger.iter().map(|r| r.transient_id()).collect();
    let announce = feed
        .iter()
        .filter(|r| !seen.contains(&r.transient_id()) && status_eligible(r))
        .take(ANNOUNCE_BATCH_LIMIT)
        .cloned()
        .collect();
    CheckPlan {
        announce,
        backfill: Vec::new(),
    }
}

// Rows explicitly marked with any other status (e.g. "processed",
// "rejected") are permanently skipped even when absent from the ledger.
fn status_eligible(record: &DetectionRecord) -> bool {
    matches!(record.status.as_deref(), None | Some("new"))
}

/// One announced detection, reduced to what the messaging and image
/// collaborators consume.
#[derive(Debug, Clone, Serialize)]
pub struct Announcement {
    pub transient_id: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub time: DateTime<Utc>,
    pub field: String,
    pub test_statistic: f64,
    pub flux: Flux,
    pub fwhm_days: Option<f64>,
    pub status: Option<String>,
}

impl Announcement {
    pub fn from_detection(record: &DetectionRecord) -> Self {
        let (ra_deg, dec_deg) = coords::resolve_coordinates(record);
        Announcement {
            transient_id: record.transient_id(),
            ra_deg,
            dec_deg,
            time: record.time,
            field: record.field.clone(),
            test_statistic: record.test_statistic,
            flux: record.flux.clone(),
            fwhm_days: record.fwhm_days,
            status: record.status.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub announcements: Vec<Announcement>,
    pub backfilled: usize,
}

/// Watches the detection feed and keeps the processed ledger. Constructed
/// with explicit store locations; owns the ledger and the last-check
/// watermark exclusively.
pub struct Deduplicator {
    feed_path: PathBuf,
    ledger: Ledger,
    last_check_path: PathBuf,
}

impl Deduplicator {
    pub fn new(
        feed_path: impl Into<PathBuf>,
        ledger_path: impl Into<PathBuf>,
        last_check_path: impl Into<PathBuf>,
    ) -> Self {
        Deduplicator {
            feed_path: feed_path.into(),
            ledger: Ledger::new(ledger_path.into()),
            last_check_path: last_check_path.into(),
        }
    }

    /// Select the current batch without touching the ledger or watermark.
    pub fn preview(&self, now: DateTime<Utc>) -> Result<Vec<Announcement>> {
        let feed = feed::read_feed(&self.feed_path)?;
        let ledger_rows = self.ledger.load()?;
        Ok(select_new_detections(&feed, &ledger_rows, now)
            .iter()
            .map(Announcement::from_detection)
            .collect())
    }

    /// One scheduled check: read the feed, select the batch to announce,
    /// record it (plus any first-run backfill) in the ledger, advance the
    /// watermark. Any failure leaves ledger and watermark untouched.
    pub fn run_check(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        debug!(
            last_check = %self.load_last_check(now),
            "starting detection feed check"
        );

        let feed = feed::read_feed(&self.feed_path)?;
        let ledger_rows = self.ledger.load()?;
        let plan = plan_check(&feed, &ledger_rows, now);

        info!(
            feed_total = feed.len(),
            processed = ledger_rows.len(),
            new = plan.announce.len(),
            backfill = plan.backfill.len(),
            "checked detection feed"
        );

        let announcements: Vec<Announcement> = plan
            .announce
            .iter()
            .map(Announcement::from_detection)
            .collect();

        let to_record: Vec<ProcessedRecord> = plan
            .announce
            .iter()
            .chain(plan.backfill.iter())
            .map(|r| ProcessedRecord::from_detection(r, now))
            .collect();
        self.ledger.append(to_record)?;

        self.save_last_check(now)?;

        Ok(CheckOutcome {
            announcements,
            backfilled: plan.backfill.len(),
        })
    }

    /// Maintenance pass: record every feed row not yet in the ledger as
    /// processed, announcing nothing. No status filter here.
    pub fn process_all(&self, now: DateTime<Utc>) -> Result<usize> {
        let feed = feed::read_feed(&self.feed_path)?;
        let seen = self.ledger.known_ids()?;
        let unprocessed: Vec<ProcessedRecord> = feed
            .iter()
            .filter(|r| !seen.contains(&r.transient_id()))
            .map(|r| ProcessedRecord::from_detection(r, now))
            .collect();
        self.ledger.append(unprocessed)
    }

    pub fn read_feed(&self) -> Result<Vec<DetectionRecord>> {
        feed::read_feed(&self.feed_path)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Time of the previous successful check; falls back to 24 hours ago
    /// when the watermark is missing or unreadable.
    pub fn load_last_check(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match fs::read_to_string(&self.last_check_path) {
            Ok(raw) => match DateTime::parse_from_rfc3339(raw.trim()) {
                Ok(dt) => return dt.with_timezone(&Utc),
                Err(err) => warn!(
                    path = %self.last_check_path.display(),
                    error = %err,
                    "invalid last-check watermark"
                ),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.last_check_path.display(),
                error = %err,
                "unreadable last-check watermark"
            ),
        }
        now - Duration::hours(24)
    }

    fn save_last_check(&self, check_time: DateTime<Utc>) -> Result<()> {
        write_watermark(&self.last_check_path, check_time)
    }
}

fn write_watermark(path: &Path, check_time: DateTime<Utc>) -> Result<()> {
    fs::write(path, check_time.to_rfc3339()).map_err(|e| Error::StoreWriteFailed {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn detection(
        source: &str,
        observation: &str,
        status: Option<&str>,
        days_ago: i64,
    ) -> DetectionRecord {
        DetectionRecord {
            source: source.to_string(),
            observation: observation.to_string(),
            ra_deg: 100.0,
            dec_deg: -10.0,
            centroid: None,
            field: "field_a".to_string(),
            time: now() - Duration::days(days_ago),
            test_statistic: 20.0,
            flux: Flux::Single { peak_mjy: Some(5.0) },
            fwhm_days: None,
            status: status.map(str::to_string),
            modified: now() - Duration::days(days_ago),
        }
    }

    fn processed(record: &DetectionRecord) -> ProcessedRecord {
        ProcessedRecord::from_detection(record, now())
    }

    #[test]
    fn steady_state_skips_ledgered_rows() {
        let feed = vec![
            detection("J0102-21", "1", Some("new"), 2),
            detection("J0304+05", "2", None, 1),
        ];
        let ledger = vec![processed(&feed[0])];

        let batch = select_new_detections(&feed, &ledger, now());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].transient_id(), "J0304+05_2");
    }

    #[test]
    fn reordering_the_feed_never_reintroduces_ledgered_rows() {
        let feed = vec![
            detection("J0102-21", "1", Some("new"), 2),
            detection("J0304+05", "2", None, 1),
        ];
        let ledger = vec![processed(&feed[0]), processed(&feed[1])];

        let reversed: Vec<DetectionRecord> = feed.iter().rev().cloned().collect();
        assert!(select_new_detections(&reversed, &ledger, now()).is_empty());
    }

    #[test]
    fn planning_is_idempotent_without_a_ledger_write() {
        let feed: Vec<DetectionRecord> = (0..8)
            .map(|i| detection("J0102-21", &i.to_string(), Some("new"), 2))
            .collect();
        let ledger = vec![processed(&detection("J9999+99", "0", Some("new"), 40))];

        let first = select_new_detections(&feed, &ledger, now());
        let second = select_new_detections(&feed, &ledger, now());
        assert_eq!(first, second);
    }

    #[test]
    fn batch_is_capped_in_feed_order() {
        let feed: Vec<DetectionRecord> = (0..9)
            .map(|i| detection("J0102-21", &i.to_string(), Some("new"), 2))
            .collect();
        let ledger = vec![processed(&detection("J9999+99", "0", Some("new"), 40))];

        let batch = select_new_detections(&feed, &ledger, now());
        assert_eq!(batch.len(), ANNOUNCE_BATCH_LIMIT);
        let ids: Vec<String> = batch.iter().map(DetectionRecord::transient_id).collect();
        assert_eq!(
            ids,
            ["J0102-21_0", "J0102-21_1", "J0102-21_2", "J0102-21_3", "J0102-21_4"]
        );
    }

    #[test]
    fn other_statuses_are_never_announced() {
        let feed = vec![
            detection("J0102-21", "1", Some("processed"), 2),
            detection("J0304+05", "2", Some("rejected"), 2),
            detection("J0506-11", "3", None, 2),
        ];
        let ledger = vec![processed(&detection("J9999+99", "0", Some("new"), 40))];

        let batch = select_new_detections(&feed, &ledger, now());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].transient_id(), "J0506-11_3");
    }

    #[test]
    fn bootstrap_announces_recent_unstatused_and_backfills_historical() {
        let mut feed = Vec::new();
        // N = 7 historical rows already marked "new", older than the window.
        for i in 0..7 {
            feed.push(detection("HIST", &i.to_string(), Some("new"), 60));
        }
        // M = 3 unstatused rows inside the window.
        for i in 0..3 {
            feed.push(detection("FRESH", &i.to_string(), None, 3));
        }
        // Unstatused but stale: outside the window, not announced.
        feed.push(detection("STALE", "0", None, 45));

        let plan = plan_check(&feed, &[], now());
        assert_eq!(plan.announce.len(), 3);
        assert!(plan
            .announce
            .iter()
            .all(|r| r.source == "FRESH"));
        assert_eq!(plan.backfill.len(), 7);
        assert!(plan.backfill.iter().all(|r| r.source == "HIST"));
    }

    #[test]
    fn bootstrap_batch_is_still_capped() {
        let feed: Vec<DetectionRecord> = (0..8)
            .map(|i| detection("FRESH", &i.to_string(), None, 3))
            .collect();
        let plan = plan_check(&feed, &[], now());
        assert_eq!(plan.announce.len(), ANNOUNCE_BATCH_LIMIT);
    }

    #[test]
    fn run_check_records_announced_and_backfilled_rows() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("transients.txt");
        let dedup = Deduplicator::new(
            &feed_path,
            dir.path().join("new_transients.csv"),
            dir.path().join("last_check.txt"),
        );

        let mut contents = String::from(
            "source\tobservation\tra[deg]\tdec[deg]\tfield\ttime\ttest_statistic\tpeak_flux[mJy]\tstatus\tmodified\n",
        );
        // Two historical "new" rows plus one recent unstatused row.
        contents.push_str("HIST\t1\t10.0\t-5.0\tfield_a\t2025-11-01 00:00:00\t30.0\t2.0\tnew\t2025-11-01 00:00:00\n");
        contents.push_str("HIST\t2\t11.0\t-5.0\tfield_a\t2025-11-02 00:00:00\t31.0\t2.0\tnew\t2025-11-02 00:00:00\n");
        contents.push_str("FRESH\t3\t12.0\t-5.0\tfield_a\t2026-02-27 00:00:00\t32.0\t2.0\t\t2026-02-27 00:00:00\n");
        std::fs::write(&feed_path, &contents).unwrap();

        let outcome = dedup.run_check(now()).unwrap();
        assert_eq!(outcome.announcements.len(), 1);
        assert_eq!(outcome.announcements[0].transient_id, "FRESH_3");
        assert_eq!(outcome.backfilled, 2);

        // Everything selected or backfilled is in the ledger.
        let ids = dedup.ledger().known_ids().unwrap();
        assert_eq!(ids.len(), 3);

        // Second run with the same feed announces nothing new.
        let outcome = dedup.run_check(now()).unwrap();
        assert!(outcome.announcements.is_empty());
        assert_eq!(outcome.backfilled, 0);

        // The watermark advanced to the run time.
        assert_eq!(dedup.load_last_check(now()), now());
    }

    #[test]
    fn failed_feed_read_leaves_ledger_and_watermark_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dedup = Deduplicator::new(
            dir.path().join("absent.txt"),
            dir.path().join("new_transients.csv"),
            dir.path().join("last_check.txt"),
        );

        assert!(matches!(
            dedup.run_check(now()),
            Err(Error::FeedUnreadable { .. })
        ));
        assert!(!dir.path().join("new_transients.csv").exists());
        assert!(!dir.path().join("last_check.txt").exists());
        // Missing watermark falls back to 24 hours before now.
        assert_eq!(dedup.load_last_check(now()), now() - Duration::hours(24));
    }

    #[test]
    fn process_all_marks_everything_without_status_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("transients.txt");
        let dedup = Deduplicator::new(
            &feed_path,
            dir.path().join("new_transients.csv"),
            dir.path().join("last_check.txt"),
        );

        let contents = "\
source\tobservation\tra[deg]\tdec[deg]\tfield\ttime\ttest_statistic\tpeak_flux[mJy]\tstatus\tmodified
A\t1\t10.0\t-5.0\tf\t2025-01-01 00:00:00\t30.0\t2.0\trejected\t2025-01-01 00:00:00
B\t2\t11.0\t-5.0\tf\t2025-01-02 00:00:00\t31.0\t2.0\tnew\t2025-01-02 00:00:00
";
        std::fs::write(&feed_path, contents).unwrap();

        assert_eq!(dedup.process_all(now()).unwrap(), 2);
        assert_eq!(dedup.process_all(now()).unwrap(), 0);
    }
}
