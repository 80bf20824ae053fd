use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::Result;
use crate::models::{Category, Classification, ClassificationRecord, VoteRecord};
use crate::store;

/// Classify one vote record. The winner is the highest-count category, ties
/// broken by the order of `Category::ALL`; it only becomes the label when it
/// meets its own threshold. Confidence is winner share of all votes and is
/// reported even for unclassified records.
pub fn classify(votes: &VoteRecord) -> (Classification, f64) {
    let mut winner = Category::Agn;
    for category in Category::ALL {
        if votes.count(category) > votes.count(winner) {
            winner = category;
        }
    }

    let top = votes.count(winner);
    let total = votes.total();
    let confidence = if total > 0 {
        f64::from(top) / f64::from(total)
    } else {
        0.0
    };
    let classification = if top >= winner.threshold() {
        winner.into()
    } else {
        Classification::Unclassified
    };
    (classification, confidence)
}

/// All known transients ranked by priority score, descending; equal scores
/// order ascending by identifier so repeated calls agree.
pub fn priority_order(votes: &[VoteRecord]) -> Vec<String> {
    let mut ranked: Vec<&VoteRecord> = votes.iter().collect();
    ranked.sort_by(|a, b| {
        b.priority_score()
            .cmp(&a.priority_score())
            .then_with(|| a.transient_id.cmp(&b.transient_id))
    });
    ranked.into_iter().map(|v| v.transient_id.clone()).collect()
}

/// Vote tally engine. Owns the vote-count and classification stores; a
/// single lock serializes every access so the classification table is always
/// consistent with the vote table when a call returns.
pub struct VoteTracker {
    votes_path: PathBuf,
    classifications_path: PathBuf,
    lock: Mutex<()>,
}

impl VoteTracker {
    pub fn new(votes_path: impl Into<PathBuf>, classifications_path: impl Into<PathBuf>) -> Self {
        VoteTracker {
            votes_path: votes_path.into(),
            classifications_path: classifications_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Apply a reaction-count snapshot for one transient. Counters are
    /// overwritten with the observed absolute counts (missing symbol means
    /// zero), then the whole classification table is recomputed. Idempotent.
    pub fn update_vote_counts(
        &self,
        transient_id: &str,
        reaction_counts: &HashMap<String, u32>,
    ) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut votes: Vec<VoteRecord> = store::read_rows_or_empty(&self.votes_path)?;
        let count_for = |category: Category| {
            reaction_counts
                .get(category.reaction_symbol())
                .copied()
                .unwrap_or(0)
        };

        match votes.iter_mut().find(|v| v.transient_id == transient_id) {
            Some(record) => {
                for category in Category::ALL {
                    record.set_count(category, count_for(category));
                }
            }
            None => votes.push(VoteRecord {
                transient_id: transient_id.to_string(),
                agn_votes: count_for(Category::Agn),
                interesting_votes: count_for(Category::Interesting),
                star_votes: count_for(Category::Star),
                junk_votes: count_for(Category::Junk),
            }),
        }

        // Vote table first; the classification rewrite only runs once the
        // votes are durable, so a failure can never leave labels ahead of
        // the counts they derive from.
        store::write_rows_atomic(&self.votes_path, &votes)?;

        let classifications: Vec<ClassificationRecord> = votes
            .iter()
            .map(|record| {
                let (classification, confidence) = classify(record);
                ClassificationRecord {
                    transient_id: record.transient_id.clone(),
                    classification,
                    confidence,
                }
            })
            .collect();
        store::write_rows_atomic(&self.classifications_path, &classifications)?;

        debug!(transient_id, "updated vote counts");
        Ok(())
    }

    pub fn get_priority_queue(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let votes: Vec<VoteRecord> = store::read_rows_or_empty(&self.votes_path)?;
        Ok(priority_order(&votes))
    }

    pub fn get_top_transients(&self, n: usize) -> Result<Vec<String>> {
        let mut queue = self.get_priority_queue()?;
        queue.truncate(n);
        Ok(queue)
    }

    /// Counts for one transient, or None when it was never voted on.
    pub fn get_transient_votes(&self, transient_id: &str) -> Result<Option<VoteRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let votes: Vec<VoteRecord> = store::read_rows_or_empty(&self.votes_path)?;
        Ok(votes.into_iter().find(|v| v.transient_id == transient_id))
    }

    pub fn get_classification(
        &self,
        transient_id: &str,
    ) -> Result<Option<ClassificationRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let classifications: Vec<ClassificationRecord> =
            store::read_rows_or_empty(&self.classifications_path)?;
        Ok(classifications
            .into_iter()
            .find(|c| c.transient_id == transient_id))
    }

    /// Both tables in one consistent snapshot, for reporting.
    pub fn snapshot(&self) -> Result<(Vec<VoteRecord>, Vec<ClassificationRecord>)> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let votes = store::read_rows_or_empty(&self.votes_path)?;
        let classifications = store::read_rows_or_empty(&self.classifications_path)?;
        Ok((votes, classifications))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &tempfile::TempDir) -> VoteTracker {
        let voting_dir = dir.path().join("voting_data");
        VoteTracker::new(
            voting_dir.join("vote_counts.csv"),
            voting_dir.join("classifications.csv"),
        )
    }

    fn reactions(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs
            .iter()
            .map(|(symbol, count)| (symbol.to_string(), *count))
            .collect()
    }

    fn votes(agn: u32, interesting: u32, star: u32, junk: u32) -> VoteRecord {
        VoteRecord {
            transient_id: "X_1".to_string(),
            agn_votes: agn,
            interesting_votes: interesting,
            star_votes: star,
            junk_votes: junk,
        }
    }

    #[test]
    fn counts_overwrite_rather_than_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        tracker
            .update_vote_counts("X_1", &reactions(&[("fire", 3)]))
            .unwrap();
        tracker
            .update_vote_counts("X_1", &reactions(&[("fire", 1), ("milky_way", 2)]))
            .unwrap();

        let record = tracker.get_transient_votes("X_1").unwrap().unwrap();
        assert_eq!(record.interesting_votes, 1);
        assert_eq!(record.agn_votes, 2);
        assert_eq!(record.star_votes, 0);
        assert_eq!(record.junk_votes, 0);
    }

    #[test]
    fn updates_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);
        let counts = reactions(&[("fire", 2), ("star", 1)]);

        tracker.update_vote_counts("X_1", &counts).unwrap();
        let first = tracker.snapshot().unwrap();
        tracker.update_vote_counts("X_1", &counts).unwrap();
        let second = tracker.snapshot().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn classification_table_tracks_every_vote_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        tracker
            .update_vote_counts("A_1", &reactions(&[("milky_way", 3)]))
            .unwrap();
        tracker
            .update_vote_counts("B_2", &reactions(&[("wastebasket", 1)]))
            .unwrap();

        let (votes, classifications) = tracker.snapshot().unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(classifications.len(), 2);

        let a = tracker.get_classification("A_1").unwrap().unwrap();
        assert_eq!(a.classification, Classification::Agn);
        assert!((a.confidence - 1.0).abs() < f64::EPSILON);

        let b = tracker.get_classification("B_2").unwrap().unwrap();
        assert_eq!(b.classification, Classification::Unclassified);
    }

    #[test]
    fn classify_applies_per_category_thresholds() {
        let (label, confidence) = classify(&votes(3, 0, 0, 0));
        assert_eq!(label, Classification::Agn);
        assert!((confidence - 1.0).abs() < f64::EPSILON);

        // Below the AGN threshold of 3: unclassified, confidence unchanged.
        let (label, confidence) = classify(&votes(2, 0, 0, 0));
        assert_eq!(label, Classification::Unclassified);
        assert!((confidence - 1.0).abs() < f64::EPSILON);

        let (label, _) = classify(&votes(0, 2, 0, 0));
        assert_eq!(label, Classification::Interesting);

        let (label, confidence) = classify(&votes(0, 0, 0, 0));
        assert_eq!(label, Classification::Unclassified);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn classify_breaks_ties_by_category_order() {
        // Interesting and Star tied at 2: Interesting enumerates first.
        let (label, confidence) = classify(&votes(0, 2, 2, 0));
        assert_eq!(label, Classification::Interesting);
        assert!((confidence - 0.5).abs() < f64::EPSILON);

        // AGN ties Junk at 3: AGN enumerates first.
        let (label, _) = classify(&votes(3, 0, 0, 3));
        assert_eq!(label, Classification::Agn);
    }

    #[test]
    fn priority_queue_orders_by_weighted_score() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        // A: Interesting 1 -> score 5. B: AGN 2 -> score 8.
        tracker
            .update_vote_counts("A", &reactions(&[("fire", 1)]))
            .unwrap();
        tracker
            .update_vote_counts("B", &reactions(&[("milky_way", 2)]))
            .unwrap();

        assert_eq!(tracker.get_priority_queue().unwrap(), ["B", "A"]);
        assert_eq!(tracker.get_top_transients(1).unwrap(), ["B"]);
    }

    #[test]
    fn equal_scores_tie_break_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        tracker
            .update_vote_counts("zeta", &reactions(&[("star", 1)]))
            .unwrap();
        tracker
            .update_vote_counts("alpha", &reactions(&[("star", 1)]))
            .unwrap();

        let queue = tracker.get_priority_queue().unwrap();
        assert_eq!(queue, ["alpha", "zeta"]);
        assert_eq!(tracker.get_priority_queue().unwrap(), queue);
    }

    #[test]
    fn absent_stores_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        assert!(tracker.get_priority_queue().unwrap().is_empty());
        assert!(tracker.get_transient_votes("unknown").unwrap().is_none());
        assert!(tracker.get_classification("unknown").unwrap().is_none());
    }
}
