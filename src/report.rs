use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::models::{Category, Classification, ClassificationRecord, VoteRecord};
use crate::votes;

/// A transient counts as having consensus when it drew at least this many
/// votes overall and one category holds an outright majority.
const CONSENSUS_MIN_VOTES: u32 = 3;

pub fn build_voting_report(
    vote_records: &[VoteRecord],
    classifications: &[ClassificationRecord],
) -> String {
    let mut output = String::new();
    let total_votes: u32 = vote_records.iter().map(VoteRecord::total).sum();

    let _ = writeln!(output, "# Transient Voting Report");
    let _ = writeln!(
        output,
        "{} transients, {} votes recorded",
        vote_records.len(),
        total_votes
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Vote Distribution");
    if total_votes == 0 {
        let _ = writeln!(output, "No votes recorded yet.");
    } else {
        for category in Category::ALL {
            let count: u32 = vote_records.iter().map(|v| v.count(category)).sum();
            let share = f64::from(count) / f64::from(total_votes) * 100.0;
            let _ = writeln!(output, "- {category}: {count} votes ({share:.1}%)");
        }
    }

    let mut by_total: Vec<&VoteRecord> = vote_records.iter().collect();
    by_total.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| a.transient_id.cmp(&b.transient_id))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Voted");
    if by_total.is_empty() {
        let _ = writeln!(output, "No transients voted on yet.");
    } else {
        for record in by_total.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {} votes (AGN {}, Interesting {}, Star {}, Junk {})",
                short_id(&record.transient_id),
                record.total(),
                record.agn_votes,
                record.interesting_votes,
                record.star_votes,
                record.junk_votes
            );
        }
    }

    let consensus: Vec<(&VoteRecord, Category, f64)> = by_total
        .iter()
        .filter(|v| v.total() >= CONSENSUS_MIN_VOTES)
        .filter_map(|v| {
            majority_category(v).map(|(category, share)| (*v, category, share))
        })
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Consensus");
    if consensus.is_empty() {
        let _ = writeln!(output, "No transients with a clear majority yet.");
    } else {
        for (record, category, share) in &consensus {
            let _ = writeln!(
                output,
                "- {}: {} ({:.0}%)",
                short_id(&record.transient_id),
                category,
                share * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classification Results");
    if classifications.is_empty() {
        let _ = writeln!(output, "Nothing classified yet.");
    } else {
        let mut by_label: HashMap<Classification, (usize, f64)> = HashMap::new();
        for record in classifications {
            let entry = by_label.entry(record.classification).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.confidence;
        }
        let mut labels: Vec<(Classification, (usize, f64))> = by_label.into_iter().collect();
        labels.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.label().cmp(b.0.label())));
        for (label, (count, confidence_sum)) in labels {
            let _ = writeln!(
                output,
                "- {}: {} (avg confidence {:.2})",
                label,
                count,
                confidence_sum / count as f64
            );
        }
    }

    let queue = votes::priority_order(vote_records);
    let scores: HashMap<&str, u32> = vote_records
        .iter()
        .map(|v| (v.transient_id.as_str(), v.priority_score()))
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Follow-up Priority");
    if queue.is_empty() {
        let _ = writeln!(output, "Queue is empty.");
    } else {
        for (rank, transient_id) in queue.iter().take(10).enumerate() {
            let score = scores.get(transient_id.as_str()).copied().unwrap_or(0);
            let _ = writeln!(
                output,
                "{}. {} (score {})",
                rank + 1,
                short_id(transient_id),
                score
            );
        }
    }

    output
}

// Majority winner among the categories, when one holds more than half the
// votes. Returns the winner and its share.
fn majority_category(votes: &VoteRecord) -> Option<(Category, f64)> {
    let total = votes.total();
    let mut winner = Category::Agn;
    for category in Category::ALL {
        if votes.count(category) > votes.count(winner) {
            winner = category;
        }
    }
    let top = votes.count(winner);
    if f64::from(top) > f64::from(total) / 2.0 {
        Some((winner, f64::from(top) / f64::from(total)))
    } else {
        None
    }
}

// Long coordinate-style identifiers get their observation part shortened for
// display, e.g. "2227-55_134258682" -> "2227-55_134258...".
fn short_id(transient_id: &str) -> String {
    if transient_id.len() > 15 {
        if let Some((coordinate, observation)) = transient_id.split_once('_') {
            if observation.len() > 6 {
                let head: String = observation.chars().take(6).collect();
                return format!("{coordinate}_{head}...");
            }
        }
    }
    transient_id.to_string()
}

/// One row of the detailed export: votes joined with the derived
/// classification, ranked by priority score.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedVoteRow {
    pub transient_id: String,
    pub agn_votes: u32,
    pub interesting_votes: u32,
    pub star_votes: u32,
    pub junk_votes: u32,
    pub total_votes: u32,
    pub priority_score: u32,
    pub classification: Option<Classification>,
    pub confidence: Option<f64>,
}

pub fn detailed_rows(
    vote_records: &[VoteRecord],
    classifications: &[ClassificationRecord],
) -> Vec<DetailedVoteRow> {
    let by_id: HashMap<&str, &ClassificationRecord> = classifications
        .iter()
        .map(|c| (c.transient_id.as_str(), c))
        .collect();

    let mut rows: Vec<DetailedVoteRow> = vote_records
        .iter()
        .map(|record| {
            let class = by_id.get(record.transient_id.as_str());
            DetailedVoteRow {
                transient_id: record.transient_id.clone(),
                agn_votes: record.agn_votes,
                interesting_votes: record.interesting_votes,
                star_votes: record.star_votes,
                junk_votes: record.junk_votes,
                total_votes: record.total(),
                priority_score: record.priority_score(),
                classification: class.map(|c| c.classification),
                confidence: class.map(|c| c.confidence),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.priority_score
            .cmp(&a.priority_score)
            .then_with(|| a.transient_id.cmp(&b.transient_id))
    });
    rows
}
