use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the detection feed, with the optional-column variants
/// (centroid, flux layout) resolved at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub source: String,
    pub observation: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub centroid: Option<Centroid>,
    pub field: String,
    pub time: DateTime<Utc>,
    pub test_statistic: f64,
    pub flux: Flux,
    pub fwhm_days: Option<f64>,
    pub status: Option<String>,
    pub modified: DateTime<Utc>,
}

impl DetectionRecord {
    pub fn transient_id(&self) -> String {
        format!("{}_{}", self.source, self.observation)
    }
}

/// Refined centroid position. Only present when both values were finite in
/// the feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// Peak flux layout of the feed: one broadband column, or one column per
/// observing frequency. Either value may still be missing for a given row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flux {
    Single {
        peak_mjy: Option<f64>,
    },
    Dual {
        peak_90_mjy: Option<f64>,
        peak_150_mjy: Option<f64>,
    },
}

impl Flux {
    pub fn describe(&self) -> Option<String> {
        match self {
            Flux::Single { peak_mjy } => peak_mjy.map(|v| format!("{v:.2} mJy")),
            Flux::Dual {
                peak_90_mjy,
                peak_150_mjy,
            } => {
                let mut parts = Vec::new();
                if let Some(v) = peak_90_mjy {
                    parts.push(format!("90 GHz {v:.2} mJy"));
                }
                if let Some(v) = peak_150_mjy {
                    parts.push(format!("150 GHz {v:.2} mJy"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
        }
    }
}

/// One row of the processed ledger: the announced subset of a detection plus
/// the time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub source: String,
    pub observation: String,
    #[serde(rename = "ra[deg]")]
    pub ra_deg: f64,
    #[serde(rename = "dec[deg]")]
    pub dec_deg: f64,
    pub field: String,
    pub time: DateTime<Utc>,
    pub test_statistic: f64,
    pub status: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedRecord {
    pub const HEADERS: [&'static str; 9] = [
        "source",
        "observation",
        "ra[deg]",
        "dec[deg]",
        "field",
        "time",
        "test_statistic",
        "status",
        "processed_at",
    ];

    pub fn from_detection(record: &DetectionRecord, processed_at: DateTime<Utc>) -> Self {
        ProcessedRecord {
            source: record.source.clone(),
            observation: record.observation.clone(),
            ra_deg: record.ra_deg,
            dec_deg: record.dec_deg,
            field: record.field.clone(),
            time: record.time,
            test_statistic: record.test_statistic,
            status: record.status.clone(),
            processed_at,
        }
    }

    pub fn transient_id(&self) -> String {
        format!("{}_{}", self.source, self.observation)
    }
}

/// Vote categories, in tie-break order: when two categories hold the same
/// count, the earlier one here wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Agn,
    Interesting,
    Star,
    Junk,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Agn,
        Category::Interesting,
        Category::Star,
        Category::Junk,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Agn => "AGN",
            Category::Interesting => "Interesting",
            Category::Star => "Star",
            Category::Junk => "Junk",
        }
    }

    /// Emoji name that carries this vote on the posted alert.
    pub fn reaction_symbol(self) -> &'static str {
        match self {
            Category::Agn => "milky_way",
            Category::Interesting => "fire",
            Category::Star => "star",
            Category::Junk => "wastebasket",
        }
    }

    /// Minimum winning count before a transient is labelled with this
    /// category.
    pub fn threshold(self) -> u32 {
        match self {
            Category::Agn => 3,
            Category::Interesting => 2,
            Category::Star => 2,
            Category::Junk => 3,
        }
    }

    /// Weight in the follow-up priority score. Intentionally ordered
    /// differently from the classification thresholds: this ranks scientific
    /// interest, not classification confidence.
    pub fn priority_weight(self) -> u32 {
        match self {
            Category::Interesting => 5,
            Category::Agn => 4,
            Category::Star => 3,
            Category::Junk => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-transient vote counters. Counters hold the latest observed absolute
/// reaction counts, not accumulated deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub transient_id: String,
    pub agn_votes: u32,
    pub interesting_votes: u32,
    pub star_votes: u32,
    pub junk_votes: u32,
}

impl VoteRecord {
    pub fn count(&self, category: Category) -> u32 {
        match category {
            Category::Agn => self.agn_votes,
            Category::Interesting => self.interesting_votes,
            Category::Star => self.star_votes,
            Category::Junk => self.junk_votes,
        }
    }

    pub fn set_count(&mut self, category: Category, count: u32) {
        match category {
            Category::Agn => self.agn_votes = count,
            Category::Interesting => self.interesting_votes = count,
            Category::Star => self.star_votes = count,
            Category::Junk => self.junk_votes = count,
        }
    }

    pub fn total(&self) -> u32 {
        Category::ALL.iter().map(|c| self.count(*c)).sum()
    }

    pub fn priority_score(&self) -> u32 {
        Category::ALL
            .iter()
            .map(|c| self.count(*c) * c.priority_weight())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "AGN")]
    Agn,
    Interesting,
    Star,
    Junk,
    Unclassified,
}

impl From<Category> for Classification {
    fn from(category: Category) -> Self {
        match category {
            Category::Agn => Classification::Agn,
            Category::Interesting => Classification::Interesting,
            Category::Star => Classification::Star,
            Category::Junk => Classification::Junk,
        }
    }
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Classification::Agn => "AGN",
            Classification::Interesting => "Interesting",
            Classification::Star => "Star",
            Classification::Junk => "Junk",
            Classification::Unclassified => "Unclassified",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived label for one transient, recomputed wholesale from the vote table
/// on every vote update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub transient_id: String,
    pub classification: Classification,
    pub confidence: f64,
}
