use regex_lite::Regex;

use crate::models::{Category, VoteRecord};

/// Reaction symbols seeded on every alert, in vote-category order.
pub fn seed_reactions() -> [&'static str; 4] {
    [
        Category::Agn.reaction_symbol(),
        Category::Interesting.reaction_symbol(),
        Category::Star.reaction_symbol(),
        Category::Junk.reaction_symbol(),
    ]
}

/// Recover a transient identifier from posted alert text. Understands the
/// "New Transient: <id>" and "ID: <id>" forms plus bare AT/SN designators.
pub fn extract_transient_id(text: &str) -> Option<String> {
    for pattern in [r"Transient:\s*([\w-]+)", r"ID:\s*([\w-]+)"] {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(text) {
                return Some(caps[1].to_string());
            }
        }
    }
    for pattern in [r"\bAT\d{4}\w+", r"\bSN\d{4}\w+"] {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(found) = re.find(text) {
                return Some(found.as_str().to_string());
            }
        }
    }
    None
}

/// One-line vote summary for the messaging layer.
pub fn voting_summary(votes: &VoteRecord) -> String {
    if votes.total() == 0 {
        return "No votes recorded".to_string();
    }
    format!(
        "Votes ({} total): AGN {}, Interesting {}, Star {}, Junk {}",
        votes.total(),
        votes.agn_votes,
        votes.interesting_votes,
        votes.star_votes,
        votes.junk_votes
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_one_reaction_per_category() {
        assert_eq!(
            seed_reactions(),
            ["milky_way", "fire", "star", "wastebasket"]
        );
    }

    #[test]
    fn extracts_id_from_alert_header() {
        assert_eq!(
            extract_transient_id("New Transient: J0102-21_1342586").as_deref(),
            Some("J0102-21_1342586")
        );
        assert_eq!(
            extract_transient_id("ID: 2227-55_134258682").as_deref(),
            Some("2227-55_134258682")
        );
    }

    #[test]
    fn extracts_bare_designators() {
        assert_eq!(
            extract_transient_id("follow-up for AT2024abc tonight").as_deref(),
            Some("AT2024abc")
        );
        assert_eq!(
            extract_transient_id("SN2026xy looks real").as_deref(),
            Some("SN2026xy")
        );
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert_eq!(extract_transient_id("weather update: clear skies"), None);
    }

    #[test]
    fn summary_reports_counts_or_absence() {
        let mut votes = VoteRecord {
            transient_id: "X_1".to_string(),
            agn_votes: 0,
            interesting_votes: 0,
            star_votes: 0,
            junk_votes: 0,
        };
        assert_eq!(voting_summary(&votes), "No votes recorded");

        votes.agn_votes = 2;
        votes.junk_votes = 1;
        assert_eq!(
            voting_summary(&votes),
            "Votes (3 total): AGN 2, Interesting 0, Star 0, Junk 1"
        );
    }
}
