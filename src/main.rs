use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod coords;
mod error;
mod feed;
mod ingest;
mod ledger;
mod models;
mod reactions;
mod report;
mod store;
mod votes;

use ingest::{Announcement, Deduplicator};
use votes::VoteTracker;

#[derive(Parser)]
#[command(name = "transient-monitor")]
#[command(about = "Transient detection monitor with reaction-vote tracking", long_about = None)]
struct Cli {
    /// Detection feed (tab-separated)
    #[arg(long, default_value = "transients.txt")]
    feed: PathBuf,
    /// Directory holding the processed ledger, watermark, and voting data
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one check of the detection feed and announce new transients
    Check {
        /// Emit the announced batch as JSON for the messaging layer
        #[arg(long)]
        json: bool,
        /// Select the batch without recording it in the ledger
        #[arg(long)]
        dry_run: bool,
    },
    /// Check the feed on a fixed interval
    Watch {
        #[arg(long, default_value_t = 24)]
        interval_hours: u64,
    },
    /// Mark every unprocessed feed row as processed without announcing
    ProcessAll,
    /// Show the most recent feed rows
    Tail {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Record a reaction-count snapshot for a transient
    RecordVotes {
        /// Transient identifier
        #[arg(long, conflicts_with = "message")]
        transient_id: Option<String>,
        /// Alert message text to recover the identifier from instead
        #[arg(long)]
        message: Option<String>,
        /// Reaction counts as symbol=count, e.g. --reaction fire=3
        #[arg(long = "reaction", value_parser = parse_reaction)]
        reactions: Vec<(String, u32)>,
    },
    /// Show the follow-up priority queue
    Queue {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show vote counts and classification for one transient
    Votes { transient_id: String },
    /// Write a markdown voting report
    Report {
        #[arg(long, default_value = "voting_report.md")]
        out: PathBuf,
    },
    /// Export votes joined with classifications as CSV
    Export {
        #[arg(long, default_value = "detailed_voting_results.csv")]
        out: PathBuf,
    },
}

fn parse_reaction(raw: &str) -> Result<(String, u32), String> {
    let (symbol, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected symbol=count, got {raw:?}"))?;
    let count = count
        .parse::<u32>()
        .map_err(|err| format!("invalid count in {raw:?}: {err}"))?;
    Ok((symbol.to_string(), count))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let deduplicator = Deduplicator::new(
        &cli.feed,
        cli.data_dir.join("new_transients.csv"),
        cli.data_dir.join("last_check.txt"),
    );
    let voting_dir = cli.data_dir.join("voting_data");
    let tracker = VoteTracker::new(
        voting_dir.join("vote_counts.csv"),
        voting_dir.join("classifications.csv"),
    );

    match cli.command {
        Commands::Check { json, dry_run } => {
            let announcements = if dry_run {
                deduplicator.preview(Utc::now()).context("feed check failed")?
            } else {
                let outcome = deduplicator
                    .run_check(Utc::now())
                    .context("feed check failed")?;
                if outcome.backfilled > 0 {
                    println!(
                        "Recorded {} historical transients without announcing.",
                        outcome.backfilled
                    );
                }
                outcome.announcements
            };
            print_announcements(&announcements);
            if json {
                let payload = serde_json::json!({
                    "announcements": announcements,
                    "seed_reactions": reactions::seed_reactions(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
        }
        Commands::Watch { interval_hours } => {
            println!("Watching feed every {interval_hours}h. Ctrl-C to stop.");
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
                interval_hours.max(1) * 3600,
            ));
            loop {
                ticker.tick().await;
                match deduplicator.run_check(Utc::now()) {
                    Ok(outcome) => print_announcements(&outcome.announcements),
                    // One diagnostic per failed run; the watch itself keeps going.
                    Err(err) => tracing::error!(error = %err, "scheduled check failed"),
                }
            }
        }
        Commands::ProcessAll => {
            let marked = deduplicator.process_all(Utc::now())?;
            println!("Marked {marked} transients as processed.");
        }
        Commands::Tail { count } => {
            let feed_rows = deduplicator.read_feed()?;
            let skip = feed_rows.len().saturating_sub(count);
            for record in &feed_rows[skip..] {
                let (ra, dec) = coords::resolve_coordinates(record);
                println!("{}", record.transient_id());
                println!(
                    "  RA {}  Dec {}",
                    coords::format_ra_hms(ra),
                    coords::format_dec_dms(dec)
                );
                println!(
                    "  Detected {} (field {}, test statistic {:.1})",
                    record.time.format("%Y-%m-%d %H:%M:%S UTC"),
                    record.field,
                    record.test_statistic
                );
                if let Some(flux) = record.flux.describe() {
                    println!("  Peak flux: {flux}");
                }
                if let Some(fwhm) = record.fwhm_days {
                    println!("  Duration (FWHM): {fwhm:.2} days");
                }
                println!(
                    "  Status: {}",
                    record.status.as_deref().unwrap_or("(none)")
                );
            }
            println!("Total transients in feed: {}", feed_rows.len());
        }
        Commands::RecordVotes {
            transient_id,
            message,
            reactions,
        } => {
            let transient_id = match (transient_id, message) {
                (Some(id), _) => id,
                (None, Some(text)) => reactions::extract_transient_id(&text)
                    .with_context(|| format!("no transient identifier in {text:?}"))?,
                (None, None) => anyhow::bail!("provide --transient-id or --message"),
            };
            let counts: HashMap<String, u32> = reactions.into_iter().collect();
            tracker.update_vote_counts(&transient_id, &counts)?;
            if let Some(record) = tracker.get_classification(&transient_id)? {
                println!(
                    "{transient_id}: {} (confidence {:.2})",
                    record.classification, record.confidence
                );
            }
        }
        Commands::Queue { limit } => {
            let queue = tracker.get_top_transients(limit)?;
            if queue.is_empty() {
                println!("No votes recorded yet.");
            }
            for (rank, transient_id) in queue.iter().enumerate() {
                let score = tracker
                    .get_transient_votes(transient_id)?
                    .map(|v| v.priority_score())
                    .unwrap_or(0);
                println!("{}. {transient_id} (score {score})", rank + 1);
            }
        }
        Commands::Votes { transient_id } => match tracker.get_transient_votes(&transient_id)? {
            Some(record) => {
                println!("{}", reactions::voting_summary(&record));
                if let Some(class) = tracker.get_classification(&transient_id)? {
                    println!(
                        "Classification: {} (confidence {:.2})",
                        class.classification, class.confidence
                    );
                }
            }
            None => println!("No votes recorded for {transient_id}."),
        },
        Commands::Report { out } => {
            let (vote_records, classifications) = tracker.snapshot()?;
            let report = report::build_voting_report(&vote_records, &classifications);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let (vote_records, classifications) = tracker.snapshot()?;
            let rows = report::detailed_rows(&vote_records, &classifications);
            store::write_rows_atomic(&out, &rows)?;
            println!("Exported {} transients to {}.", rows.len(), out.display());
        }
    }

    Ok(())
}

fn print_announcements(announcements: &[Announcement]) {
    if announcements.is_empty() {
        println!("No new transients found.");
        return;
    }
    for announcement in announcements {
        println!("New transient: {}", announcement.transient_id);
        println!(
            "  RA {}  Dec {}",
            coords::format_ra_hms(announcement.ra_deg),
            coords::format_dec_dms(announcement.dec_deg)
        );
        println!(
            "  Detected {} (field {}, test statistic {:.1})",
            announcement.time.format("%Y-%m-%d %H:%M:%S UTC"),
            announcement.field,
            announcement.test_statistic
        );
        if let Some(flux) = announcement.flux.describe() {
            println!("  Peak flux: {flux}");
        }
        if let Some(fwhm) = announcement.fwhm_days {
            println!("  Duration (FWHM): {fwhm:.2} days");
        }
    }
}
