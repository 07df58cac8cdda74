mod ai;
mod classify;
mod db;
mod digest;
mod eligibility;
mod matcher;
mod models;
mod normalize;
mod occupation;
mod pipeline;
mod registry;
mod rules;
mod salary;
mod score;
mod sources;
mod tui;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use db::Database;
use models::{JobStatus, StoredPosting, VisaConfidence};
use normalize::normalize_company;
use pipeline::PassLock;
use registry::RegistryStore;

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(about = "Sponsor-aware job board: ingest, score, and track UK sustainability roles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run one ingestion pass over all configured sources
    Ingest {
        /// Only poll this source (adzuna, reed, jooble, remotive)
        #[arg(short, long)]
        source: Option<String>,

        /// Skip the AI scorer even if an API key is configured
        #[arg(long)]
        no_ai: bool,

        /// Score everything but write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored postings
    List {
        /// Filter by status (new, to_apply, applied, interviewing, offer, rejected, archived)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by visa confidence (green, yellow, red, unknown)
        #[arg(short, long)]
        visa: Option<String>,

        /// Only saved postings
        #[arg(long)]
        saved: bool,

        #[arg(short, long, default_value = "25")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Show one posting in full
    Show {
        /// Posting id, e.g. adzuna:4872213367
        id: String,
    },

    /// Show the top postings by success probability
    Rank {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Toggle the saved flag on a posting
    Save {
        id: String,
    },

    /// Set the tracking status of a posting
    Status {
        id: String,
        /// One of: new, to_apply, applied, interviewing, offer, rejected, archived
        status: String,
    },

    /// Attach a note to a posting
    Note {
        id: String,
        note: String,
    },

    /// Interactive review board
    Browse {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Render the plain-text digest of the top postings
    Digest {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage registry snapshots
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// Remove near-duplicate postings that arrived via multiple sources
    Cleanup {
        /// Show what would be removed without removing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Download fresh snapshots now, ignoring cache freshness
    Refresh,
    /// Show cached snapshot ages
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let db = Database::open()?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Ingest {
            source,
            no_ai,
            dry_run,
        } => {
            db.ensure_initialized()?;

            let lock_dir = db
                .path()
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            let _lock = PassLock::acquire(&lock_dir)?;

            let store = RegistryStore::open()?;
            println!("Loading registry snapshots...");
            let sponsors = store.sponsor_register(false)?;
            let bcorps = store.bcorp_directory(false)?;
            println!(
                "  sponsor register: {} organisations, B-Corp directory: {}",
                sponsors.len(),
                bcorps.len()
            );

            let mut sources = sources::default_sources();
            if let Some(wanted) = &source {
                sources.retain(|s| s.id() == wanted);
                if sources.is_empty() {
                    return Err(anyhow!(
                        "No configured source named '{wanted}'. Check credentials and the name."
                    ));
                }
            }
            println!(
                "Polling {} source(s): {}",
                sources.len(),
                sources.iter().map(|s| s.id()).collect::<Vec<_>>().join(", ")
            );

            let mut ai = if no_ai { None } else { ai::AiScorer::from_env() };
            if !no_ai && ai.is_none() {
                println!("(ANTHROPIC_API_KEY not set; using heuristic scoring)");
            }

            let stats =
                pipeline::run_pass(&db, &sponsors, &bcorps, &sources, ai.as_mut(), dry_run)?;

            println!("\nPass complete:");
            println!("  sources ok/failed: {}/{}", stats.sources_ok, stats.sources_failed);
            println!("  fetched:           {}", stats.fetched);
            println!("  duplicates:        {}", stats.duplicates);
            println!("  not relevant:      {}", stats.irrelevant);
            println!("  below quality bar: {}", stats.below_quality);
            println!("  inserted/updated:  {}/{}", stats.inserted, stats.updated);
            if dry_run {
                println!("\n(Dry run, nothing was written)");
            }
        }

        Commands::List {
            status,
            visa,
            saved,
            limit,
            offset,
        } => {
            db.ensure_initialized()?;
            let status = match status.as_deref() {
                Some(s) => Some(JobStatus::parse(s).ok_or_else(|| {
                    anyhow!("Invalid status '{s}'. Allowed: {}", JobStatus::allowed_values())
                })?),
                None => None,
            };
            let visa = match visa.as_deref() {
                Some(v) => Some(VisaConfidence::parse(v).ok_or_else(|| {
                    anyhow!("Invalid visa confidence '{v}'. Allowed: green, yellow, red, unknown")
                })?),
                None => None,
            };
            let postings = db.list_postings(status, visa, saved, limit, offset)?;
            print_posting_table(&postings);
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_posting(&id)? {
                Some(posting) => print_posting_detail(&posting),
                None => println!("Posting '{id}' not found."),
            }
        }

        Commands::Rank { limit } => {
            db.ensure_initialized()?;
            let postings = db.top_postings(limit)?;
            if postings.is_empty() {
                println!("No postings to rank.");
            } else {
                println!(
                    "{:<5} {:<6} {:<8} {:<30} {:<22} {:>5}",
                    "RANK", "PROB", "VISA", "TITLE", "COMPANY", "SCORE"
                );
                println!("{}", "-".repeat(82));
                for (i, posting) in postings.iter().enumerate() {
                    println!(
                        "{:<5} {:>4}% {:<8} {:<30} {:<22} {:>5}",
                        i + 1,
                        posting.success_probability,
                        posting.visa_confidence.as_str(),
                        truncate(&posting.title, 28),
                        truncate(&posting.company, 20),
                        posting.match_score
                    );
                }
            }
        }

        Commands::Save { id } => {
            db.ensure_initialized()?;
            let saved = db.toggle_saved(&id)?;
            println!(
                "Posting '{id}' is now {}.",
                if saved { "saved" } else { "unsaved" }
            );
        }

        Commands::Status { id, status } => {
            db.ensure_initialized()?;
            let parsed = db.set_status(&id, &status)?;
            println!("Posting '{id}' moved to '{}'.", parsed.as_str());
        }

        Commands::Note { id, note } => {
            db.ensure_initialized()?;
            db.set_notes(&id, &note)?;
            println!("Note saved on '{id}'.");
        }

        Commands::Browse { limit } => {
            db.ensure_initialized()?;
            tui::run_board(&db, limit)?;
        }

        Commands::Digest { limit } => {
            db.ensure_initialized()?;
            let postings = db.top_postings(limit)?;
            print!("{}", digest::render_digest(&postings));
        }

        Commands::Registry { command } => match command {
            RegistryCommands::Refresh => {
                let store = RegistryStore::open()?;
                let sponsors = store.sponsor_register(true)?;
                println!("Sponsor register: {} organisations.", sponsors.len());
                let bcorps = store.bcorp_directory(true)?;
                println!("B-Corp directory: {} companies.", bcorps.len());
            }
            RegistryCommands::Status => {
                let store = RegistryStore::open()?;
                for (file, fetched) in store.cache_status() {
                    match fetched {
                        Some(at) => println!("{file}: fetched {at}"),
                        None => println!("{file}: not cached"),
                    }
                }
            }
        },

        Commands::Cleanup { dry_run } => {
            db.ensure_initialized()?;
            let postings = db.all_postings()?;
            let doomed = find_near_duplicates(&postings);
            if doomed.is_empty() {
                println!("No near-duplicates found.");
            } else {
                for id in &doomed {
                    if dry_run {
                        println!("Would remove {id}");
                    } else {
                        db.delete_posting(id)?;
                        println!("Removed {id}");
                    }
                }
                println!(
                    "{} {} near-duplicate(s).",
                    if dry_run { "Found" } else { "Removed" },
                    doomed.len()
                );
            }
        }
    }

    Ok(())
}

/// Near-duplicates: same normalized employer and near-identical title via
/// Jaro-Winkler. The earliest-seen posting wins; later arrivals from other
/// sources are dropped. Within-source duplicates never get this far (the
/// pipeline dedups on source id).
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.92;

fn find_near_duplicates(postings: &[StoredPosting]) -> Vec<String> {
    let mut doomed = Vec::new();
    let mut kept: Vec<&StoredPosting> = Vec::new();

    // `postings` arrive ordered by first_seen_at ascending.
    for candidate in postings {
        let candidate_company = normalize_company(&candidate.company);
        let candidate_title = candidate.title.to_lowercase();
        let duplicate = kept.iter().any(|existing| {
            normalize_company(&existing.company) == candidate_company
                && strsim::jaro_winkler(&existing.title.to_lowercase(), &candidate_title)
                    >= TITLE_SIMILARITY_THRESHOLD
        });
        if duplicate {
            doomed.push(candidate.stable_id.clone());
        } else {
            kept.push(candidate);
        }
    }

    doomed
}

fn print_posting_table(postings: &[StoredPosting]) {
    if postings.is_empty() {
        println!("No postings found.");
        return;
    }
    println!(
        "{:<22} {:<12} {:<8} {:>5} {:>5} {:<28} {:<20}",
        "ID", "STATUS", "VISA", "SCORE", "PROB", "TITLE", "COMPANY"
    );
    println!("{}", "-".repeat(106));
    for posting in postings {
        println!(
            "{:<22} {:<12} {:<8} {:>5} {:>4}% {:<28} {:<20}",
            truncate(&posting.stable_id, 20),
            posting.status.as_str(),
            posting.visa_confidence.as_str(),
            posting.match_score,
            posting.success_probability,
            truncate(&posting.title, 26),
            truncate(&posting.company, 18)
        );
    }
}

fn print_posting_detail(posting: &StoredPosting) {
    println!("{} ({})", posting.title, posting.stable_id);
    println!("Company: {}", posting.company);
    if !posting.location.is_empty() {
        println!("Location: {}", posting.location);
    }
    println!("Status: {}", posting.status.as_str());
    if posting.saved {
        println!("Saved: yes");
    }
    println!(
        "Visa: {} | score {} | probability {}%",
        posting.visa_confidence.as_str(),
        posting.match_score,
        posting.success_probability
    );
    println!("  {}", posting.visa_reason);
    if posting.verified_sponsor {
        let rating = posting
            .sponsor_rating
            .map(|r| r.as_str())
            .unwrap_or("unknown");
        println!("Sponsor register: listed (rating {rating})");
    }
    if posting.is_bcorp {
        println!("Certified B Corp");
    }
    if let Some(label) = &posting.occupation_label {
        println!(
            "Occupation: {label} ({})",
            posting.occupation_code.as_deref().unwrap_or("?")
        );
    }
    match (posting.salary_annual_gbp, &posting.salary_text) {
        (Some(annual), _) => println!("Salary: ~£{annual}/yr"),
        (None, Some(text)) => println!("Salary: {text}"),
        (None, None) => {}
    }
    if let Some(url) = &posting.url {
        println!("URL: {url}");
    }
    if !posting.tags.is_empty() {
        println!("Tags: {}", posting.tags.join(", "));
    }
    println!("First seen: {}", posting.first_seen_at);
    if !posting.ai_summary.is_empty() {
        println!("\n{}", posting.ai_summary);
    }
    if !posting.notes.is_empty() {
        println!("\nNotes:\n{}", posting.notes);
    }
    if !posting.description.is_empty() {
        println!("\n--- Description ---");
        println!("{}", normalize::strip_html(&posting.description));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
