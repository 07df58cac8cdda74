use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use tracing::{info, warn};

use crate::ai::{AiScorer, ScoreOutcome};
use crate::classify::is_relevant;
use crate::db::Database;
use crate::eligibility::{self, SponsorCheck};
use crate::matcher::Registry;
use crate::models::{EnrichedPosting, RawPosting, ScoredPosting};
use crate::normalize::{normalize_company, strip_html};
use crate::occupation::infer_occupation;
use crate::salary::parse_salary;
use crate::score::{score_posting, success_probability, synthesize_summary, title_tier};
use crate::sources::JobSource;

/// Postings scoring below this are dropped after full scoring: they passed
/// the cheap keyword pre-filter but established no real domain context.
pub const QUALITY_THRESHOLD: i64 = 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub fetched: usize,
    pub duplicates: usize,
    pub irrelevant: usize,
    pub below_quality: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Exclusive lock for one ingestion pass. The idempotent-merge invariant
/// assumes one writer per stable id, so a concurrent trigger is rejected,
/// never interleaved.
#[derive(Debug)]
pub struct PassLock {
    path: PathBuf,
}

impl PassLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("ingest.lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(anyhow!(
                "Another ingestion pass is already running (lock file {}). \
                 Remove it if that pass crashed.",
                path.display()
            )),
            Err(e) => Err(e).with_context(|| format!("Failed to create lock {}", path.display())),
        }
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, "failed to remove pass lock");
        }
    }
}

/// Registry lookups plus the occupation mapper: everything derived about a
/// posting before salary and scoring. Returns the sponsor check alongside so
/// the eligibility evaluator can name the matched organisation.
pub fn enrich(
    raw: RawPosting,
    sponsors: &Registry,
    bcorps: &Registry,
) -> (EnrichedPosting, SponsorCheck) {
    let check = if normalize_company(&raw.company).is_empty() {
        SponsorCheck::Unidentified
    } else {
        match sponsors.match_name(&raw.company) {
            Some(m) => SponsorCheck::Listed {
                display_name: m.entry.display_name.clone(),
                rating: m.entry.rating,
            },
            None => SponsorCheck::NotListed,
        }
    };

    let verified_sponsor = matches!(check, SponsorCheck::Listed { .. });
    let sponsor_rating = match &check {
        SponsorCheck::Listed { rating, .. } => *rating,
        _ => None,
    };
    let is_bcorp = bcorps.match_name(&raw.company).is_some();
    let role_priority = title_tier(&raw.title).map(|(idx, _)| idx as i64).unwrap_or(0);

    (
        EnrichedPosting {
            raw,
            verified_sponsor,
            sponsor_rating,
            is_bcorp,
            role_priority,
        },
        check,
    )
}

/// Salary, eligibility, heuristic (or AI) score, summary and the blended
/// probability: the full scored record for one posting.
pub fn build_scored(
    enriched: EnrichedPosting,
    check: &SponsorCheck,
    description_plain: &str,
    ai: Option<&mut AiScorer>,
) -> ScoredPosting {
    let salary_annual_gbp = enriched
        .raw
        .salary_text
        .as_deref()
        .and_then(parse_salary);
    let occupation = infer_occupation(&enriched.raw.title);
    let (visa_confidence, visa_reason) =
        eligibility::evaluate(check, occupation, salary_annual_gbp);

    let breakdown = score_posting(&enriched, description_plain);

    let (match_score, ai_summary) = match ai {
        Some(scorer) => match scorer.score(
            &enriched,
            description_plain,
            salary_annual_gbp,
            occupation.map(|o| o.label),
            visa_confidence,
        ) {
            ScoreOutcome::Scored { score, summary } => (score, summary),
            ScoreOutcome::Unavailable { .. } => (
                breakdown.score,
                synthesize_summary(&breakdown, enriched.raw.remote),
            ),
        },
        None => (
            breakdown.score,
            synthesize_summary(&breakdown, enriched.raw.remote),
        ),
    };

    let success = success_probability(match_score, visa_confidence);

    ScoredPosting {
        occupation_code: occupation.map(|o| o.code.to_string()),
        occupation_label: occupation.map(|o| o.label.to_string()),
        salary_annual_gbp,
        visa_confidence,
        visa_reason,
        match_score,
        ai_summary,
        success_probability: success,
        enriched,
    }
}

/// One ingestion pass over the given sources. A source failure is logged and
/// skipped; a single posting never aborts the batch.
pub fn run_pass(
    db: &Database,
    sponsors: &Registry,
    bcorps: &Registry,
    sources: &[Box<dyn JobSource>],
    mut ai: Option<&mut AiScorer>,
    dry_run: bool,
) -> Result<PassStats> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let mut stats = PassStats::default();

    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            pause_with_jitter(sources[i - 1].pause());
        }

        let postings = match source.fetch(&client) {
            Ok(p) => p,
            Err(e) => {
                warn!(source = source.id(), error = %e, "source fetch failed, continuing");
                stats.sources_failed += 1;
                continue;
            }
        };
        stats.sources_ok += 1;
        stats.fetched += postings.len();
        info!(source = source.id(), count = postings.len(), "fetched postings");

        let mut seen_ids: HashSet<String> = HashSet::new();
        for raw in postings {
            if !seen_ids.insert(raw.source_id.clone()) {
                stats.duplicates += 1;
                continue;
            }

            let description_plain = strip_html(&raw.description);

            // Cheap keyword gate before any entity matching.
            if !is_relevant(
                &raw.title,
                &description_plain,
                &raw.tags,
                source.strictness(),
                source.query(),
            ) {
                stats.irrelevant += 1;
                continue;
            }

            let (enriched, check) = enrich(raw, sponsors, bcorps);
            let scored = build_scored(enriched, &check, &description_plain, ai.as_deref_mut());

            if scored.match_score < QUALITY_THRESHOLD {
                stats.below_quality += 1;
                continue;
            }

            if dry_run {
                info!(
                    id = %scored.stable_id(),
                    score = scored.match_score,
                    visa = scored.visa_confidence.as_str(),
                    "dry run, would upsert"
                );
                continue;
            }

            if db.upsert_posting(&scored)? {
                stats.inserted += 1;
            } else {
                stats.updated += 1;
            }
        }
    }

    info!(
        sources_ok = stats.sources_ok,
        sources_failed = stats.sources_failed,
        fetched = stats.fetched,
        duplicates = stats.duplicates,
        irrelevant = stats.irrelevant,
        below_quality = stats.below_quality,
        inserted = stats.inserted,
        updated = stats.updated,
        "ingestion pass complete"
    );
    Ok(stats)
}

fn pause_with_jitter(base: Duration) {
    if base.is_zero() {
        return;
    }
    let jitter: u64 = rand::thread_rng().gen_range(0..250);
    std::thread::sleep(base + Duration::from_millis(jitter));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Strictness;
    use crate::matcher::{BCORP_FUZZY_RATIO, RegistryEntry, SPONSOR_FUZZY_RATIO};
    use crate::models::{JobStatus, SponsorRating, VisaConfidence};
    use chrono::Utc;

    struct CannedSource {
        postings: Vec<RawPosting>,
        strictness: Strictness,
    }

    impl JobSource for CannedSource {
        fn id(&self) -> &'static str {
            "canned"
        }
        fn strictness(&self) -> Strictness {
            self.strictness
        }
        fn pause(&self) -> Duration {
            Duration::ZERO
        }
        fn fetch(&self, _client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
            Ok(self.postings.clone())
        }
    }

    struct FailingSource;

    impl JobSource for FailingSource {
        fn id(&self) -> &'static str {
            "failing"
        }
        fn strictness(&self) -> Strictness {
            Strictness::General
        }
        fn pause(&self) -> Duration {
            Duration::ZERO
        }
        fn fetch(&self, _client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn sponsor_fixture() -> Registry {
        let mut reg = Registry::new(SPONSOR_FUZZY_RATIO, Utc::now());
        reg.insert(RegistryEntry {
            name: normalize_company("Acme Consulting Ltd"),
            display_name: "Acme Consulting Ltd".to_string(),
            rating: Some(SponsorRating::A),
            route: Some("Skilled Worker".to_string()),
        });
        reg
    }

    fn bcorp_fixture() -> Registry {
        Registry::new(BCORP_FUZZY_RATIO, Utc::now())
    }

    fn raw(source_id: &str, title: &str, company: &str) -> RawPosting {
        RawPosting {
            source: "canned".to_string(),
            source_id: source_id.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            location: "London".to_string(),
            description: String::new(),
            url: None,
            tags: vec![],
            job_type: None,
            remote: false,
            salary_text: None,
            posted_at: None,
        }
    }

    #[test]
    fn test_end_to_end_strong_posting() {
        let db = Database::open_in_memory().unwrap();
        let sponsors = sponsor_fixture();
        let bcorps = bcorp_fixture();

        let mut posting = raw("1", "Sustainability Consultant", "Acme Consulting Ltd");
        posting.salary_text = Some("£50,000".to_string());
        posting.description =
            "<p>Advise clients on <b>CSRD</b> and GRI reporting as part of our consulting team.</p>"
                .to_string();

        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![posting],
            strictness: Strictness::General,
        })];

        let stats = run_pass(&db, &sponsors, &bcorps, &sources, None, false).unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.below_quality, 0);

        let stored = db.get_posting("canned:1").unwrap().unwrap();
        assert_eq!(stored.occupation_code.as_deref(), Some("2152"));
        assert_eq!(stored.salary_annual_gbp, Some(50_000));
        assert_eq!(stored.visa_confidence, VisaConfidence::Green);
        assert!(stored.match_score >= 60, "score was {}", stored.match_score);
        assert!(
            stored.success_probability >= 70,
            "probability was {}",
            stored.success_probability
        );
        assert!(stored.verified_sponsor);
        assert!(!stored.ai_summary.is_empty());
    }

    #[test]
    fn test_dedup_within_source() {
        let db = Database::open_in_memory().unwrap();
        let mut first = raw("1", "Sustainability Consultant", "Acme Consulting Ltd");
        first.description = "CSRD reporting role.".to_string();
        let second = first.clone();

        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![first, second],
            strictness: Strictness::General,
        })];

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(db.count_postings().unwrap(), 1);
    }

    #[test]
    fn test_prefilter_drops_irrelevant_before_matching() {
        let db = Database::open_in_memory().unwrap();
        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![raw("1", "Java Developer", "Acme Consulting Ltd")],
            strictness: Strictness::General,
        })];

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        assert_eq!(stats.irrelevant, 1);
        assert_eq!(db.count_postings().unwrap(), 0);
    }

    #[test]
    fn test_quality_gate_drops_low_scores() {
        let db = Database::open_in_memory().unwrap();
        // Passes variant A on three weak terms in the body, but has no tier
        // or depth signal, so scoring bottoms out below the gate.
        let mut posting = raw("1", "Project Manager", "Nobody Known Ltd");
        posting.location = String::new();
        posting.description =
            "Drive impact across green initiatives and emissions targets.".to_string();

        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![posting],
            strictness: Strictness::General,
        })];

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        assert_eq!(stats.below_quality, 1);
        assert_eq!(db.count_postings().unwrap(), 0);
    }

    #[test]
    fn test_source_failure_does_not_abort_pass() {
        let db = Database::open_in_memory().unwrap();
        let mut good = raw("1", "Sustainability Consultant", "Acme Consulting Ltd");
        good.description = "CSRD and GRI consulting.".to_string();

        let sources: Vec<Box<dyn JobSource>> = vec![
            Box::new(FailingSource),
            Box::new(CannedSource {
                postings: vec![good],
                strictness: Strictness::General,
            }),
        ];

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        assert_eq!(stats.sources_failed, 1);
        assert_eq!(stats.sources_ok, 1);
        assert_eq!(stats.inserted, 1);
    }

    #[test]
    fn test_reingestion_preserves_user_state() {
        let db = Database::open_in_memory().unwrap();
        let mut posting = raw("1", "Sustainability Consultant", "Acme Consulting Ltd");
        posting.description = "CSRD and GRI consulting.".to_string();

        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![posting],
            strictness: Strictness::General,
        })];

        run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        db.set_status("canned:1", "to_apply").unwrap();

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, false).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.inserted, 0);

        let stored = db.get_posting("canned:1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::ToApply);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut posting = raw("1", "Sustainability Consultant", "Acme Consulting Ltd");
        posting.description = "CSRD and GRI consulting.".to_string();

        let sources: Vec<Box<dyn JobSource>> = vec![Box::new(CannedSource {
            postings: vec![posting],
            strictness: Strictness::General,
        })];

        let stats =
            run_pass(&db, &sponsor_fixture(), &bcorp_fixture(), &sources, None, true).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(db.count_postings().unwrap(), 0);
    }

    #[test]
    fn test_placeholder_employer_never_verifies() {
        let (enriched, check) = enrich(
            raw("1", "Sustainability Consultant", "Confidential"),
            &sponsor_fixture(),
            &bcorp_fixture(),
        );
        assert!(!enriched.verified_sponsor);
        let scored = build_scored(enriched, &check, "", None);
        assert_eq!(scored.visa_confidence, VisaConfidence::Red);
    }

    #[test]
    fn test_empty_employer_is_unknown_confidence() {
        let (enriched, check) = enrich(
            raw("1", "Sustainability Consultant", "  "),
            &sponsor_fixture(),
            &bcorp_fixture(),
        );
        assert!(!enriched.verified_sponsor);
        let scored = build_scored(enriched, &check, "", None);
        assert_eq!(scored.visa_confidence, VisaConfidence::Unknown);
    }

    #[test]
    fn test_pass_lock_rejects_concurrent_pass() {
        let dir = std::env::temp_dir().join(format!("greenlight-lock-{}", std::process::id()));
        let lock = PassLock::acquire(&dir).unwrap();
        let second = PassLock::acquire(&dir);
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already running"));
        drop(lock);
        // Released on drop: a new pass can start.
        let third = PassLock::acquire(&dir);
        assert!(third.is_ok());
        drop(third);
        std::fs::remove_dir_all(&dir).ok();
    }
}
