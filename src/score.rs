use std::sync::LazyLock;

use crate::models::{EnrichedPosting, VisaConfidence};
use crate::rules::{Rule, contains_term, first_match, matching_terms};

const DEPTH_POINTS_EACH: i64 = 3;
const DEPTH_POINTS_CAP: i64 = 25;
const CONSULTING_BONUS: i64 = 8;
const COMMUNICATIONS_BONUS: i64 = 6;
const SPONSOR_BONUS_WITH_CONTEXT: i64 = 12;
const SPONSOR_BONUS_FLAT: i64 = 3;
const VISA_POINTS_EACH: i64 = 3;
const VISA_POINTS_CAP: i64 = 10;
const LOCATION_CITY: i64 = 10;
const LOCATION_REGION: i64 = 7;
const LOCATION_REMOTE: i64 = 5;
const SALARY_DISCLOSED: i64 = 5;
const NOISE_PENALTY: i64 = 15;

/// Title patterns in descending weight order; the first (strongest) match
/// wins and nothing stacks.
static TITLE_TIERS: LazyLock<Vec<Rule<i64>>> = LazyLock::new(|| {
    vec![
        Rule::new(
            r"(sustainability|esg) (consultant|advisor|adviser)|csrd|sustainability lead",
            30,
        ),
        Rule::new(
            r"(sustainability|esg|climate) (analyst|manager|specialist|officer)|head of (sustainability|esg)|sustainability director|chief sustainability officer",
            25,
        ),
        Rule::new(
            r"(carbon|climate|net zero|environmental) (consultant|analyst|manager|specialist|officer|advisor|adviser)",
            20,
        ),
        Rule::new(r"sustainability|esg", 15),
        Rule::new(r"climate|carbon|net zero|environment|renewable|decarboni", 10),
    ]
});

/// Framework and standards vocabulary that signals real domain depth in a
/// description, not just buzzwords.
const DEPTH_TERMS: [&str; 18] = [
    "csrd",
    "esrs",
    "gri",
    "tcfd",
    "tnfd",
    "sbti",
    "cdp",
    "ghg protocol",
    "scope 1",
    "scope 2",
    "scope 3",
    "secr",
    "double materiality",
    "life cycle assessment",
    "lca",
    "carbon accounting",
    "science based targets",
    "b corp",
];

const VISA_PHRASES: [&str; 9] = [
    "visa sponsorship",
    "sponsorship available",
    "skilled worker visa",
    "work visa",
    "sponsor visa",
    "visa support",
    "relocation support",
    "relocation package",
    "tier 2",
];

const UK_REGION_TERMS: [&str; 12] = [
    "united kingdom",
    "uk",
    "england",
    "scotland",
    "wales",
    "manchester",
    "birmingham",
    "bristol",
    "edinburgh",
    "glasgow",
    "leeds",
    "cambridge",
];

static CONSULTING_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(consultant|consulting|advisory|advisor|adviser)\b").unwrap()
});
static COMMUNICATIONS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(communications|stakeholder engagement|disclosure|reporting)\b")
        .unwrap()
});

#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: i64,
    pub reasons: Vec<String>,
}

/// The strongest title tier for a title: (1-based rule index, points).
pub fn title_tier(title: &str) -> Option<(usize, i64)> {
    first_match(&TITLE_TIERS, title).map(|(idx, rule)| (idx + 1, rule.value))
}

/// Additive heuristic relevance score, capped to [0, 100], with the ordered
/// list of reasons that earned it. `description` must already be plain text.
pub fn score_posting(posting: &EnrichedPosting, description: &str) -> ScoreBreakdown {
    let raw = &posting.raw;
    let description_lower = description.to_lowercase();
    let location_lower = raw.location.to_lowercase();

    let mut score: i64 = 0;
    let mut reasons: Vec<String> = Vec::new();

    let tier = title_tier(&raw.title);
    let tier_points = tier.map(|(_, pts)| pts).unwrap_or(0);
    if let Some((_, pts)) = tier {
        score += pts;
        reasons.push(format!("title matches a core sustainability role (+{pts})"));
    }

    let depth_hits = matching_terms(&DEPTH_TERMS, &description_lower);
    if !depth_hits.is_empty() {
        let pts = (depth_hits.len() as i64 * DEPTH_POINTS_EACH).min(DEPTH_POINTS_CAP);
        score += pts;
        reasons.push(format!(
            "mentions {} reporting framework{} ({})",
            depth_hits.len(),
            if depth_hits.len() == 1 { "" } else { "s" },
            depth_hits.join(", ")
        ));
    }

    // Generic bonuses only count once the posting has proven it is actually
    // about this domain.
    let domain_context = tier_points >= 10 || !depth_hits.is_empty();

    if domain_context {
        if CONSULTING_RE.is_match(&raw.title) || CONSULTING_RE.is_match(description) {
            score += CONSULTING_BONUS;
            reasons.push(format!("consulting-shaped role (+{CONSULTING_BONUS})"));
        }
        if COMMUNICATIONS_RE.is_match(&raw.title) || COMMUNICATIONS_RE.is_match(description) {
            score += COMMUNICATIONS_BONUS;
            reasons.push(format!(
                "communications and reporting angle (+{COMMUNICATIONS_BONUS})"
            ));
        }
    }

    if posting.verified_sponsor {
        if domain_context {
            score += SPONSOR_BONUS_WITH_CONTEXT;
            reasons.push("employer is a verified sponsor".to_string());
        } else {
            score += SPONSOR_BONUS_FLAT;
            reasons.push("employer is a verified sponsor (no domain context)".to_string());
        }
    }

    let visa_hits = matching_terms(&VISA_PHRASES, &description_lower);
    if !visa_hits.is_empty() {
        let pts = (visa_hits.len() as i64 * VISA_POINTS_EACH).min(VISA_POINTS_CAP);
        score += pts;
        reasons.push("posting mentions visa sponsorship".to_string());
    }

    // Highest applicable location bonus only.
    if contains_term(&location_lower, "london") {
        score += LOCATION_CITY;
        reasons.push("based in London".to_string());
    } else if UK_REGION_TERMS.iter().any(|t| contains_term(&location_lower, t)) {
        score += LOCATION_REGION;
        reasons.push("UK-based".to_string());
    } else if raw.remote || contains_term(&location_lower, "remote") {
        score += LOCATION_REMOTE;
        reasons.push("remote-friendly".to_string());
    }

    if raw.salary_text.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        score += SALARY_DISCLOSED;
        reasons.push("salary disclosed".to_string());
    }

    // Noise rejection: a posting with zero domain signal can still have
    // accrued generic bonuses; pull it back toward zero.
    if tier.is_none() && depth_hits.is_empty() {
        score -= NOISE_PENALTY;
        reasons.push("no domain signal (noise penalty)".to_string());
    }

    ScoreBreakdown {
        score: score.clamp(0, 100),
        reasons,
    }
}

/// Two-sentence plain-language summary of a score breakdown: fit band plus
/// the strongest relevance reason, then the sponsorship outlook.
pub fn synthesize_summary(breakdown: &ScoreBreakdown, remote: bool) -> String {
    let band = match breakdown.score {
        60.. => "Strong fit",
        30..=59 => "Possible fit",
        _ => "Weak fit",
    };

    let relevance = breakdown
        .reasons
        .iter()
        .find(|r| {
            r.starts_with("title matches")
                || r.starts_with("mentions")
                || r.starts_with("consulting")
        })
        .map(|r| strip_points_suffix(r))
        .unwrap_or_else(|| "little direct relevance signal".to_string());

    let first = format!("{band}: {relevance}.");

    let second = if breakdown
        .reasons
        .iter()
        .any(|r| r.starts_with("employer is a verified sponsor"))
    {
        "The employer is on the sponsor register, so visa sponsorship is plausible.".to_string()
    } else if breakdown
        .reasons
        .iter()
        .any(|r| r.contains("visa sponsorship"))
    {
        "The posting itself mentions visa sponsorship.".to_string()
    } else if remote {
        "Remote role; sponsorship depends on the hiring entity, confirm directly.".to_string()
    } else {
        "No sponsorship signal found; confirm directly with the employer.".to_string()
    };

    format!("{first} {second}")
}

fn strip_points_suffix(reason: &str) -> String {
    match reason.find(" (+") {
        Some(idx) => reason[..idx].to_string(),
        None => reason.to_string(),
    }
}

/// Blend heuristic score and visa confidence into one success percentage.
pub fn success_probability(score: i64, confidence: VisaConfidence) -> i64 {
    (score as f64 * 0.6 + confidence.weight() * 100.0 * 0.4).round() as i64
}
