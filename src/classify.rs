use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::rules::{contains_term, count_distinct_terms, matching_terms};

/// Core subject-matter vocabulary. Presence anywhere in title, description
/// or tags is sufficient evidence on its own.
pub const STRONG_TERMS: [&str; 24] = [
    "sustainability",
    "esg",
    "csrd",
    "esrs",
    "gri",
    "tcfd",
    "tnfd",
    "sbti",
    "cdp",
    "ghg protocol",
    "net zero",
    "decarbonisation",
    "decarbonization",
    "carbon footprint",
    "carbon accounting",
    "carbon reduction",
    "climate risk",
    "life cycle assessment",
    "circular economy",
    "b corp",
    "scope 3",
    "secr",
    "double materiality",
    "biodiversity",
];

/// Ambiguous vocabulary that also shows up in unrelated postings. Counts
/// only in the title, or when three distinct terms pile up in the full text.
pub const WEAK_TERMS: [&str; 12] = [
    "climate",
    "carbon",
    "environmental",
    "environment",
    "green",
    "renewable",
    "emissions",
    "impact",
    "responsible",
    "ethical",
    "governance",
    "social value",
];

const WEAK_FULL_TEXT_MIN: usize = 3;
const STRICT_DESCRIPTION_MIN: usize = 2;

/// Titles shaped like roles this profile actually applies for. Used by the
/// search-driven variant to compensate for truncated API snippets.
static ROLE_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(consultant|consulting|analyst|advisor|adviser|manager|officer|specialist|coordinator|lead|communications|engagement|report|reporting|strategy|strategist|sustainability|esg|climate|carbon|environment|environmental)\b",
    )
    .unwrap()
});

/// How suspicious to be of a source's listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Keyword tiers as-is.
    General,
    /// Noisy broad-category feeds: demand strong-tier evidence in the title
    /// or tags, or two distinct strong terms in the description. Weak tier
    /// is ignored entirely.
    Strict,
    /// Search-driven feeds: the caller's query carries intent, so a
    /// role-shaped title plus a domain-targeted query is enough.
    SearchDriven,
}

/// Decide whether a posting belongs on the board at all. Cheap: runs before
/// entity matching and scoring. `query` is the search string the source was
/// polled with, if any (only the search-driven variant reads it).
pub fn is_relevant(
    title: &str,
    description: &str,
    tags: &[String],
    strictness: Strictness,
    query: Option<&str>,
) -> bool {
    let title_lower = title.to_lowercase();
    let description_lower = description.to_lowercase();
    let tags_lower = tags.join(" ").to_lowercase();
    let combined = format!("{title_lower} {description_lower} {tags_lower}");

    let relevant = match strictness {
        Strictness::General => general_pass(&title_lower, &combined),
        Strictness::Strict => {
            let title_and_tags = format!("{title_lower} {tags_lower}");
            STRONG_TERMS.iter().any(|t| contains_term(&title_and_tags, t))
                || count_distinct_terms(&STRONG_TERMS, &description_lower)
                    >= STRICT_DESCRIPTION_MIN
        }
        Strictness::SearchDriven => {
            general_pass(&title_lower, &combined)
                || query.is_some_and(|q| {
                    let q = q.to_lowercase();
                    STRONG_TERMS.iter().any(|t| contains_term(&q, t))
                        && ROLE_SHAPE_RE.is_match(&title_lower)
                })
        }
    };

    if !relevant {
        debug!(title = %title, ?strictness, "posting rejected by relevance pre-filter");
    }
    relevant
}

fn general_pass(title_lower: &str, combined: &str) -> bool {
    if STRONG_TERMS.iter().any(|t| contains_term(combined, t)) {
        return true;
    }
    if WEAK_TERMS.iter().any(|t| contains_term(title_lower, t)) {
        return true;
    }
    count_distinct_terms(&WEAK_TERMS, combined) >= WEAK_FULL_TEXT_MIN
}

/// The strong-tier terms present in the given lowercased text, for scoring
/// and summary reasons.
pub fn strong_hits(text_lower: &str) -> Vec<&'static str> {
    matching_terms(&STRONG_TERMS, text_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tags() -> Vec<String> {
        vec![]
    }

    #[test]
    fn test_general_strong_term_anywhere() {
        assert!(is_relevant(
            "Graduate Analyst",
            "You will support CSRD reporting for FTSE clients.",
            &no_tags(),
            Strictness::General,
            None,
        ));
    }

    #[test]
    fn test_general_weak_term_in_title() {
        assert!(is_relevant(
            "Environmental Officer",
            "Local authority role.",
            &no_tags(),
            Strictness::General,
            None,
        ));
    }

    #[test]
    fn test_general_weak_terms_need_three_in_body() {
        // Two weak terms in the body only: not enough.
        assert!(!is_relevant(
            "Project Manager",
            "Drive impact across our green initiatives.",
            &no_tags(),
            Strictness::General,
            None,
        ));
        // Three distinct weak terms: enough.
        assert!(is_relevant(
            "Project Manager",
            "Drive impact across green initiatives and emissions targets.",
            &no_tags(),
            Strictness::General,
            None,
        ));
    }

    #[test]
    fn test_general_irrelevant_posting() {
        assert!(!is_relevant(
            "Java Developer",
            "Spring Boot microservices, AWS.",
            &no_tags(),
            Strictness::General,
            None,
        ));
    }

    #[test]
    fn test_strong_terms_are_word_bounded() {
        // "agriculture" must not satisfy the "gri" term.
        assert!(!is_relevant(
            "Farm Hand",
            "General agriculture work.",
            &no_tags(),
            Strictness::General,
            None,
        ));
    }

    #[test]
    fn test_strict_requires_title_tag_or_two_in_description() {
        // Strong term only once in the description: rejected.
        assert!(!is_relevant(
            "Operations Manager",
            "Our company has a net zero pledge.",
            &no_tags(),
            Strictness::Strict,
            None,
        ));
        // Two distinct strong terms in the description: accepted.
        assert!(is_relevant(
            "Operations Manager",
            "Own our net zero roadmap and scope 3 inventory.",
            &no_tags(),
            Strictness::Strict,
            None,
        ));
        // Strong term in the title: accepted.
        assert!(is_relevant(
            "Sustainability Manager",
            "",
            &no_tags(),
            Strictness::Strict,
            None,
        ));
        // Strong term in tags: accepted.
        assert!(is_relevant(
            "Manager",
            "",
            &vec!["esg".to_string()],
            Strictness::Strict,
            None,
        ));
    }

    #[test]
    fn test_strict_ignores_weak_tier() {
        // Would pass variant A on weak title + three weak body terms.
        assert!(!is_relevant(
            "Environmental Officer",
            "Green impact and carbon literacy welcome.",
            &no_tags(),
            Strictness::Strict,
            None,
        ));
    }

    #[test]
    fn test_search_driven_trusts_domain_query() {
        // Truncated snippet with no keywords, but the query was targeted and
        // the title is role-shaped.
        assert!(is_relevant(
            "Senior Consultant",
            "",
            &no_tags(),
            Strictness::SearchDriven,
            Some("sustainability consultant"),
        ));
        // Non-role-shaped title: still rejected.
        assert!(!is_relevant(
            "Warehouse Picker",
            "",
            &no_tags(),
            Strictness::SearchDriven,
            Some("sustainability consultant"),
        ));
        // Untargeted query: falls back to variant A rules.
        assert!(!is_relevant(
            "Senior Consultant",
            "",
            &no_tags(),
            Strictness::SearchDriven,
            Some("jobs in london"),
        ));
    }

    #[test]
    fn test_missing_input_is_no_evidence() {
        assert!(!is_relevant("", "", &no_tags(), Strictness::General, None));
        assert!(!is_relevant("", "", &no_tags(), Strictness::Strict, None));
        assert!(!is_relevant("", "", &no_tags(), Strictness::SearchDriven, None));
    }
}
