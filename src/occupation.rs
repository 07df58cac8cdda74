use std::sync::LazyLock;

use crate::rules::{Rule, first_match};

/// A standard occupation code with its going-rate salary band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupation {
    pub code: &'static str,
    pub label: &'static str,
    /// Standard going rate for the code, annual GBP.
    pub going_rate: i64,
    /// Discounted new-entrant going rate, annual GBP.
    pub new_entrant_rate: i64,
}

/// Ordered title rules, most specific first. Only the first match is
/// returned, so a compound phrase must sit above the generic word it
/// contains.
static OCCUPATION_RULES: LazyLock<Vec<Rule<Occupation>>> = LazyLock::new(|| {
    vec![
        Rule::new(
            r"chief sustainability officer|sustainability director|director of sustainability|head of (sustainability|esg)",
            Occupation {
                code: "1139",
                label: "Senior sustainability leadership",
                going_rate: 64_700,
                new_entrant_rate: 51_800,
            },
        ),
        Rule::new(
            r"(sustainability|esg|environmental) (consultant|advisor|adviser)",
            Occupation {
                code: "2152",
                label: "Environment professionals",
                going_rate: 37_100,
                new_entrant_rate: 29_700,
            },
        ),
        Rule::new(
            r"(sustainability|esg|climate|environmental) (analyst|manager|officer|specialist|lead)|climate risk analyst",
            Occupation {
                code: "2152",
                label: "Environment professionals",
                going_rate: 37_100,
                new_entrant_rate: 29_700,
            },
        ),
        Rule::new(
            r"ecologist|conservation (officer|scientist|manager)",
            Occupation {
                code: "2151",
                label: "Conservation professionals",
                going_rate: 34_400,
                new_entrant_rate: 27_500,
            },
        ),
        Rule::new(
            r"(management|strategy) consultant|business analyst",
            Occupation {
                code: "2423",
                label: "Management consultants and business analysts",
                going_rate: 40_000,
                new_entrant_rate: 32_000,
            },
        ),
        Rule::new(
            r"(communications|engagement) (manager|officer|lead|specialist)|public relations",
            Occupation {
                code: "2472",
                label: "Public relations professionals",
                going_rate: 33_000,
                new_entrant_rate: 26_400,
            },
        ),
        Rule::new(
            r"(project|programme) manager",
            Occupation {
                code: "2424",
                label: "Project management professionals",
                going_rate: 42_500,
                new_entrant_rate: 34_000,
            },
        ),
    ]
});

/// Map a job title to an occupation code. Title only, case-insensitive,
/// first rule wins; None when nothing applies.
pub fn infer_occupation(title: &str) -> Option<&'static Occupation> {
    first_match(&OCCUPATION_RULES, title).map(|(_, rule)| &rule.value)
}
