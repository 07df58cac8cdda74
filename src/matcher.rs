use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SponsorRating;
use crate::normalize::normalize_company;

/// Names that mean "the source didn't tell us who the employer is".
/// These must never match any registry entry.
const PLACEHOLDER_NAMES: [&str; 16] = [
    "unknown",
    "see listing",
    "confidential",
    "not disclosed",
    "anonymous",
    "various",
    "multiple",
    "tbc",
    "tba",
    "not specified",
    "undisclosed",
    "company",
    "employer",
    "hiring company",
    "top company",
    "leading company",
];

/// Common shorthand → the normalized name the registries actually list.
/// Applied after normalization, before lookup.
const ALIASES: [(&str, &str); 6] = [
    ("pwc", "pricewaterhousecoopers"),
    ("e&y", "ernst & young"),
    ("bcg", "boston consulting"),
    ("jll", "jones lang lasalle"),
    ("m&s", "marks & spencer"),
    ("erm", "environmental resources management"),
];

const MIN_MATCH_LEN: usize = 3;
const MIN_FUZZY_LEN: usize = 5;

/// One organization in a registry snapshot. `name` is pre-normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub display_name: String,
    pub rating: Option<SponsorRating>,
    pub route: Option<String>,
}

/// A point-in-time name → metadata mapping (sponsor register or B-Corp
/// directory). Entries keep source-file order in `entries`; `index` serves
/// exact lookups. Immutable for the duration of an ingestion pass.
///
/// Fuzzy matching returns the first qualifying entry in insertion order, not
/// a global best match. That mirrors the original engine; changing it to
/// best-match would change which employers flag as verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub entries: Vec<RegistryEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    pub fuzzy_ratio: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Sponsor-register fuzzy ratio: permissive, the register lists full legal names.
pub const SPONSOR_FUZZY_RATIO: f64 = 0.5;
/// B-Corp fuzzy ratio: stricter, a false "B Corp" badge is highly visible.
pub const BCORP_FUZZY_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub entry: &'a RegistryEntry,
    pub fuzzy: bool,
}

impl Registry {
    pub fn new(fuzzy_ratio: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            fuzzy_ratio,
            fetched_at,
        }
    }

    /// Insert an entry, keeping the first record seen for a given normalized
    /// name (register files list one row per route; the first carries the
    /// rating we keep).
    pub fn insert(&mut self, entry: RegistryEntry) {
        if entry.name.is_empty() {
            return;
        }
        if self.index.contains_key(&entry.name) {
            return;
        }
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Rebuild the exact-lookup index; needed after deserializing a cached
    /// snapshot (the index is not persisted).
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        // First entry wins for any duplicate names in the file.
        for (i, e) in self.entries.iter().enumerate() {
            self.index.entry(e.name.clone()).or_insert(i);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a raw (un-normalized) company name.
    ///
    /// Rejects placeholder names and anything normalizing to fewer than 3
    /// characters. Exact lookup first; if that misses and the name is at
    /// least 5 characters, scan for the first entry where the shorter of the
    /// two strings is contained in the longer and the length ratio meets
    /// this registry's threshold.
    pub fn match_name(&self, raw_name: &str) -> Option<MatchResult<'_>> {
        let normalized = normalize_company(raw_name);
        if normalized.len() < MIN_MATCH_LEN {
            return None;
        }
        if PLACEHOLDER_NAMES.contains(&normalized.as_str()) {
            return None;
        }

        let lookup = ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, full)| full.to_string())
            .unwrap_or(normalized);

        if let Some(&idx) = self.index.get(&lookup) {
            return Some(MatchResult {
                entry: &self.entries[idx],
                fuzzy: false,
            });
        }

        if lookup.len() < MIN_FUZZY_LEN {
            return None;
        }

        for entry in &self.entries {
            if entry.name.len() < MIN_FUZZY_LEN {
                continue;
            }
            let (shorter, longer) = if lookup.len() <= entry.name.len() {
                (lookup.as_str(), entry.name.as_str())
            } else {
                (entry.name.as_str(), lookup.as_str())
            };
            let ratio = shorter.len() as f64 / longer.len() as f64;
            if ratio >= self.fuzzy_ratio && longer.contains(shorter) {
                return Some(MatchResult { entry, fuzzy: true });
            }
        }

        None
    }
}
