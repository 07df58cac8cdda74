use std::sync::LazyLock;

use regex::Regex;

const USD_TO_GBP: f64 = 0.79;
const EUR_TO_GBP: f64 = 0.85;

/// Bare numbers outside this band are years, reference codes, hourly rates.
const BARE_MIN: i64 = 15_000;
const BARE_MAX: i64 = 300_000;

static GBP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:£|gbp\s?)\s*(\d+(?:\.\d+)?)\s*(k?)").unwrap());
static USD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\$|usd\s?)\s*(\d+(?:\.\d+)?)\s*(k?)").unwrap());
static EUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:€|eur\s?)\s*(\d+(?:\.\d+)?)\s*(k?)").unwrap());
static BARE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4,6})\b").unwrap());

/// Extract a single annual GBP figure from unstructured salary text.
///
/// Tried in order, first tier producing at least one figure wins:
/// GBP-marked, USD-marked (converted), EUR-marked (converted), then bare
/// 4–6 digit numbers in a plausible annual band. Returns None when nothing
/// parses. Intentionally lossy but deterministic for a given input.
pub fn parse_salary(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // Thousands separators would split figures across matches.
    let cleaned = text.replace(',', "").to_lowercase();

    for (re, rate) in [
        (&*GBP_RE, 1.0),
        (&*USD_RE, USD_TO_GBP),
        (&*EUR_RE, EUR_TO_GBP),
    ] {
        if let Some(value) = scan_marked(&cleaned, re, rate) {
            return Some(value);
        }
    }

    scan_bare(&cleaned)
}

fn scan_marked(text: &str, re: &Regex, rate: f64) -> Option<i64> {
    let mut figures: Vec<f64> = Vec::new();
    for cap in re.captures_iter(text) {
        let Ok(num) = cap[1].parse::<f64>() else {
            continue;
        };
        let mut value = if cap[2].is_empty() { num } else { num * 1000.0 };
        // Figures under 500 are shorthand thousands ("£40 - £50").
        if value < 500.0 {
            value *= 1000.0;
        }
        figures.push(value * rate);
    }

    match figures.len() {
        0 => None,
        1 => Some(figures[0].round() as i64),
        // A range: the midpoint of the first two figures.
        _ => Some(((figures[0] + figures[1]) / 2.0).round() as i64),
    }
}

fn scan_bare(text: &str) -> Option<i64> {
    let figures: Vec<i64> = BARE_RE
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse::<i64>().ok())
        .filter(|n| (BARE_MIN..=BARE_MAX).contains(n))
        .collect();

    match figures.len() {
        0 => None,
        1 => Some(figures[0]),
        n => Some(((figures[0] + figures[n - 1]) as f64 / 2.0).round() as i64),
    }
}
