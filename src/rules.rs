use regex::Regex;

/// One entry in an ordered rule table: a pattern plus whatever the caller
/// wants back when it matches (a weight, an occupation, a label).
pub struct Rule<T> {
    pub pattern: Regex,
    pub value: T,
}

impl<T> Rule<T> {
    pub fn new(pattern: &str, value: T) -> Self {
        // Rule tables are compiled from literals at startup; a bad pattern is
        // a programming error, not an input error.
        let pattern = Regex::new(&format!("(?i){pattern}"))
            .unwrap_or_else(|e| panic!("invalid rule pattern {pattern:?}: {e}"));
        Self { pattern, value }
    }
}

/// First matching rule wins. Ordering in the table is significant: more
/// specific patterns must precede generic ones.
pub fn first_match<'a, T>(rules: &'a [Rule<T>], text: &str) -> Option<(usize, &'a Rule<T>)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.pattern.is_match(text))
}

/// Whole-word occurrence check. Both sides are expected lowercased; a term
/// only counts when not embedded in a longer alphanumeric run ("gri" must
/// not hit "agriculture").
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(term) {
        let abs = offset + pos;
        let end = abs + term.len();
        let before_ok = haystack[..abs]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        offset = end;
    }
    false
}

/// Count how many distinct terms from `terms` occur in `haystack`.
pub fn count_distinct_terms(terms: &[&str], haystack: &str) -> usize {
    terms.iter().filter(|t| contains_term(haystack, t)).count()
}

/// The distinct terms from `terms` that occur in `haystack`, in table order.
pub fn matching_terms<'a>(terms: &[&'a str], haystack: &str) -> Vec<&'a str> {
    terms
        .iter()
        .filter(|t| contains_term(haystack, t))
        .copied()
        .collect()
}
