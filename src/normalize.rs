use scraper::Html;

/// Legal-entity suffixes stripped as whole words during normalization.
const LEGAL_SUFFIXES: [&str; 12] = [
    "ltd",
    "limited",
    "llp",
    "plc",
    "inc",
    "corp",
    "corporation",
    "gmbh",
    "ag",
    "group",
    "holdings",
    "uk",
];

/// Canonicalize a free-text company name for registry lookup.
///
/// Lowercases, strips quotation marks and legal-entity suffix words, drops
/// everything except letters, digits, whitespace and `&`, collapses runs of
/// whitespace and trims. Idempotent and total: any input (including empty or
/// punctuation-only strings) yields a string, never an error.
pub fn normalize_company(name: &str) -> String {
    let lowered = name.to_lowercase();

    let mut cleaned = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        match ch {
            '\'' | '\u{2018}' | '\u{2019}' | '"' | '\u{201C}' | '\u{201D}' => {}
            c if c.is_alphanumeric() || c.is_whitespace() || c == '&' => cleaned.push(c),
            _ => cleaned.push(' '),
        }
    }

    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| !LEGAL_SUFFIXES.contains(w))
        .collect();

    words.join(" ")
}

/// Flatten an HTML description to plain text. Non-HTML input passes through
/// with whitespace collapsed.
pub fn strip_html(description: &str) -> String {
    let fragment = Html::parse_fragment(description);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
