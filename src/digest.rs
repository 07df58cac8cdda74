use crate::models::{StoredPosting, VisaConfidence};

const WRAP_WIDTH: usize = 78;

/// Plain-text digest of the top postings, ready for whatever delivers it.
pub fn render_digest(postings: &[StoredPosting]) -> String {
    if postings.is_empty() {
        return "No postings above the quality bar yet. Run an ingest pass first.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("Top {} postings by success probability\n", postings.len()));
    out.push_str(&"=".repeat(WRAP_WIDTH));
    out.push('\n');

    for (i, posting) in postings.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!(
            "{}. [{}] {} at {}\n",
            i + 1,
            visa_glyph(posting.visa_confidence),
            posting.title,
            posting.company
        ));
        out.push_str(&format!(
            "   score {} | probability {}% | {}\n",
            posting.match_score,
            posting.success_probability,
            if posting.location.is_empty() {
                "location n/a"
            } else {
                posting.location.as_str()
            }
        ));
        if let Some(salary) = posting.salary_annual_gbp {
            out.push_str(&format!("   salary ~£{salary}/yr\n"));
        } else if let Some(text) = &posting.salary_text {
            out.push_str(&format!("   salary: {text}\n"));
        }
        if !posting.ai_summary.is_empty() {
            for line in textwrap::wrap(&posting.ai_summary, WRAP_WIDTH - 3) {
                out.push_str(&format!("   {line}\n"));
            }
        }
        for line in textwrap::wrap(&posting.visa_reason, WRAP_WIDTH - 3) {
            out.push_str(&format!("   {line}\n"));
        }
        if let Some(url) = &posting.url {
            out.push_str(&format!("   {url}\n"));
        }
    }

    out
}

fn visa_glyph(confidence: VisaConfidence) -> &'static str {
    match confidence {
        VisaConfidence::Green => "GREEN",
        VisaConfidence::Yellow => "YELLOW",
        VisaConfidence::Red => "RED",
        VisaConfidence::Unknown => "?",
    }
}
