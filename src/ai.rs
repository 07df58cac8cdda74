use std::env;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{EnrichedPosting, VisaConfidence};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
/// Minimum gap between calls; the provider's request budget is shared with
/// everything else on the account.
const MIN_CALL_INTERVAL: Duration = Duration::from_millis(1200);
const DESCRIPTION_EXCERPT_CHARS: usize = 1200;

/// What an AI scoring attempt produced. `Unavailable` is a normal outcome,
/// not an error: the pipeline falls back to the heuristic score and keeps
/// going.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored { score: i64, summary: String },
    Unavailable { reason: String },
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AiVerdict {
    score: f64,
    summary: String,
}

pub struct AiScorer {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
    last_call: Option<Instant>,
}

impl AiScorer {
    /// Build a scorer if `ANTHROPIC_API_KEY` is set; None means the caller
    /// should stick with the heuristic.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").ok()?;
        let model_id =
            env::var("GREENLIGHT_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;
        Some(Self {
            api_key,
            model_id,
            client,
            last_call: None,
        })
    }

    /// Score one posting. Never fails hard: any transport, status, or
    /// parsing problem comes back as `Unavailable` with the reason.
    pub fn score(
        &mut self,
        posting: &EnrichedPosting,
        description: &str,
        salary_annual_gbp: Option<i64>,
        occupation_label: Option<&str>,
        visa_confidence: VisaConfidence,
    ) -> ScoreOutcome {
        self.throttle();

        let prompt = build_prompt(
            posting,
            description,
            salary_annual_gbp,
            occupation_label,
            visa_confidence,
        );

        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: 512,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = match self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
        {
            Ok(r) => r,
            Err(e) => return unavailable(format!("request failed: {e}")),
        };

        if !response.status().is_success() {
            return unavailable(format!("API returned status {}", response.status()));
        }

        let api_response: AnthropicResponse = match response.json() {
            Ok(r) => r,
            Err(e) => return unavailable(format!("unreadable response body: {e}")),
        };

        let Some(text) = api_response.content.first().map(|b| b.text.as_str()) else {
            return unavailable("empty response content".to_string());
        };

        match parse_verdict(text) {
            Some((score, summary)) => {
                debug!(score, "AI scorer returned a verdict");
                ScoreOutcome::Scored { score, summary }
            }
            None => unavailable("response was not the expected JSON".to_string()),
        }
    }

    fn throttle(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < MIN_CALL_INTERVAL {
                std::thread::sleep(MIN_CALL_INTERVAL - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

fn unavailable(reason: String) -> ScoreOutcome {
    warn!(%reason, "AI scorer unavailable, falling back to heuristic");
    ScoreOutcome::Unavailable { reason }
}

fn build_prompt(
    posting: &EnrichedPosting,
    description: &str,
    salary_annual_gbp: Option<i64>,
    occupation_label: Option<&str>,
    visa_confidence: VisaConfidence,
) -> String {
    let raw = &posting.raw;
    let excerpt: String = description.chars().take(DESCRIPTION_EXCERPT_CHARS).collect();
    let salary = salary_annual_gbp
        .map(|s| format!("£{s} (annual)"))
        .unwrap_or_else(|| "not stated".to_string());

    format!(
        "You are scoring a job posting for a UK-based sustainability/ESG consultant \
         who needs Skilled Worker visa sponsorship.\n\
         Return ONLY a JSON object, no other text: {{\"score\": <0-100>, \"summary\": \"<two sentences>\"}}\n\n\
         Title: {title}\n\
         Company: {company}\n\
         Location: {location}\n\
         Salary: {salary}\n\
         Occupation match: {occupation}\n\
         Sponsor-register check: {sponsor}\n\
         Visa confidence: {visa}\n\n\
         Description excerpt:\n{excerpt}",
        title = raw.title,
        company = raw.company,
        location = raw.location,
        occupation = occupation_label.unwrap_or("none"),
        sponsor = if posting.verified_sponsor {
            "listed"
        } else {
            "not listed"
        },
        visa = visa_confidence.as_str(),
    )
}

/// Pull `{score, summary}` out of a model reply. Tolerates prose around the
/// JSON object but nothing less than valid JSON inside it.
fn parse_verdict(text: &str) -> Option<(i64, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let verdict: AiVerdict = serde_json::from_str(&text[start..=end]).ok()?;
    let summary = verdict.summary.trim();
    if summary.is_empty() {
        return None;
    }
    Some((
        (verdict.score.round() as i64).clamp(0, 100),
        summary.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_strict_json() {
        let (score, summary) =
            parse_verdict(r#"{"score": 72, "summary": "Good fit. Sponsor listed."}"#).unwrap();
        assert_eq!(score, 72);
        assert_eq!(summary, "Good fit. Sponsor listed.");
    }

    #[test]
    fn test_parse_verdict_tolerates_surrounding_prose() {
        let text = "Here is my assessment:\n{\"score\": 55.4, \"summary\": \"Possible fit.\"}\nThanks!";
        let (score, summary) = parse_verdict(text).unwrap();
        assert_eq!(score, 55);
        assert_eq!(summary, "Possible fit.");
    }

    #[test]
    fn test_parse_verdict_clamps_score() {
        assert_eq!(
            parse_verdict(r#"{"score": 140, "summary": "x"}"#).unwrap().0,
            100
        );
        assert_eq!(
            parse_verdict(r#"{"score": -3, "summary": "x"}"#).unwrap().0,
            0
        );
    }

    #[test]
    fn test_parse_verdict_rejects_malformed() {
        assert!(parse_verdict("not json at all").is_none());
        assert!(parse_verdict(r#"{"score": "high"}"#).is_none());
        assert!(parse_verdict(r#"{"summary": "missing score"}"#).is_none());
        assert!(parse_verdict(r#"{"score": 50, "summary": "  "}"#).is_none());
    }

    #[test]
    fn test_from_env_requires_api_key() {
        let original = env::var("ANTHROPIC_API_KEY").ok();
        unsafe {
            env::remove_var("ANTHROPIC_API_KEY");
        }

        let scorer = AiScorer::from_env();

        if let Some(val) = original {
            unsafe {
                env::set_var("ANTHROPIC_API_KEY", val);
            }
        }

        assert!(scorer.is_none());
    }
}
