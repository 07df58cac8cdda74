use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A posting exactly as a source handed it to us. One per (source, source id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String, // HTML allowed
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub job_type: Option<String>,
    pub remote: bool,
    pub salary_text: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl RawPosting {
    /// Stable identity key. Re-ingesting the same posting must hit the same row.
    pub fn stable_id(&self) -> String {
        format!("{}:{}", self.source, self.source_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SponsorRating {
    A,
    B,
    Unknown,
}

impl SponsorRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorRating::A => "A",
            SponsorRating::B => "B",
            SponsorRating::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(SponsorRating::A),
            "B" => Some(SponsorRating::B),
            "unknown" => Some(SponsorRating::Unknown),
            _ => None,
        }
    }
}

/// RawPosting plus registry-derived facts. Deterministic for a given snapshot.
#[derive(Debug, Clone)]
pub struct EnrichedPosting {
    pub raw: RawPosting,
    pub verified_sponsor: bool,
    pub sponsor_rating: Option<SponsorRating>,
    pub is_bcorp: bool,
    /// 1-based index of the matched title-tier rule; 0 = no tier hit.
    pub role_priority: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisaConfidence {
    Green,
    Yellow,
    Red,
    Unknown,
}

impl VisaConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisaConfidence::Green => "green",
            VisaConfidence::Yellow => "yellow",
            VisaConfidence::Red => "red",
            VisaConfidence::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "green" => Some(VisaConfidence::Green),
            "yellow" => Some(VisaConfidence::Yellow),
            "red" => Some(VisaConfidence::Red),
            "unknown" => Some(VisaConfidence::Unknown),
            _ => None,
        }
    }

    /// Weight used by the composite ranker.
    pub fn weight(&self) -> f64 {
        match self {
            VisaConfidence::Green => 1.0,
            VisaConfidence::Yellow => 0.55,
            VisaConfidence::Red => 0.15,
            VisaConfidence::Unknown => 0.3,
        }
    }
}

/// The unit the pipeline persists.
#[derive(Debug, Clone)]
pub struct ScoredPosting {
    pub enriched: EnrichedPosting,
    pub occupation_code: Option<String>,
    pub occupation_label: Option<String>,
    pub salary_annual_gbp: Option<i64>,
    pub visa_confidence: VisaConfidence,
    pub visa_reason: String,
    pub match_score: i64,
    pub ai_summary: String,
    pub success_probability: i64,
}

impl ScoredPosting {
    pub fn stable_id(&self) -> String {
        self.enriched.raw.stable_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    New,
    ToApply,
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Archived,
}

pub const ALL_STATUSES: [JobStatus; 7] = [
    JobStatus::New,
    JobStatus::ToApply,
    JobStatus::Applied,
    JobStatus::Interviewing,
    JobStatus::Offer,
    JobStatus::Rejected,
    JobStatus::Archived,
];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::ToApply => "to_apply",
            JobStatus::Applied => "applied",
            JobStatus::Interviewing => "interviewing",
            JobStatus::Offer => "offer",
            JobStatus::Rejected => "rejected",
            JobStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_STATUSES.iter().copied().find(|st| st.as_str() == s)
    }

    pub fn allowed_values() -> String {
        ALL_STATUSES
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// ScoredPosting plus the user-owned fields that survive re-ingestion.
#[derive(Debug, Clone)]
pub struct StoredPosting {
    pub stable_id: String,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub job_type: Option<String>,
    pub remote: bool,
    pub salary_text: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub verified_sponsor: bool,
    pub sponsor_rating: Option<SponsorRating>,
    pub is_bcorp: bool,
    pub role_priority: i64,
    pub occupation_code: Option<String>,
    pub occupation_label: Option<String>,
    pub salary_annual_gbp: Option<i64>,
    pub visa_confidence: VisaConfidence,
    pub visa_reason: String,
    pub match_score: i64,
    pub ai_summary: String,
    pub success_probability: i64,
    pub saved: bool,
    pub status: JobStatus,
    pub notes: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_is_deterministic() {
        let raw = RawPosting {
            source: "adzuna".to_string(),
            source_id: "12345".to_string(),
            title: "Sustainability Consultant".to_string(),
            company: "Acme".to_string(),
            location: "London".to_string(),
            description: String::new(),
            url: None,
            tags: vec![],
            job_type: None,
            remote: false,
            salary_text: None,
            posted_at: None,
        };
        assert_eq!(raw.stable_id(), "adzuna:12345");
    }

    #[test]
    fn test_status_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("reviewing"), None);
        assert!(JobStatus::allowed_values().contains("to_apply"));
    }

    #[test]
    fn test_visa_weights() {
        assert_eq!(VisaConfidence::Green.weight(), 1.0);
        assert_eq!(VisaConfidence::Yellow.weight(), 0.55);
        assert_eq!(VisaConfidence::Red.weight(), 0.15);
        assert_eq!(VisaConfidence::Unknown.weight(), 0.3);
    }
}
