use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::classify::Strictness;
use crate::models::RawPosting;

/// A polled job board. Implementations are thin I/O adapters: fetch one
/// batch, map it to RawPosting, report how suspicious the pipeline should
/// be of the result and how long to pause before hitting the API again.
pub trait JobSource {
    fn id(&self) -> &'static str;
    fn strictness(&self) -> Strictness;
    /// The search query this source was polled with, when there is one.
    fn query(&self) -> Option<&str> {
        None
    }
    /// Mandatory pause after this source's calls (its published rate limit).
    fn pause(&self) -> Duration;
    fn fetch(&self, client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>>;
}

const PROFILE_QUERY: &str = "sustainability consultant";

/// All sources whose credentials are present. Remotive needs none; the rest
/// are skipped (not failed) when unconfigured.
pub fn default_sources() -> Vec<Box<dyn JobSource>> {
    let mut sources: Vec<Box<dyn JobSource>> = Vec::new();
    if let Ok(source) = AdzunaSource::from_env() {
        sources.push(Box::new(source));
    }
    if let Ok(source) = ReedSource::from_env() {
        sources.push(Box::new(source));
    }
    if let Ok(source) = JoobleSource::from_env() {
        sources.push(Box::new(source));
    }
    sources.push(Box::new(RemotiveSource));
    sources
}

// --- Adzuna ---

pub struct AdzunaSource {
    app_id: String,
    app_key: String,
}

#[derive(Debug, Deserialize)]
struct AdzunaResponse {
    results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    id: String,
    title: String,
    #[serde(default)]
    company: AdzunaName,
    #[serde(default)]
    location: AdzunaName,
    #[serde(default)]
    description: String,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
    #[serde(default)]
    contract_time: Option<String>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdzunaName {
    #[serde(default)]
    display_name: String,
}

impl AdzunaSource {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            app_id: env::var("ADZUNA_APP_ID").context("ADZUNA_APP_ID not set")?,
            app_key: env::var("ADZUNA_APP_KEY").context("ADZUNA_APP_KEY not set")?,
        })
    }
}

impl JobSource for AdzunaSource {
    fn id(&self) -> &'static str {
        "adzuna"
    }

    fn strictness(&self) -> Strictness {
        Strictness::General
    }

    fn pause(&self) -> Duration {
        Duration::from_millis(1200)
    }

    fn fetch(&self, client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
        let url = format!(
            "https://api.adzuna.com/v1/api/jobs/gb/search/1?app_id={}&app_key={}&what={}&results_per_page=50",
            self.app_id,
            self.app_key,
            urlencode(PROFILE_QUERY)
        );
        let response: AdzunaResponse = get_json(client, &url, self.id())?;
        Ok(response.results.into_iter().map(map_adzuna).collect())
    }
}

fn map_adzuna(job: AdzunaJob) -> RawPosting {
    let salary_text = match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) => Some(format!("£{:.0} - £{:.0}", min, max)),
        (Some(min), None) => Some(format!("£{min:.0}")),
        (None, Some(max)) => Some(format!("£{max:.0}")),
        (None, None) => None,
    };
    RawPosting {
        source: "adzuna".to_string(),
        source_id: job.id,
        title: job.title,
        company: job.company.display_name,
        location: job.location.display_name,
        description: job.description,
        url: job.redirect_url,
        tags: vec![],
        job_type: job.contract_time,
        remote: false,
        salary_text,
        posted_at: job.created.as_deref().and_then(parse_rfc3339),
    }
}

// --- Reed ---

pub struct ReedSource {
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ReedResponse {
    results: Vec<ReedJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReedJob {
    job_id: i64,
    job_title: String,
    #[serde(default)]
    employer_name: String,
    #[serde(default)]
    location_name: String,
    #[serde(default)]
    job_description: String,
    #[serde(default)]
    job_url: Option<String>,
    #[serde(default)]
    minimum_salary: Option<f64>,
    #[serde(default)]
    maximum_salary: Option<f64>,
    #[serde(default)]
    date: Option<String>,
}

impl ReedSource {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env::var("REED_API_KEY").context("REED_API_KEY not set")?,
        })
    }
}

impl JobSource for ReedSource {
    fn id(&self) -> &'static str {
        "reed"
    }

    fn strictness(&self) -> Strictness {
        Strictness::General
    }

    fn pause(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn fetch(&self, client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
        let url = format!(
            "https://www.reed.co.uk/api/1.0/search?keywords={}&resultsToTake=100",
            urlencode("sustainability")
        );
        let response = client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .with_context(|| "Failed to reach the Reed API")?;
        if !response.status().is_success() {
            return Err(anyhow!("reed returned status {}", response.status()));
        }
        let payload: ReedResponse = response.json().context("Unreadable Reed response")?;
        Ok(payload.results.into_iter().map(map_reed).collect())
    }
}

fn map_reed(job: ReedJob) -> RawPosting {
    let salary_text = match (job.minimum_salary, job.maximum_salary) {
        (Some(min), Some(max)) => Some(format!("£{:.0} - £{:.0}", min, max)),
        (Some(min), None) => Some(format!("£{min:.0}")),
        (None, Some(max)) => Some(format!("£{max:.0}")),
        (None, None) => None,
    };
    let posted_at = job.date.as_deref().and_then(|d| {
        // Reed dates look like 19/03/2025.
        NaiveDate::parse_from_str(d, "%d/%m/%Y")
            .ok()
            .and_then(|nd| nd.and_hms_opt(0, 0, 0))
            .map(|ndt| ndt.and_utc())
    });
    RawPosting {
        source: "reed".to_string(),
        source_id: job.job_id.to_string(),
        title: job.job_title,
        company: job.employer_name,
        location: job.location_name,
        description: job.job_description,
        url: job.job_url,
        tags: vec![],
        job_type: None,
        remote: false,
        salary_text,
        posted_at,
    }
}

// --- Jooble ---

pub struct JoobleSource {
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct JoobleResponse {
    jobs: Vec<JoobleJob>,
}

#[derive(Debug, Deserialize)]
struct JoobleJob {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    salary: Option<String>,
    #[serde(default, rename = "type")]
    job_type: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

impl JoobleSource {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env::var("JOOBLE_API_KEY").context("JOOBLE_API_KEY not set")?,
        })
    }
}

impl JobSource for JoobleSource {
    fn id(&self) -> &'static str {
        "jooble"
    }

    fn strictness(&self) -> Strictness {
        // Jooble snippets are heavily truncated; trust the search query.
        Strictness::SearchDriven
    }

    fn query(&self) -> Option<&str> {
        Some(PROFILE_QUERY)
    }

    fn pause(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn fetch(&self, client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
        let url = format!("https://jooble.org/api/{}", self.api_key);
        let body = serde_json::json!({ "keywords": PROFILE_QUERY, "location": "UK" });
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .with_context(|| "Failed to reach the Jooble API")?;
        if !response.status().is_success() {
            return Err(anyhow!("jooble returned status {}", response.status()));
        }
        let payload: JoobleResponse = response.json().context("Unreadable Jooble response")?;
        Ok(payload.jobs.into_iter().map(map_jooble).collect())
    }
}

fn map_jooble(job: JoobleJob) -> RawPosting {
    // Jooble ids arrive as numbers or strings depending on the feed.
    let source_id = match &job.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let salary_text = job.salary.filter(|s| !s.trim().is_empty());
    RawPosting {
        source: "jooble".to_string(),
        source_id,
        title: job.title,
        company: job.company,
        location: job.location,
        description: job.snippet,
        url: job.link,
        tags: vec![],
        job_type: job.job_type,
        remote: false,
        salary_text,
        posted_at: job.updated.as_deref().and_then(parse_rfc3339),
    }
}

// --- Remotive ---

/// Remotive publishes whole categories and asks for very few polls per day;
/// the pipeline treats it as its noisiest, most rate-limited feed.
pub struct RemotiveSource;

#[derive(Debug, Deserialize)]
struct RemotiveResponse {
    jobs: Vec<RemotiveJob>,
}

#[derive(Debug, Deserialize)]
struct RemotiveJob {
    id: i64,
    #[serde(default)]
    url: Option<String>,
    title: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    job_type: Option<String>,
    #[serde(default)]
    candidate_required_location: String,
    #[serde(default)]
    salary: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    publication_date: Option<String>,
}

impl JobSource for RemotiveSource {
    fn id(&self) -> &'static str {
        "remotive"
    }

    fn strictness(&self) -> Strictness {
        Strictness::Strict
    }

    fn pause(&self) -> Duration {
        Duration::from_secs(31)
    }

    fn fetch(&self, client: &reqwest::blocking::Client) -> Result<Vec<RawPosting>> {
        let url = "https://remotive.com/api/remote-jobs?category=business";
        let response: RemotiveResponse = get_json(client, url, self.id())?;
        Ok(response.jobs.into_iter().map(map_remotive).collect())
    }
}

fn map_remotive(job: RemotiveJob) -> RawPosting {
    let posted_at = job.publication_date.as_deref().and_then(|d| {
        parse_rfc3339(d).or_else(|| {
            chrono::NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
    });
    RawPosting {
        source: "remotive".to_string(),
        source_id: job.id.to_string(),
        title: job.title,
        company: job.company_name,
        location: job.candidate_required_location,
        description: job.description,
        url: job.url,
        tags: job.tags,
        job_type: job.job_type,
        remote: true,
        salary_text: job.salary.filter(|s| !s.trim().is_empty()),
        posted_at,
    }
}

// --- shared helpers ---

fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::blocking::Client,
    url: &str,
    source: &str,
) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to reach the {source} API"))?;
    if !response.status().is_success() {
        return Err(anyhow!("{source} returned status {}", response.status()));
    }
    response
        .json()
        .with_context(|| format!("Unreadable {source} response"))
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn urlencode(value: &str) -> String {
    value.replace(' ', "%20")
}
