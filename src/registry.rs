use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::matcher::{BCORP_FUZZY_RATIO, Registry, RegistryEntry, SPONSOR_FUZZY_RATIO};
use crate::models::SponsorRating;
use crate::normalize::normalize_company;

/// The register of licensed sponsors changes daily; a day-old snapshot is
/// current enough for scoring.
const SPONSOR_TTL_HOURS: i64 = 24;
/// B-Corp certification moves slowly.
const BCORP_TTL_HOURS: i64 = 24 * 7;

const DEFAULT_SPONSOR_CSV_URL: &str =
    "https://assets.publishing.service.gov.uk/media/register-of-licensed-sponsors/Worker_and_Temporary_Worker.csv";
const DEFAULT_BCORP_CSV_URL: &str =
    "https://query.data.world/s/bcorp-impact-data-latest.csv";

#[derive(Debug, Deserialize)]
struct SponsorRow {
    #[serde(rename = "Organisation Name")]
    name: String,
    #[serde(rename = "Type & Rating")]
    type_rating: String,
    #[serde(rename = "Route")]
    route: String,
}

#[derive(Debug, Deserialize)]
struct BCorpRow {
    company_name: String,
    #[serde(default)]
    country: Option<String>,
}

/// Loads and caches registry snapshots. Snapshots are immutable once handed
/// out; a refresh only takes effect on the next pass.
pub struct RegistryStore {
    cache_dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl RegistryStore {
    pub fn open() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "greenlight")
            .ok_or_else(|| anyhow!("Could not determine a cache directory"))?;
        Self::at(dirs.cache_dir())
    }

    pub fn at(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            cache_dir: dir.to_path_buf(),
            client,
        })
    }

    /// The sponsor register snapshot: cached copy if fresh, otherwise a new
    /// download, otherwise the last-good cache with a warning.
    pub fn sponsor_register(&self, force_refresh: bool) -> Result<Registry> {
        self.load(
            "sponsors.json",
            sponsor_csv_url().as_str(),
            SPONSOR_TTL_HOURS,
            force_refresh,
            parse_sponsor_csv,
        )
    }

    pub fn bcorp_directory(&self, force_refresh: bool) -> Result<Registry> {
        self.load(
            "bcorps.json",
            bcorp_csv_url().as_str(),
            BCORP_TTL_HOURS,
            force_refresh,
            parse_bcorp_csv,
        )
    }

    /// Freshness timestamps of both cached snapshots, for `registry status`.
    pub fn cache_status(&self) -> Vec<(String, Option<chrono::DateTime<Utc>>)> {
        ["sponsors.json", "bcorps.json"]
            .iter()
            .map(|file| {
                let fetched = load_cached(&self.cache_dir.join(file)).map(|r| r.fetched_at);
                (file.to_string(), fetched)
            })
            .collect()
    }

    fn load(
        &self,
        cache_file: &str,
        url: &str,
        ttl_hours: i64,
        force_refresh: bool,
        parse: fn(&str) -> Result<Registry>,
    ) -> Result<Registry> {
        let path = self.cache_dir.join(cache_file);
        let cached = load_cached(&path);

        if !force_refresh {
            if let Some(reg) = &cached {
                if is_fresh(reg, ttl_hours) {
                    return Ok(reg.clone());
                }
            }
        }

        info!(url, "downloading registry");
        match self.download(url).and_then(|body| parse(&body)) {
            Ok(registry) => {
                if let Err(e) = save_cached(&path, &registry) {
                    warn!(error = %e, "failed to write registry cache");
                }
                info!(entries = registry.len(), "registry refreshed");
                Ok(registry)
            }
            Err(e) => match cached {
                // Last-good fallback: a stale snapshot beats no snapshot.
                Some(reg) => {
                    warn!(error = %e, fetched_at = %reg.fetched_at, "registry download failed, using cached snapshot");
                    Ok(reg)
                }
                None => Err(e.context(format!("No cached copy of {cache_file} to fall back to"))),
            },
        }
    }

    fn download(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to download {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("{url} returned status {}", response.status()));
        }
        response.text().context("Failed to read registry body")
    }
}

fn sponsor_csv_url() -> String {
    std::env::var("GREENLIGHT_SPONSOR_CSV_URL").unwrap_or_else(|_| DEFAULT_SPONSOR_CSV_URL.into())
}

fn bcorp_csv_url() -> String {
    std::env::var("GREENLIGHT_BCORP_CSV_URL").unwrap_or_else(|_| DEFAULT_BCORP_CSV_URL.into())
}

fn is_fresh(registry: &Registry, ttl_hours: i64) -> bool {
    Utc::now() - registry.fetched_at < Duration::hours(ttl_hours)
}

fn load_cached(path: &Path) -> Option<Registry> {
    let body = fs::read_to_string(path).ok()?;
    let mut registry: Registry = serde_json::from_str(&body).ok()?;
    registry.rebuild_index();
    Some(registry)
}

fn save_cached(path: &Path, registry: &Registry) -> Result<()> {
    let body = serde_json::to_string(registry)?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Parse the Worker & Temporary Worker register. One row per (organisation,
/// route); the first row seen for an organisation carries the rating kept.
pub fn parse_sponsor_csv(body: &str) -> Result<Registry> {
    let mut registry = Registry::new(SPONSOR_FUZZY_RATIO, Utc::now());
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    for row in reader.deserialize::<SponsorRow>() {
        let row = match row {
            Ok(r) => r,
            // Register rows are occasionally ragged; skip, keep the rest.
            Err(e) => {
                warn!(error = %e, "skipping malformed sponsor row");
                continue;
            }
        };
        let rating = if row.type_rating.contains("A rating") {
            SponsorRating::A
        } else if row.type_rating.contains("B rating") {
            SponsorRating::B
        } else {
            SponsorRating::Unknown
        };
        registry.insert(RegistryEntry {
            name: normalize_company(&row.name),
            display_name: row.name.trim().to_string(),
            rating: Some(rating),
            route: Some(row.route.trim().to_string()),
        });
    }
    if registry.is_empty() {
        return Err(anyhow!("Sponsor register parsed to zero entries"));
    }
    Ok(registry)
}

pub fn parse_bcorp_csv(body: &str) -> Result<Registry> {
    let mut registry = Registry::new(BCORP_FUZZY_RATIO, Utc::now());
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    for row in reader.deserialize::<BCorpRow>() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed B-Corp row");
                continue;
            }
        };
        registry.insert(RegistryEntry {
            name: normalize_company(&row.company_name),
            display_name: row.company_name.trim().to_string(),
            rating: None,
            route: row.country.map(|c| c.trim().to_string()),
        });
    }
    if registry.is_empty() {
        return Err(anyhow!("B-Corp directory parsed to zero entries"));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPONSOR_CSV: &str = "\
Organisation Name,Town/City,County,Type & Rating,Route
Acme Consulting Ltd,London,,Worker (A rating),Skilled Worker
Acme Consulting Ltd,London,,Worker (A rating),Global Business Mobility
Bright Futures LLP,Leeds,,Worker (B rating),Skilled Worker
Shadow Org,Bristol,,Temporary Worker,Creative Worker
";

    const BCORP_CSV: &str = "\
company_name,country
Riverford Organic Farmers,United Kingdom
Patagonia Works,United States
";

    #[test]
    fn test_parse_sponsor_csv_ratings_and_dedup() {
        let registry = parse_sponsor_csv(SPONSOR_CSV).unwrap();
        assert_eq!(registry.len(), 3);

        let acme = registry.match_name("Acme Consulting").unwrap();
        assert!(!acme.fuzzy);
        assert_eq!(acme.entry.rating, Some(SponsorRating::A));
        // First route row wins.
        assert_eq!(acme.entry.route.as_deref(), Some("Skilled Worker"));

        let bright = registry.match_name("Bright Futures").unwrap();
        assert_eq!(bright.entry.rating, Some(SponsorRating::B));

        let shadow = registry.match_name("Shadow Org").unwrap();
        assert_eq!(shadow.entry.rating, Some(SponsorRating::Unknown));
    }

    #[test]
    fn test_parse_bcorp_csv() {
        let registry = parse_bcorp_csv(BCORP_CSV).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.match_name("Riverford Organic Farmers").is_some());
    }

    #[test]
    fn test_empty_csv_is_an_error() {
        assert!(parse_sponsor_csv("Organisation Name,Town/City,County,Type & Rating,Route\n").is_err());
    }

    #[test]
    fn test_freshness_window() {
        let mut registry = parse_sponsor_csv(SPONSOR_CSV).unwrap();
        assert!(is_fresh(&registry, SPONSOR_TTL_HOURS));
        registry.fetched_at = Utc::now() - Duration::hours(SPONSOR_TTL_HOURS + 1);
        assert!(!is_fresh(&registry, SPONSOR_TTL_HOURS));
        // The longer B-Corp window would still accept it.
        assert!(is_fresh(&registry, BCORP_TTL_HOURS));
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = std::env::temp_dir().join(format!("greenlight-registry-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sponsors.json");

        let registry = parse_sponsor_csv(SPONSOR_CSV).unwrap();
        save_cached(&path, &registry).unwrap();

        let restored = load_cached(&path).unwrap();
        assert_eq!(restored.len(), registry.len());
        // The rebuilt index must serve exact lookups.
        assert!(restored.match_name("Acme Consulting").is_some());

        fs::remove_dir_all(&dir).ok();
    }
}
