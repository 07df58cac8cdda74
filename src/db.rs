use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

use crate::models::{
    JobStatus, ScoredPosting, SponsorRating, StoredPosting, VisaConfidence,
};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // XDG data directory, with a cwd fallback.
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "greenlight") {
            Ok(proj_dirs.data_dir().join("greenlight.db"))
        } else {
            Ok(PathBuf::from("greenlight.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS postings (
                stable_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                url TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                job_type TEXT,
                remote INTEGER NOT NULL DEFAULT 0,
                salary_text TEXT,
                posted_at TEXT,
                verified_sponsor INTEGER NOT NULL DEFAULT 0,
                sponsor_rating TEXT,
                is_bcorp INTEGER NOT NULL DEFAULT 0,
                role_priority INTEGER NOT NULL DEFAULT 0,
                occupation_code TEXT,
                occupation_label TEXT,
                salary_annual_gbp INTEGER,
                visa_confidence TEXT NOT NULL DEFAULT 'unknown',
                visa_reason TEXT NOT NULL DEFAULT '',
                match_score INTEGER NOT NULL DEFAULT 0,
                ai_summary TEXT NOT NULL DEFAULT '',
                success_probability INTEGER NOT NULL DEFAULT 0,
                saved INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'new'
                    CHECK (status IN ('new', 'to_apply', 'applied', 'interviewing', 'offer', 'rejected', 'archived')),
                notes TEXT NOT NULL DEFAULT '',
                first_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_seen_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_postings_status ON postings(status);
            CREATE INDEX IF NOT EXISTS idx_postings_score ON postings(match_score);
            CREATE INDEX IF NOT EXISTS idx_postings_probability ON postings(success_probability);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'greenlight init' first."));
        }
        Ok(())
    }

    /// Upsert one scored posting. Derived fields always refresh; the
    /// user-owned columns (saved, status, notes) and first_seen_at are only
    /// written by the INSERT arm and survive every re-ingestion.
    pub fn upsert_posting(&self, posting: &ScoredPosting) -> Result<bool> {
        let raw = &posting.enriched.raw;
        let stable_id = posting.stable_id();

        let existed: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM postings WHERE stable_id = ?1)",
            [&stable_id],
            |row| row.get(0),
        )?;

        let tags = serde_json::to_string(&raw.tags)?;
        self.conn.execute(
            r#"
            INSERT INTO postings (
                stable_id, source, title, company, location, description, url,
                tags, job_type, remote, salary_text, posted_at,
                verified_sponsor, sponsor_rating, is_bcorp, role_priority,
                occupation_code, occupation_label, salary_annual_gbp,
                visa_confidence, visa_reason, match_score, ai_summary,
                success_probability
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24
            )
            ON CONFLICT(stable_id) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                location = excluded.location,
                description = excluded.description,
                url = excluded.url,
                tags = excluded.tags,
                job_type = excluded.job_type,
                remote = excluded.remote,
                salary_text = excluded.salary_text,
                posted_at = excluded.posted_at,
                verified_sponsor = excluded.verified_sponsor,
                sponsor_rating = excluded.sponsor_rating,
                is_bcorp = excluded.is_bcorp,
                role_priority = excluded.role_priority,
                occupation_code = excluded.occupation_code,
                occupation_label = excluded.occupation_label,
                salary_annual_gbp = excluded.salary_annual_gbp,
                visa_confidence = excluded.visa_confidence,
                visa_reason = excluded.visa_reason,
                match_score = excluded.match_score,
                ai_summary = excluded.ai_summary,
                success_probability = excluded.success_probability,
                last_seen_at = datetime('now')
            "#,
            params![
                stable_id,
                raw.source,
                raw.title,
                raw.company,
                raw.location,
                raw.description,
                raw.url,
                tags,
                raw.job_type,
                raw.remote as i64,
                raw.salary_text,
                raw.posted_at.map(|dt| dt.to_rfc3339()),
                posting.enriched.verified_sponsor as i64,
                posting.enriched.sponsor_rating.map(|r| r.as_str()),
                posting.enriched.is_bcorp as i64,
                posting.enriched.role_priority,
                posting.occupation_code,
                posting.occupation_label,
                posting.salary_annual_gbp,
                posting.visa_confidence.as_str(),
                posting.visa_reason,
                posting.match_score,
                posting.ai_summary,
                posting.success_probability,
            ],
        )?;

        Ok(!existed)
    }

    pub fn upsert_postings(&self, postings: &[ScoredPosting]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        for posting in postings {
            if self.upsert_posting(posting)? {
                stats.inserted += 1;
            } else {
                stats.updated += 1;
            }
        }
        Ok(stats)
    }

    const SELECT_COLUMNS: &'static str = "stable_id, source, title, company, location, \
        description, url, tags, job_type, remote, salary_text, posted_at, \
        verified_sponsor, sponsor_rating, is_bcorp, role_priority, \
        occupation_code, occupation_label, salary_annual_gbp, visa_confidence, \
        visa_reason, match_score, ai_summary, success_probability, saved, \
        status, notes, first_seen_at, last_seen_at";

    pub fn list_postings(
        &self,
        status: Option<JobStatus>,
        visa: Option<VisaConfidence>,
        saved_only: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredPosting>> {
        let mut sql = format!(
            "SELECT {} FROM postings WHERE 1=1",
            Self::SELECT_COLUMNS
        );
        let mut args: Vec<String> = vec![];

        if let Some(s) = status {
            args.push(s.as_str().to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(v) = visa {
            args.push(v.as_str().to_string());
            sql.push_str(&format!(" AND visa_confidence = ?{}", args.len()));
        }
        if saved_only {
            sql.push_str(" AND saved = 1");
        }

        sql.push_str(&format!(
            " ORDER BY success_probability DESC, match_score DESC, stable_id ASC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match args.len() {
            0 => stmt.query_map([], Self::row_to_posting)?,
            1 => stmt.query_map([&args[0]], Self::row_to_posting)?,
            2 => stmt.query_map([&args[0], &args[1]], Self::row_to_posting)?,
            _ => return Err(anyhow!("Too many filter parameters")),
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list postings")
    }

    pub fn get_posting(&self, stable_id: &str) -> Result<Option<StoredPosting>> {
        let sql = format!(
            "SELECT {} FROM postings WHERE stable_id = ?1",
            Self::SELECT_COLUMNS
        );
        let result = self
            .conn
            .query_row(&sql, [stable_id], Self::row_to_posting);
        match result {
            Ok(posting) => Ok(Some(posting)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Top postings from the latest pass by blended probability, for the
    /// rank view and the digest.
    pub fn top_postings(&self, limit: usize) -> Result<Vec<StoredPosting>> {
        let sql = format!(
            "SELECT {} FROM postings \
             WHERE status NOT IN ('rejected', 'archived') \
             ORDER BY success_probability DESC, match_score DESC, role_priority ASC \
             LIMIT {limit}",
            Self::SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to rank postings")
    }

    /// Flip the saved flag; returns the new value.
    pub fn toggle_saved(&self, stable_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE postings SET saved = 1 - saved WHERE stable_id = ?1",
            [stable_id],
        )?;
        if changed == 0 {
            return Err(anyhow!("No posting with id '{stable_id}'"));
        }
        let saved: bool = self.conn.query_row(
            "SELECT saved FROM postings WHERE stable_id = ?1",
            [stable_id],
            |row| row.get(0),
        )?;
        Ok(saved)
    }

    /// Set the tracking status. An unknown status string is a rejected
    /// write, not a silent coercion.
    pub fn set_status(&self, stable_id: &str, status: &str) -> Result<JobStatus> {
        let parsed = JobStatus::parse(status).ok_or_else(|| {
            anyhow!(
                "Invalid status '{}'. Allowed values: {}",
                status,
                JobStatus::allowed_values()
            )
        })?;
        let changed = self.conn.execute(
            "UPDATE postings SET status = ?1 WHERE stable_id = ?2",
            params![parsed.as_str(), stable_id],
        )?;
        if changed == 0 {
            return Err(anyhow!("No posting with id '{stable_id}'"));
        }
        Ok(parsed)
    }

    pub fn set_notes(&self, stable_id: &str, notes: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE postings SET notes = ?1 WHERE stable_id = ?2",
            params![notes, stable_id],
        )?;
        if changed == 0 {
            return Err(anyhow!("No posting with id '{stable_id}'"));
        }
        Ok(())
    }

    pub fn delete_posting(&self, stable_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM postings WHERE stable_id = ?1", [stable_id])?;
        Ok(())
    }

    pub fn all_postings(&self) -> Result<Vec<StoredPosting>> {
        let sql = format!(
            "SELECT {} FROM postings ORDER BY first_seen_at ASC, stable_id ASC",
            Self::SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to load postings")
    }

    pub fn count_postings(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))?)
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<StoredPosting> {
        let tags_json: String = row.get(7)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let posted_at: Option<String> = row.get(11)?;
        let sponsor_rating: Option<String> = row.get(13)?;
        let visa: String = row.get(19)?;
        let status: String = row.get(25)?;
        Ok(StoredPosting {
            stable_id: row.get(0)?,
            source: row.get(1)?,
            title: row.get(2)?,
            company: row.get(3)?,
            location: row.get(4)?,
            description: row.get(5)?,
            url: row.get(6)?,
            tags,
            job_type: row.get(8)?,
            remote: row.get::<_, i64>(9)? != 0,
            salary_text: row.get(10)?,
            posted_at: posted_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            verified_sponsor: row.get::<_, i64>(12)? != 0,
            sponsor_rating: sponsor_rating.as_deref().and_then(SponsorRating::parse),
            is_bcorp: row.get::<_, i64>(14)? != 0,
            role_priority: row.get(15)?,
            occupation_code: row.get(16)?,
            occupation_label: row.get(17)?,
            salary_annual_gbp: row.get(18)?,
            visa_confidence: VisaConfidence::parse(&visa).unwrap_or(VisaConfidence::Unknown),
            visa_reason: row.get(20)?,
            match_score: row.get(21)?,
            ai_summary: row.get(22)?,
            success_probability: row.get(23)?,
            saved: row.get::<_, i64>(24)? != 0,
            status: JobStatus::parse(&status).unwrap_or(JobStatus::New),
            notes: row.get(26)?,
            first_seen_at: row.get(27)?,
            last_seen_at: row.get(28)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrichedPosting, RawPosting};

    fn scored(source_id: &str, title: &str, score: i64, probability: i64) -> ScoredPosting {
        ScoredPosting {
            enriched: EnrichedPosting {
                raw: RawPosting {
                    source: "adzuna".to_string(),
                    source_id: source_id.to_string(),
                    title: title.to_string(),
                    company: "Acme Consulting Ltd".to_string(),
                    location: "London".to_string(),
                    description: "CSRD reporting.".to_string(),
                    url: Some("https://example.com/j/1".to_string()),
                    tags: vec!["esg".to_string()],
                    job_type: Some("full_time".to_string()),
                    remote: false,
                    salary_text: Some("£50,000".to_string()),
                    posted_at: None,
                },
                verified_sponsor: true,
                sponsor_rating: Some(SponsorRating::A),
                is_bcorp: false,
                role_priority: 1,
            },
            occupation_code: Some("2152".to_string()),
            occupation_label: Some("Environment professionals".to_string()),
            salary_annual_gbp: Some(50_000),
            visa_confidence: VisaConfidence::Green,
            visa_reason: "meets threshold".to_string(),
            match_score: score,
            ai_summary: "Strong fit.".to_string(),
            success_probability: probability,
        }
    }

    #[test]
    fn test_upsert_preserves_user_fields() {
        let db = Database::open_in_memory().unwrap();

        let first = scored("1", "Sustainability Consultant", 70, 82);
        assert!(db.upsert_posting(&first).unwrap());

        // User moves it along and takes notes.
        db.set_status("adzuna:1", "applied").unwrap();
        db.set_notes("adzuna:1", "Spoke to recruiter.").unwrap();
        db.toggle_saved("adzuna:1").unwrap();

        // Re-ingestion arrives with fresh derived values.
        let mut second = scored("1", "Sustainability Consultant", 64, 78);
        second.visa_confidence = VisaConfidence::Yellow;
        assert!(!db.upsert_posting(&second).unwrap());

        let stored = db.get_posting("adzuna:1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Applied);
        assert_eq!(stored.notes, "Spoke to recruiter.");
        assert!(stored.saved);
        // Derived fields refreshed.
        assert_eq!(stored.match_score, 64);
        assert_eq!(stored.success_probability, 78);
        assert_eq!(stored.visa_confidence, VisaConfidence::Yellow);
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&scored("1", "Sustainability Consultant", 70, 82))
            .unwrap();

        let err = db.set_status("adzuna:1", "reviewing").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid status 'reviewing'"));
        assert!(msg.contains("to_apply"));

        // The row is untouched.
        let stored = db.get_posting("adzuna:1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::New);
    }

    #[test]
    fn test_missing_row_mutations_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.set_status("adzuna:404", "applied").is_err());
        assert!(db.set_notes("adzuna:404", "x").is_err());
        assert!(db.toggle_saved("adzuna:404").is_err());
    }

    #[test]
    fn test_list_filters_and_pagination() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            let p = scored(&i.to_string(), "Sustainability Consultant", 50 + i, 60 + i);
            db.upsert_posting(&p).unwrap();
        }
        db.set_status("adzuna:0", "archived").unwrap();

        let all = db.list_postings(None, None, false, 100, 0).unwrap();
        assert_eq!(all.len(), 5);
        // Highest probability first.
        assert_eq!(all[0].stable_id, "adzuna:4");

        let page = db.list_postings(None, None, false, 2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].stable_id, "adzuna:2");

        let archived = db
            .list_postings(Some(JobStatus::Archived), None, false, 100, 0)
            .unwrap();
        assert_eq!(archived.len(), 1);

        let green = db
            .list_postings(None, Some(VisaConfidence::Green), false, 100, 0)
            .unwrap();
        assert_eq!(green.len(), 5);
    }

    #[test]
    fn test_top_postings_excludes_rejected_and_archived() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&scored("1", "Sustainability Consultant", 70, 82))
            .unwrap();
        db.upsert_posting(&scored("2", "ESG Analyst", 60, 75)).unwrap();
        db.set_status("adzuna:1", "rejected").unwrap();

        let top = db.top_postings(10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].stable_id, "adzuna:2");
    }

    #[test]
    fn test_upsert_many_counts_inserts_and_updates() {
        let db = Database::open_in_memory().unwrap();
        let batch = vec![
            scored("1", "Sustainability Consultant", 70, 82),
            scored("2", "ESG Analyst", 60, 75),
        ];
        let stats = db.upsert_postings(&batch).unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.updated, 0);

        let stats = db.upsert_postings(&batch).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 2);
        assert_eq!(db.count_postings().unwrap(), 2);
    }

    #[test]
    fn test_toggle_saved_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&scored("1", "Sustainability Consultant", 70, 82))
            .unwrap();
        assert!(db.toggle_saved("adzuna:1").unwrap());
        assert!(!db.toggle_saved("adzuna:1").unwrap());
    }

    #[test]
    fn test_tags_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_posting(&scored("1", "Sustainability Consultant", 70, 82))
            .unwrap();
        let stored = db.get_posting("adzuna:1").unwrap().unwrap();
        assert_eq!(stored.tags, vec!["esg"]);
    }
}
