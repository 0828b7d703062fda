use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::error::Result;
use crate::models::{Action, Cue, JobRecord, JobStatus};

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init_db()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init_db()?;
        Ok(storage)
    }

    fn init_db(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY,
                action TEXT NOT NULL,
                source_path TEXT NOT NULL,
                dest_path TEXT NOT NULL,
                status TEXT NOT NULL,
                processing_ms INTEGER NOT NULL,
                message TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transcripts (
                content_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                cues_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY(content_hash, model)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )?;

        Ok(())
    }

    pub fn record_job(&self, job: &JobRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO jobs (action, source_path, dest_path, status, processing_ms, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                job.action.to_string(),
                job.source_path,
                job.dest_path,
                job.status.to_string(),
                job.processing_ms as i64,
                job.message,
                job.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first.
    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, action, source_path, dest_path, status, processing_ms, message, created_at
            FROM jobs
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let jobs = stmt.query_map(params![limit as i64], |row| {
            let action_str: String = row.get(1)?;
            let status_str: String = row.get(4)?;
            let created_at_str: String = row.get(7)?;
            let processing_ms: i64 = row.get(5)?;

            Ok(JobRecord {
                id: Some(row.get(0)?),
                action: action_str.parse().unwrap_or(Action::GenerateSubtitle),
                source_path: row.get(2)?,
                dest_path: row.get(3)?,
                status: match status_str.as_str() {
                    "Succeeded" => JobStatus::Succeeded,
                    _ => JobStatus::Failed,
                },
                processing_ms: processing_ms.max(0) as u64,
                message: row.get(6)?,
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        jobs.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn cached_transcript(&self, content_hash: &str, model: &str) -> Result<Option<Vec<Cue>>> {
        let result = self.conn.query_row(
            "SELECT cues_json FROM transcripts WHERE content_hash = ?1 AND model = ?2",
            params![content_hash, model],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(cues) => Ok(Some(cues)),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable cached transcript {}: {}", content_hash, e);
                    Ok(None)
                }
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_transcript(&self, content_hash: &str, model: &str, cues: &[Cue]) -> Result<()> {
        let cues_json = serde_json::to_string(cues)?;
        self.conn.execute(
            r#"
            INSERT INTO transcripts (content_hash, model, cues_json, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(content_hash, model) DO UPDATE SET
                cues_json = excluded.cues_json,
                created_at = excluded.created_at
            "#,
            params![content_hash, model, cues_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns the number of removed entries.
    pub fn clear_transcripts(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM transcripts", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job(action: Action, status: JobStatus, created_at: DateTime<Utc>) -> JobRecord {
        JobRecord {
            id: None,
            action,
            source_path: "/in/video.mp4".into(),
            dest_path: "/in/video.srt".into(),
            status,
            processing_ms: 1234,
            message: (status == JobStatus::Failed).then(|| "boom".to_string()),
            created_at,
        }
    }

    #[test]
    fn test_record_and_list_jobs() {
        let storage = Storage::in_memory().unwrap();
        let now = Utc::now();
        storage
            .record_job(&job(Action::GenerateSubtitle, JobStatus::Succeeded, now - Duration::minutes(5)))
            .unwrap();
        let id = storage
            .record_job(&job(Action::TranslateSubtitle, JobStatus::Failed, now))
            .unwrap();

        let jobs = storage.recent_jobs(10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, Some(id));
        assert_eq!(jobs[0].action, Action::TranslateSubtitle);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].message.as_deref(), Some("boom"));
        assert_eq!(jobs[1].processing_ms, 1234);

        assert_eq!(storage.recent_jobs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_transcript_cache() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.cached_transcript("abc", "paraformer-v2").unwrap().is_none());

        let cues = vec![Cue::new(1, 0, 1000, "hello")];
        storage.save_transcript("abc", "paraformer-v2", &cues).unwrap();
        assert_eq!(storage.cached_transcript("abc", "paraformer-v2").unwrap(), Some(cues));
        assert!(storage.cached_transcript("abc", "paraformer-v1").unwrap().is_none());

        let updated = vec![Cue::new(1, 0, 2000, "hi")];
        storage.save_transcript("abc", "paraformer-v2", &updated).unwrap();
        assert_eq!(storage.cached_transcript("abc", "paraformer-v2").unwrap(), Some(updated));

        assert_eq!(storage.clear_transcripts().unwrap(), 1);
        assert!(storage.cached_transcript("abc", "paraformer-v2").unwrap().is_none());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let storage = Storage::new(&path).unwrap();
            storage
                .record_job(&job(Action::ExtractAudio, JobStatus::Succeeded, Utc::now()))
                .unwrap();
        }
        let storage = Storage::new(&path).unwrap();
        assert_eq!(storage.recent_jobs(5).unwrap()[0].action, Action::ExtractAudio);
    }
}
