use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::screening::models::{
    Author, CandidateEvaluation, CriteriaMatrix, Report, ReportSummary,
};

/// A persisted report and its record id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub id: Uuid,
    pub report: Report,
}

/// Metadata store for generated reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, report: &Report) -> Result<Uuid, sqlx::Error>;

    /// Newest first. `author_email` restricts the listing to one author.
    async fn list(&self, author_email: Option<&str>) -> Result<Vec<StoredReport>, sqlx::Error>;

    async fn get(&self, id: Uuid) -> Result<Option<StoredReport>, sqlx::Error>;

    /// Returns false when no record had this id.
    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}

/// Fixed-width RFC 3339 in UTC, so lexical order is chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    jd_filename: String,
    cv_filenames: Vec<String>,
    generated_by_email: String,
    generated_by_name: Option<String>,
    timestamp: String,
    candidate_evaluations: Json<Vec<CandidateEvaluation>>,
    criteria_matrix: Json<CriteriaMatrix>,
    summary: Json<ReportSummary>,
    storage_file_id: Option<String>,
}

impl TryFrom<ReportRow> for StoredReport {
    type Error = sqlx::Error;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let created_at =
            parse_timestamp(&row.timestamp).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(StoredReport {
            id: row.id,
            report: Report {
                jd_filename: row.jd_filename,
                cv_filenames: row.cv_filenames,
                author: Author {
                    email: row.generated_by_email,
                    display_name: row.generated_by_name,
                },
                created_at,
                evaluations: row.candidate_evaluations.0,
                criteria_matrix: row.criteria_matrix.0,
                summary: row.summary.0,
                storage_file_id: row.storage_file_id,
            },
        })
    }
}

const SELECT_REPORTS: &str = r#"
    SELECT id, jd_filename, cv_filenames, generated_by_email, generated_by_name,
           timestamp, candidate_evaluations, criteria_matrix, summary, storage_file_id
    FROM reports
"#;

#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn insert(&self, report: &Report) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO reports
                (id, jd_filename, cv_filenames, generated_by_email, generated_by_name,
                 timestamp, candidate_evaluations, criteria_matrix, summary, storage_file_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&report.jd_filename)
        .bind(&report.cv_filenames)
        .bind(&report.author.email)
        .bind(&report.author.display_name)
        .bind(format_timestamp(&report.created_at))
        .bind(Json(&report.evaluations))
        .bind(Json(&report.criteria_matrix))
        .bind(Json(&report.summary))
        .bind(&report.storage_file_id)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn list(&self, author_email: Option<&str>) -> Result<Vec<StoredReport>, sqlx::Error> {
        let rows: Vec<ReportRow> = match author_email {
            Some(email) => {
                let sql =
                    format!("{SELECT_REPORTS} WHERE generated_by_email = $1 ORDER BY timestamp DESC");
                sqlx::query_as(&sql).bind(email).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("{SELECT_REPORTS} ORDER BY timestamp DESC");
                sqlx::query_as(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.into_iter().map(StoredReport::try_from).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredReport>, sqlx::Error> {
        let sql = format!("{SELECT_REPORTS} WHERE id = $1");
        let row: Option<ReportRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StoredReport::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_fixed_width_and_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 3, 9, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(123_456);

        let a = format_timestamp(&early);
        let b = format_timestamp(&late);
        assert_eq!(a, "2024-03-09T09:00:00.000000Z");
        assert_eq!(b, "2024-03-09T14:05:07.123456Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_timestamp_parses_back() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
