use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Approval state of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Approved,
    Rejected,
}

impl JobStatus {
    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "approved" => Some(JobStatus::Approved),
            "rejected" => Some(JobStatus::Rejected),
            _ => None,
        }
    }
}

/// Job posting as stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub posted_by: Uuid,
    pub posted_date: Date,
    pub status: JobStatus,
    pub requirements: Vec<String>,
    pub applicants: i32,
    pub created_at: OffsetDateTime,
}

/// Posting joined with the poster's email for listings.
#[derive(Debug, Clone, FromRow)]
pub struct JobWithPoster {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub posted_by: Uuid,
    pub posted_date: Date,
    pub status: JobStatus,
    pub requirements: Vec<String>,
    pub applicants: i32,
    pub poster_email: Option<String>,
}

#[derive(Debug)]
pub struct NewJob<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub salary: &'a str,
    pub posted_by: Uuid,
    pub requirements: &'a [String],
}

impl Job {
    /// Insert a posting. Status and applicant count are not parameters, so
    /// a caller-supplied value can never reach the row: every posting
    /// starts `pending` with zero applicants.
    pub async fn create(db: &PgPool, new: &NewJob<'_>) -> sqlx::Result<Job> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (title, description, company, location, salary, posted_by, requirements)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, title, description, company, location, salary, posted_by,
                      posted_date, status, requirements, applicants, created_at
            "#,
        )
        .bind(new.title)
        .bind(new.description)
        .bind(new.company)
        .bind(new.location)
        .bind(new.salary)
        .bind(new.posted_by)
        .bind(new.requirements)
        .fetch_one(db)
        .await
    }

    pub async fn find(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, title, description, company, location, salary, posted_by,
                   posted_date, status, requirements, applicants, created_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_with_poster(db: &PgPool, id: Uuid) -> sqlx::Result<Option<JobWithPoster>> {
        sqlx::query_as::<_, JobWithPoster>(
            r#"
            SELECT j.id, j.title, j.description, j.company, j.location, j.salary,
                   j.posted_by, j.posted_date, j.status, j.requirements, j.applicants,
                   u.email AS poster_email
            FROM jobs j
            JOIN users u ON u.id = j.posted_by
            WHERE j.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Every posting regardless of status, newest first. Administrative view.
    pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<JobWithPoster>> {
        sqlx::query_as::<_, JobWithPoster>(
            r#"
            SELECT j.id, j.title, j.description, j.company, j.location, j.salary,
                   j.posted_by, j.posted_date, j.status, j.requirements, j.applicants,
                   u.email AS poster_email
            FROM jobs j
            JOIN users u ON u.id = j.posted_by
            ORDER BY j.posted_date DESC, j.created_at DESC
            "#,
        )
        .fetch_all(db)
        .await
    }

    /// Approved postings only, newest first. Public view; the filter runs
    /// here, not in the client.
    pub async fn list_approved(db: &PgPool) -> sqlx::Result<Vec<JobWithPoster>> {
        sqlx::query_as::<_, JobWithPoster>(
            r#"
            SELECT j.id, j.title, j.description, j.company, j.location, j.salary,
                   j.posted_by, j.posted_date, j.status, j.requirements, j.applicants,
                   u.email AS poster_email
            FROM jobs j
            JOIN users u ON u.id = j.posted_by
            WHERE j.status = 'approved'
            ORDER BY j.posted_date DESC, j.created_at DESC
            "#,
        )
        .fetch_all(db)
        .await
    }

    /// Apply a status transition. The WHERE clause carries the rule: a
    /// posting moves out of `pending` or re-asserts its current status,
    /// nothing else. Returns None when no row qualified, which the caller
    /// disambiguates into not-found versus a denied transition.
    pub async fn set_status(db: &PgPool, id: Uuid, status: JobStatus) -> sqlx::Result<Option<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2
            WHERE id = $1 AND (status = 'pending' OR status = $2)
            RETURNING id, title, description, company, location, salary, posted_by,
                      posted_date, status, requirements, applicants, created_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            r#""pending""#
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Approved).unwrap(),
            r#""approved""#
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Rejected).unwrap(),
            r#""rejected""#
        );
    }

    #[test]
    fn job_status_parse_accepts_known_values_only() {
        assert_eq!(JobStatus::parse("pending"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::parse("approved"), Some(JobStatus::Approved));
        assert_eq!(JobStatus::parse("rejected"), Some(JobStatus::Rejected));
        assert_eq!(JobStatus::parse("Approved"), None);
        assert_eq!(JobStatus::parse("archived"), None);
        assert_eq!(JobStatus::parse(""), None);
    }
}
