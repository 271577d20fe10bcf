use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::jobs::repo::{Job, JobStatus, JobWithPoster};

/// Posting submission. Status and applicant count are deliberately not
/// fields here; whatever the caller sends for them is dropped during
/// deserialization and the row starts `pending` with zero applicants.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub message: String,
    pub job: JobRecord,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub status: Option<String>,
}

/// Posting on the wire with the poster as a bare id. Returned by create
/// and by status updates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
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
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            title: job.title,
            description: job.description,
            company: job.company,
            location: job.location,
            salary: job.salary,
            posted_by: job.posted_by,
            posted_date: job.posted_date,
            status: job.status,
            requirements: job.requirements,
            applicants: job.applicants,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostedBy {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Posting on the wire with the poster's identity attached, for listings
/// and the detail view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub posted_by: PostedBy,
    pub posted_date: Date,
    pub status: JobStatus,
    pub requirements: Vec<String>,
    pub applicants: i32,
}

impl From<JobWithPoster> for JobView {
    fn from(row: JobWithPoster) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            company: row.company,
            location: row.location,
            salary: row.salary,
            posted_by: PostedBy {
                id: row.posted_by,
                email: row.poster_email,
            },
            posted_date: row.posted_date,
            status: row.status,
            requirements: row.requirements,
            applicants: row.applicants,
        }
    }
}

/// Administrative index: every posting plus the requester's email.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsIndexResponse {
    pub jobs: Vec<JobView>,
    pub session_user_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicJobsResponse {
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub message: String,
    pub redirect: String,
    pub resume_url: String,
}
