use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::{Actor, Capability, CurrentUser},
    error::ApiError,
    jobs::{
        dto::{
            ApplyResponse, CreateJobRequest, CreateJobResponse, JobRecord, JobView,
            JobsIndexResponse, PublicJobsResponse, UpdateJobStatusRequest,
        },
        repo::{Job, JobStatus, NewJob},
        services::{can_transition, store_resume, ResumeUpload},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/public", get(list_public_jobs))
        .route(
            "/jobs/apply",
            post(apply).layer(DefaultBodyLimit::max(10 * 1024 * 1024)), // 10MB
        )
        .route("/jobs/:id", get(get_job).patch(update_job_status))
}

#[instrument(skip(state, user, payload))]
pub async fn create_job(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    Actor::of(&user).require(Capability::CreateJob)?;

    let (Some(title), Some(description), Some(company), Some(location), Some(salary)) = (
        required(&payload.title),
        required(&payload.description),
        required(&payload.company),
        required(&payload.location),
        required(&payload.salary),
    ) else {
        warn!(user_id = %user.id, "job submission with missing fields");
        return Err(ApiError::Validation("All job fields are required".into()));
    };

    let new = NewJob {
        title,
        description,
        company,
        location,
        salary,
        posted_by: user.id,
        requirements: &payload.requirements,
    };
    let job = Job::create(&state.db, &new).await?;

    info!(job_id = %job.id, user_id = %user.id, "job posted");
    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            message: "Job posted successfully".into(),
            job: job.into(),
        }),
    ))
}

/// Approve or reject a posting. The conditional update enforces the
/// transition rule even under concurrent requests; a no-op update is then
/// told apart from an unknown id by a re-read.
#[instrument(skip(state, user, payload))]
pub async fn update_job_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJobStatusRequest>,
) -> Result<Json<JobRecord>, ApiError> {
    Actor::of(&user).require(Capability::TransitionJobStatus)?;

    let Some(status) = payload.status.as_deref().and_then(JobStatus::parse) else {
        warn!(job_id = %id, "status update with invalid status");
        return Err(ApiError::Validation("Invalid status".into()));
    };

    let Some(job) = Job::set_status(&state.db, id, status).await? else {
        return match Job::find(&state.db, id).await? {
            None => {
                warn!(job_id = %id, "job not found");
                Err(ApiError::NotFound("Job not found".into()))
            }
            // The same transition landed concurrently; report the final state.
            Some(job) if can_transition(job.status, status) => Ok(Json(job.into())),
            Some(job) => {
                warn!(job_id = %id, from = ?job.status, to = ?status, "transition denied");
                Err(ApiError::Conflict("Job status can no longer be changed".into()))
            }
        };
    };

    info!(job_id = %job.id, status = ?status, admin_id = %user.id, "job status updated");
    Ok(Json(job.into()))
}

/// Administrative index: every posting with the poster's email, plus the
/// requesting user's email for the client session header.
#[instrument(skip(state, user))]
pub async fn list_jobs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<JobsIndexResponse>, ApiError> {
    let rows = Job::list_all(&state.db).await?;
    Ok(Json(JobsIndexResponse {
        jobs: rows.into_iter().map(JobView::from).collect(),
        session_user_email: user.email,
    }))
}

#[instrument(skip(state))]
pub async fn list_public_jobs(
    State(state): State<AppState>,
) -> Result<Json<PublicJobsResponse>, ApiError> {
    let rows = Job::list_approved(&state.db).await?;
    Ok(Json(PublicJobsResponse {
        jobs: rows.into_iter().map(JobView::from).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let Some(row) = Job::find_with_poster(&state.db, id).await? else {
        warn!(job_id = %id, "job not found");
        return Err(ApiError::NotFound("Job not found".into()));
    };
    Ok(Json(row.into()))
}

/// POST /jobs/apply (multipart). Takes the `resume` file field, stores it
/// synchronously and returns the durable URL. No retry on upload failure.
#[instrument(skip(state, user, mp))]
pub async fn apply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut mp: Multipart,
) -> Result<Json<ApplyResponse>, ApiError> {
    let mut resume: Option<ResumeUpload> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("resume") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            if let Ok(body) = field.bytes().await {
                resume = Some(ResumeUpload { body, content_type });
            }
        }
    }

    let Some(upload) = resume else {
        warn!(user_id = %user.id, "application without resume file");
        return Err(ApiError::Validation("Resume is required".into()));
    };

    let resume_url = store_resume(&state, user.id, upload).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "resume upload failed");
        ApiError::Upstream("Failed to upload resume".into())
    })?;

    info!(user_id = %user.id, "application submitted");
    Ok(Json(ApplyResponse {
        message: "Application submitted successfully".into(),
        redirect: "/".into(),
        resume_url,
    }))
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_missing_and_blank_fields() {
        assert_eq!(required(&None), None);
        assert_eq!(required(&Some("".into())), None);
        assert_eq!(required(&Some("   ".into())), None);
        assert_eq!(required(&Some("  Berlin ".into())), Some("Berlin"));
    }
}
