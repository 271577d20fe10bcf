use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::jobs::repo::JobStatus;
use crate::state::AppState;

/// Transition rule for postings: anything may follow `pending`, a status
/// may be re-asserted, and terminal states never move otherwise.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    from == JobStatus::Pending || from == to
}

pub struct ResumeUpload {
    pub body: Bytes,
    pub content_type: String,
}

/// Store an applicant's resume under a per-user key and return the durable
/// URL of the object.
pub async fn store_resume(
    st: &AppState,
    user_id: Uuid,
    upload: ResumeUpload,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(&upload.content_type).unwrap_or("bin");
    let key = format!("resumes/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, upload.body, &upload.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(st.storage.object_url(&key))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "text/plain" => Some("txt"),
        _ => None,
    }
}
