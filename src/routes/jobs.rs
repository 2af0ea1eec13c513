use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use uuid::Uuid;

use super::error::ApiError;
use crate::app_state::AppState;
use crate::models::api::{ClearResponse, JobPage, ListJobsQuery, StatsResponse, SubmitResponse};
use crate::models::job::{JobId, JobSummary, NewImage};
use crate::services::export;
use crate::services::scheduler::Scheduler;

/// Multipart field names accepted as images.
const IMAGE_FIELDS: [&str; 2] = ["images", "image"];

struct Upload {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// POST /api/v1/jobs — Upload a batch of images for metadata generation.
///
/// Parts declared as something other than `image/*` are skipped, matching the
/// browser uploader's filter. Parts that claim to be images but cannot be
/// recognised reject the whole batch.
pub async fn submit_jobs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut uploads = Vec::new();
    let mut skipped = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if !field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name)) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image-{}", uploads.len() + skipped.len() + 1));
        let declared_type = field.content_type().map(str::to_string);

        if declared_type
            .as_deref()
            .is_some_and(|content_type| !content_type.starts_with("image/"))
        {
            tracing::debug!(filename = %filename, "Skipping non-image upload");
            skipped.push(filename);
            continue;
        }

        let data = field.bytes().await?;

        // Validate image format using the `image` crate
        let format = image::guess_format(&data)
            .map_err(|_| ApiError::UnsupportedImage(filename.clone()))?;
        let content_type = declared_type.unwrap_or_else(|| format.to_mime_type().to_string());

        uploads.push(Upload {
            filename,
            content_type,
            bytes: data.to_vec(),
        });
    }

    if uploads.is_empty() {
        return Err(ApiError::NoImages);
    }

    // Thumbnail rendering decodes every image; keep it off the async workers.
    let images = tokio::task::spawn_blocking(move || {
        uploads
            .into_iter()
            .map(|upload| NewImage::new(upload.filename, upload.content_type, upload.bytes))
            .collect::<Vec<_>>()
    })
    .await?;

    let jobs = state.scheduler.submit(images);
    let message = if state.scheduler.config().auto_start {
        format!("{} images queued for analysis", jobs.len())
    } else {
        format!("{} images queued; start processing to analyze them", jobs.len())
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            jobs,
            skipped,
            message,
        }),
    ))
}

/// POST /api/v1/jobs/start — Begin analyzing queued images.
pub async fn start_jobs(State(state): State<AppState>) -> Json<StatsResponse> {
    let admitted = state.scheduler.start();
    tracing::info!(admitted, "Processing started");
    Json(stats_response(&state.scheduler))
}

/// GET /api/v1/jobs — One page of jobs in submission order.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobPage>, ApiError> {
    query.validate()?;
    let (offset, per_page) = query.window();

    let all = state.scheduler.jobs();
    let total = all.len();
    let jobs = all.into_iter().skip(offset).take(per_page).collect();

    Ok(Json(JobPage {
        jobs,
        page: query.page(),
        per_page,
        total,
    }))
}

/// GET /api/v1/jobs/{job_id} — Current state of one job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSummary>, ApiError> {
    let job_id = JobId::from(job_id);
    state
        .scheduler
        .job(job_id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(job_id))
}

/// GET /api/v1/jobs/{job_id}/preview — PNG thumbnail.
pub async fn get_preview(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from(job_id);
    if state.scheduler.job(job_id).is_none() {
        return Err(ApiError::JobNotFound(job_id));
    }

    let png = state
        .scheduler
        .preview(job_id)
        .ok_or(ApiError::PreviewNotFound(job_id))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png.to_vec()))
}

/// DELETE /api/v1/jobs — Discard the session.
pub async fn clear_jobs(State(state): State<AppState>) -> Json<ClearResponse> {
    let discarded = state.scheduler.clear();
    Json(ClearResponse { discarded })
}

/// GET /api/v1/stats — Counts per status.
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(stats_response(&state.scheduler))
}

/// GET /api/v1/export.csv — Adobe Stock import file.
pub async fn export_csv(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.scheduler.export_csv();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::export_filename(Utc::now())
    );

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
}

fn stats_response(scheduler: &Scheduler) -> StatsResponse {
    let stats = scheduler.stats();
    StatsResponse {
        stats,
        queue_depth: scheduler.queue_depth(),
        run_state: scheduler.run_state(),
        batch_complete: stats.is_batch_complete(),
    }
}
