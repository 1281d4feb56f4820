use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    filters::{JobFilter, Page, PageRequest},
    models::{CreateJobPostingRequest, JobPosting, Role, UpdateJobPostingRequest},
};

/// list_jobs
///
/// [Authenticated Route] Job postings, newest first.
#[utoipa::path(
    get,
    path = "/jobs",
    params(JobFilter, PageRequest),
    responses((status = 200, description = "Job postings", body = Page<JobPosting>))
)]
pub async fn list_jobs(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<JobPosting>>> {
    Ok(Json(state.repo.list_jobs(&filter, &page).await?))
}

/// get_job
///
/// [Authenticated Route] Every successful read counts as a view.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(("id" = i64, Path, description = "Job posting id")),
    responses(
        (status = 200, description = "Job posting", body = JobPosting),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_job(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobPosting>> {
    state
        .repo
        .record_job_view(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job posting not found."))
}

/// create_job
///
/// [Company] Publishes a posting owned by the caller. Names are unique (409).
#[utoipa::path(
    post,
    path = "/jobs",
    request_body = CreateJobPostingRequest,
    responses(
        (status = 201, description = "Created", body = JobPosting),
        (status = 403, description = "Not a company"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_job(
    user: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateJobPostingRequest>,
) -> ApiResult<(StatusCode, Json<JobPosting>)> {
    user.require(&[Role::Company])?;
    payload.name = payload.name.trim().to_string();
    if payload.name.is_empty() {
        return Err(ApiError::bad_request("name is required."));
    }
    let job = state.repo.create_job(user.id, payload).await?;
    tracing::info!(job_id = job.id, company = %user.id, "Job posting created");
    Ok((StatusCode::CREATED, Json(job)))
}

/// update_job
///
/// [Owner Company] Partial update.
#[utoipa::path(
    put,
    path = "/jobs/{id}",
    params(("id" = i64, Path, description = "Job posting id")),
    request_body = UpdateJobPostingRequest,
    responses(
        (status = 200, description = "Updated", body = JobPosting),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn update_job(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateJobPostingRequest>,
) -> ApiResult<Json<JobPosting>> {
    user.require(&[Role::Company])?;
    let job = state
        .repo
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job posting not found."))?;
    if job.company_id != user.id {
        return Err(ApiError::forbidden(
            "Only the owning company can edit this posting.",
        ));
    }
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("name must not be blank."));
    }

    state
        .repo
        .update_job(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job posting not found."))
}

/// delete_job
///
/// [Owner Company, Reviewer]
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    params(("id" = i64, Path, description = "Job posting id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_job(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let job = state
        .repo
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job posting not found."))?;

    let owner = user.is(Role::Company) && job.company_id == user.id;
    if !(owner || user.is(Role::Reviewer)) {
        return Err(ApiError::forbidden(
            "Only the owning company or the career office can delete this posting.",
        ));
    }

    if state.repo.delete_job(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Job posting not found."))
    }
}
