use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    filters::{CvListParams, Page, PageRequest},
    models::{
        Cv, CvAccessLog, CvSignedUrlResponse, CvUploadForm, ReviewCvRequest, ReviewOutcome, Role,
    },
    services::CvUpload,
};

const FILE_FIELD: &str = "cv";
const DESCRIPTION_FIELD: &str = "descricao";

/// list_cvs
///
/// [Authenticated Route] Scope depends on the caller: reviewers see every CV, companies
/// the approved CVs of consenting students, students their own.
#[utoipa::path(
    get,
    path = "/cvs",
    params(CvListParams, PageRequest),
    responses(
        (status = 200, description = "CVs visible to the caller", body = Page<Cv>),
        (status = 400, description = "Unknown status")
    )
)]
pub async fn list_cvs(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CvListParams>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Cv>>> {
    Ok(Json(state.cvs.list(&user, &params, &page).await?))
}

/// my_cvs
///
/// [Student] Own CVs: at most one pending and one approved.
#[utoipa::path(
    get,
    path = "/cvs/me",
    responses(
        (status = 200, description = "Own CVs, newest first", body = [Cv]),
        (status = 403, description = "Not a student")
    )
)]
pub async fn my_cvs(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Vec<Cv>>> {
    user.require(&[Role::Student])?;
    Ok(Json(state.cvs.mine(&user).await?))
}

/// upload_cv
///
/// [Student] Multipart form with the PDF in `cv` and an optional `descricao`.
/// Creates a pending CV (201) or replaces the file of the current pending one (200).
#[utoipa::path(
    post,
    path = "/cvs/me",
    request_body(content = CvUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Pending CV created", body = Cv),
        (status = 200, description = "Pending CV file replaced", body = Cv),
        (status = 400, description = "Missing, empty, oversized or non-PDF file; no consent"),
        (status = 404, description = "No student profile"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn upload_cv(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Cv>)> {
    user.require(&[Role::Student])?;
    let upload = read_upload(multipart).await?;
    let (cv, created) = state.cvs.submit(&user, upload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(cv)))
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<CvUpload> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read file: {e}")))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            Some(DESCRIPTION_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid description: {e}")))?;
                description = Some(text.trim().to_string()).filter(|d| !d.is_empty());
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::bad_request("The `cv` file field is required."))?;
    Ok(CvUpload {
        filename,
        content_type,
        bytes,
        description,
    })
}

/// get_cv
///
/// [Authenticated Route] Same visibility rules as `list_cvs`; hidden CVs are 403.
#[utoipa::path(
    get,
    path = "/cvs/{id}",
    params(("id" = i64, Path, description = "CV id")),
    responses(
        (status = 200, description = "CV", body = Cv),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_cv(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Cv>> {
    Ok(Json(state.cvs.get(id, &user).await?))
}

/// delete_cv
///
/// [Owner Student, Reviewer] Removes the stored PDF and the record.
#[utoipa::path(
    delete,
    path = "/cvs/{id}",
    params(("id" = i64, Path, description = "CV id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn delete_cv(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.cvs.delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_cv_signed_url
///
/// [Authenticated Route] Time-limited download link; every issued link is audited.
#[utoipa::path(
    get,
    path = "/cvs/{id}/signed-url",
    params(("id" = i64, Path, description = "CV id")),
    responses(
        (status = 200, description = "Signed URL", body = CvSignedUrlResponse),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Not found"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_cv_signed_url(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CvSignedUrlResponse>> {
    Ok(Json(state.cvs.signed_url(id, &user).await?))
}

/// review_cv
///
/// [Reviewer Route] Approve (1) or reject (2, feedback required) a pending CV. The
/// student is notified in the background.
#[utoipa::path(
    post,
    path = "/cvs/{id}/review",
    params(("id" = i64, Path, description = "CV id")),
    request_body = ReviewCvRequest,
    responses(
        (status = 200, description = "Review applied", body = ReviewOutcome),
        (status = 400, description = "Invalid status or missing feedback"),
        (status = 403, description = "Not a reviewer"),
        (status = 404, description = "Not found"),
        (status = 409, description = "CV is not pending")
    )
)]
pub async fn review_cv(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewCvRequest>,
) -> ApiResult<Json<ReviewOutcome>> {
    Ok(Json(state.cvs.review(id, &user, payload).await?))
}

/// get_cv_access_log
///
/// [Reviewer, Owner Student] Who downloaded the CV and when.
#[utoipa::path(
    get,
    path = "/cvs/{id}/access-log",
    params(("id" = i64, Path, description = "CV id")),
    responses(
        (status = 200, description = "Download audit trail, newest first", body = [CvAccessLog]),
        (status = 403, description = "Neither reviewer nor owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_cv_access_log(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<CvAccessLog>>> {
    Ok(Json(state.cvs.access_log(id, &user).await?))
}
