use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{Area, CreateAreaRequest, Role},
};

/// list_areas
///
/// [Authenticated Route] Every area, alphabetical.
#[utoipa::path(
    get,
    path = "/areas",
    responses((status = 200, description = "All areas", body = [Area]))
)]
pub async fn list_areas(
    _user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Area>>> {
    Ok(Json(state.repo.list_areas().await?))
}

/// get_area
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/areas/{id}",
    params(("id" = i64, Path, description = "Area id")),
    responses(
        (status = 200, description = "Area", body = Area),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_area(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Area>> {
    state
        .repo
        .get_area(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Area not found."))
}

/// create_area
///
/// [Reviewer] Areas are curated by the career office.
#[utoipa::path(
    post,
    path = "/areas",
    request_body = CreateAreaRequest,
    responses(
        (status = 201, description = "Created", body = Area),
        (status = 400, description = "Blank name"),
        (status = 403, description = "Not a reviewer")
    )
)]
pub async fn create_area(
    user: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateAreaRequest>,
) -> ApiResult<(StatusCode, Json<Area>)> {
    user.require(&[Role::Reviewer])?;
    payload.name = payload.name.trim().to_string();
    if payload.name.is_empty() {
        return Err(ApiError::bad_request("name is required."));
    }
    let area = state.repo.create_area(payload).await?;
    Ok((StatusCode::CREATED, Json(area)))
}
