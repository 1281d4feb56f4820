use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    filters::{Page, PageRequest, StudentFilter},
    models::{
        CompanyProfile, MeResponse, Role, StudentProfile, UpdateCompanyRequest,
        UpdateStudentRequest,
    },
};

/// get_me
///
/// [Authenticated Route] The caller's identity and role. The role always comes from the
/// identity service; the name from the local mirror when present.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Missing or unknown X-User-ID")
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<MeResponse>> {
    let stored = state.repo.get_user(user.id).await?;
    Ok(Json(MeResponse {
        id: user.id,
        name: stored.and_then(|u| u.name),
        role: user.role,
        role_name: user.role.as_str().to_string(),
    }))
}

/// list_students
///
/// [Reviewer, Company] Filtered student directory. Companies only see students who
/// consented to share their data.
#[utoipa::path(
    get,
    path = "/students",
    params(StudentFilter, PageRequest),
    responses(
        (status = 200, description = "Students", body = Page<StudentProfile>),
        (status = 403, description = "Students cannot browse other students")
    )
)]
pub async fn list_students(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<StudentFilter>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<StudentProfile>>> {
    user.require(&[Role::Reviewer, Role::Company])?;
    let only_consenting = user.is(Role::Company);
    let students = state
        .repo
        .list_students(&filter, only_consenting, &page)
        .await?;
    Ok(Json(students))
}

/// get_my_student
///
/// [Student] The caller's own profile, consent flag included.
#[utoipa::path(
    get,
    path = "/students/me",
    responses(
        (status = 200, description = "Own student profile", body = StudentProfile),
        (status = 404, description = "No student profile yet")
    )
)]
pub async fn get_my_student(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<StudentProfile>> {
    user.require(&[Role::Student])?;
    state
        .repo
        .get_student(user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Student profile not found."))
}

/// update_my_student
///
/// [Student] Partial update of the caller's profile; `area_ids` replaces the area set.
#[utoipa::path(
    put,
    path = "/students/me",
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Updated", body = StudentProfile),
        (status = 400, description = "Invalid values or unknown area")
    )
)]
pub async fn update_my_student(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateStudentRequest>,
) -> ApiResult<Json<StudentProfile>> {
    user.require(&[Role::Student])?;
    if payload.age.is_some_and(|age| age < 0) {
        return Err(ApiError::bad_request("age must not be negative."));
    }
    if payload.year.is_some_and(|year| year < 1) {
        return Err(ApiError::bad_request("year must be at least 1."));
    }
    let student = state.repo.update_student(user.id, payload).await?;
    Ok(Json(student))
}

/// get_student
///
/// [Reviewer, Company, Self] Companies get 404 for students without consent.
#[utoipa::path(
    get,
    path = "/students/{id}",
    params(("id" = Uuid, Path, description = "Student user id")),
    responses(
        (status = 200, description = "Student", body = StudentProfile),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_student(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StudentProfile>> {
    if user.is(Role::Student) && user.id != id {
        return Err(ApiError::forbidden(
            "Students can only view their own profile.",
        ));
    }
    let student = state
        .repo
        .get_student(id)
        .await?
        .filter(|s| !user.is(Role::Company) || s.share_consent)
        .ok_or_else(|| ApiError::not_found("Student not found."))?;
    Ok(Json(student))
}

/// list_companies
///
/// [Authenticated Route] Company directory, paginated.
#[utoipa::path(
    get,
    path = "/companies",
    params(PageRequest),
    responses((status = 200, description = "Companies", body = Page<CompanyProfile>))
)]
pub async fn list_companies(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<CompanyProfile>>> {
    Ok(Json(state.repo.list_companies(&page).await?))
}

/// get_my_company
///
/// [Company]
#[utoipa::path(
    get,
    path = "/companies/me",
    responses(
        (status = 200, description = "Own company profile", body = CompanyProfile),
        (status = 404, description = "No company profile yet")
    )
)]
pub async fn get_my_company(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<CompanyProfile>> {
    user.require(&[Role::Company])?;
    state
        .repo
        .get_company(user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Company profile not found."))
}

/// update_my_company
///
/// [Company] Partial update; `area_ids` replaces the area set.
#[utoipa::path(
    put,
    path = "/companies/me",
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Updated", body = CompanyProfile),
        (status = 400, description = "Unknown area")
    )
)]
pub async fn update_my_company(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<CompanyProfile>> {
    user.require(&[Role::Company])?;
    Ok(Json(state.repo.update_company(user.id, payload).await?))
}

/// get_company
///
/// [Authenticated Route] Public company profile.
#[utoipa::path(
    get,
    path = "/companies/{id}",
    params(("id" = Uuid, Path, description = "Company user id")),
    responses(
        (status = 200, description = "Company", body = CompanyProfile),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_company(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CompanyProfile>> {
    state
        .repo
        .get_company(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Company not found."))
}
