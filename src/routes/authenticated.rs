use crate::{
    AppState,
    handlers::{areas, cvs, jobs, notifications, profiles},
};
use axum::{
    Router,
    routing::{get, patch},
};

/// Authenticated Router Module
///
/// Every route here runs after the `auth_middleware` layer, so handlers always receive a
/// resolved `AuthUser`. Role and ownership checks happen inside the handlers and the
/// CV service.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(profiles::get_me))
        // --- Areas ---
        // POST /areas is reviewer-only, checked in the handler.
        .route("/areas", get(areas::list_areas).post(areas::create_area))
        .route("/areas/{id}", get(areas::get_area))
        // --- Profiles ---
        // GET /students
        // Reviewers and companies; companies only see consenting students.
        .route("/students", get(profiles::list_students))
        .route(
            "/students/me",
            get(profiles::get_my_student).put(profiles::update_my_student),
        )
        .route("/students/{id}", get(profiles::get_student))
        .route("/companies", get(profiles::list_companies))
        .route(
            "/companies/me",
            get(profiles::get_my_company).put(profiles::update_my_company),
        )
        .route("/companies/{id}", get(profiles::get_company))
        // --- Job Postings ---
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        // GET /jobs/{id} counts a view on every read.
        .route(
            "/jobs/{id}",
            get(jobs::get_job)
                .put(jobs::update_job)
                .delete(jobs::delete_job),
        )
        // --- CVs ---
        .route("/cvs", get(cvs::list_cvs))
        // POST /cvs/me
        // Multipart upload; the body limit is raised for the whole router in `create_router`.
        .route("/cvs/me", get(cvs::my_cvs).post(cvs::upload_cv))
        .route("/cvs/{id}", get(cvs::get_cv).delete(cvs::delete_cv))
        // GET /cvs/{id}/signed-url
        // Issues a short-lived download link and writes an access-log row.
        .route("/cvs/{id}/signed-url", get(cvs::get_cv_signed_url))
        .route("/cvs/{id}/access-log", get(cvs::get_cv_access_log))
        // --- Notifications ---
        // Other methods on these paths fall through to 405.
        .route(
            "/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/notifications/{id}",
            patch(notifications::mark_notification),
        )
}
