use crate::{AppState, handlers::cvs};
use axum::{Router, routing::post};

/// Reviewer Router Module
///
/// Career-office moderation endpoints. `create_router` wraps this router in the
/// `require_reviewer` layer, itself inside the authentication layer, so non-reviewers
/// are turned away with 403 before the handler runs.
pub fn reviewer_routes() -> Router<AppState> {
    Router::new()
        // POST /cvs/{id}/review
        // Moves a pending CV to approved or rejected and notifies the student.
        .route("/cvs/{id}/review", post(cvs::review_cv))
}
