use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    filters::{NotificationFilter, NotificationParams, Page, PageRequest},
    models::{MarkNotificationRequest, Notification, Role},
};

/// list_notifications
///
/// [Student, Reviewer] Students only ever see their own notifications; reviewers see all
/// of them and may narrow down with `student`. Companies receive none (403).
#[utoipa::path(
    get,
    path = "/notifications",
    params(NotificationParams, PageRequest),
    responses(
        (status = 200, description = "Notifications", body = Page<Notification>),
        (status = 403, description = "Companies have no notifications")
    )
)]
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationParams>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Notification>>> {
    user.require(&[Role::Student, Role::Reviewer])?;
    let recipient = match user.role {
        Role::Student => Some(user.id),
        _ => params.student,
    };
    let filter = NotificationFilter::from_params(&params, recipient);
    Ok(Json(state.repo.list_notifications(&filter, &page).await?))
}

/// mark_notification
///
/// [Student, Reviewer] Sets the `read` flag. Another student's notification is reported
/// as missing.
#[utoipa::path(
    patch,
    path = "/notifications/{id}",
    params(("id" = i64, Path, description = "Notification id")),
    request_body = MarkNotificationRequest,
    responses(
        (status = 200, description = "Updated", body = Notification),
        (status = 403, description = "Companies have no notifications"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_notification(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<MarkNotificationRequest>,
) -> ApiResult<Json<Notification>> {
    user.require(&[Role::Student, Role::Reviewer])?;

    state
        .repo
        .get_notification(id)
        .await?
        .filter(|n| !user.is(Role::Student) || n.recipient_user_id == user.id)
        .ok_or_else(|| ApiError::not_found("Notification not found."))?;

    state
        .repo
        .set_notification_read(id, payload.read)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Notification not found."))
}
