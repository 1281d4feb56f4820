use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::templates::EmailTemplates;
use crate::{
    identity::IdentityState,
    mailer::{MailerState, OutgoingEmail},
    models::{CvStatus, DeliveryStatus, NewNotification, NotificationType},
    repository::RepositoryState,
};

const DEFAULT_STUDENT_NAME: &str = "Estudante";

/// Everything needed to notify a student about a review, captured before the CV
/// record may be deleted.
#[derive(Debug, Clone)]
pub struct CvStatusNotice {
    pub cv_id: i64,
    pub student_id: Uuid,
    pub student_name: Option<String>,
    pub status: CvStatus,
    pub feedback: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum NotificationError {
    #[error("invalid status {0}: must be 1 (approved) or 2 (rejected)")]
    InvalidStatus(i16),

    #[error("feedback is required for a rejection")]
    MissingFeedback,
}

/// NotificationOutcome
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub success: bool,
    pub cv_id: i64,
    pub status: String,
    pub email: Option<String>,
    pub message: String,
}

fn outcome_label(status: CvStatus) -> &'static str {
    match status {
        CvStatus::Approved => "Aprovado",
        CvStatus::Rejected => "Rejeitado",
        CvStatus::Pending => "Pendente",
    }
}

/// NotificationService
///
/// Sends the review-outcome email for a CV and records a `Notification` row for every
/// attempt, successful or not. Delivery failures never propagate to the caller; they
/// end up in the record and the returned outcome.
#[derive(Clone)]
pub struct NotificationService {
    repo: RepositoryState,
    identity: IdentityState,
    mailer: MailerState,
    templates: Arc<EmailTemplates>,
    site_url: String,
}

impl NotificationService {
    pub fn new(
        repo: RepositoryState,
        identity: IdentityState,
        mailer: MailerState,
        site_url: &str,
    ) -> Self {
        Self {
            repo,
            identity,
            mailer,
            templates: Arc::new(EmailTemplates::new()),
            site_url: site_url.to_string(),
        }
    }

    /// Checks the payload before any side effect.
    pub fn validate(notice: &CvStatusNotice) -> Result<(), NotificationError> {
        match notice.status {
            CvStatus::Approved => Ok(()),
            CvStatus::Rejected if notice.feedback.trim().is_empty() => {
                Err(NotificationError::MissingFeedback)
            }
            CvStatus::Rejected => Ok(()),
            CvStatus::Pending => Err(NotificationError::InvalidStatus(notice.status.into())),
        }
    }

    /// notify_cv_status
    ///
    /// Resolves the student's email, renders the template for the new status and sends
    /// it. Each exit path writes exactly one notification record.
    pub async fn notify_cv_status(
        &self,
        notice: CvStatusNotice,
    ) -> Result<NotificationOutcome, NotificationError> {
        Self::validate(&notice)?;

        let label = outcome_label(notice.status);
        let name = notice
            .student_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STUDENT_NAME.to_string());

        tracing::info!(cv_id = notice.cv_id, status = label, student = %name, "Sending CV notification");

        let email = match self.identity.get_user_email(notice.student_id).await {
            Ok(email) => email,
            Err(e) => {
                let message = format!("Failed to resolve email: {e}");
                tracing::error!(cv_id = notice.cv_id, error = %e, "Failed to resolve email");
                self.record(&notice, "", format!("CV {label}"), DeliveryStatus::Failed, &message)
                    .await;
                return Ok(self.outcome(&notice, false, None, message));
            }
        };

        let rendered =
            match self
                .templates
                .render(notice.status, &name, &notice.feedback, &self.site_url)
            {
                Ok(rendered) => rendered,
                Err(e) => {
                    let message = format!("Failed to render template: {e}");
                    tracing::error!(cv_id = notice.cv_id, error = %e, "Failed to render template");
                    let subject = EmailTemplates::subject(notice.status)
                        .unwrap_or("CV notification")
                        .to_string();
                    self.record(&notice, &email, subject, DeliveryStatus::Failed, &message)
                        .await;
                    return Ok(self.outcome(&notice, false, Some(email), message));
                }
            };

        let outgoing = OutgoingEmail {
            to: email.clone(),
            subject: rendered.subject.to_string(),
            text: rendered.text,
            html: rendered.html,
        };

        match self.mailer.send(outgoing).await {
            Ok(()) => {
                tracing::info!(cv_id = notice.cv_id, email = %email, status = label, "Email sent");
                self.record(
                    &notice,
                    &email,
                    rendered.subject.to_string(),
                    DeliveryStatus::Sent,
                    "",
                )
                .await;
                Ok(self.outcome(&notice, true, Some(email), "Email sent.".to_string()))
            }
            Err(e) => {
                tracing::error!(cv_id = notice.cv_id, email = %email, error = %e, "Email delivery failed");
                self.record(
                    &notice,
                    &email,
                    rendered.subject.to_string(),
                    DeliveryStatus::Failed,
                    &e.to_string(),
                )
                .await;
                Ok(self.outcome(
                    &notice,
                    false,
                    Some(email),
                    format!("Failed to send email: {e}"),
                ))
            }
        }
    }

    /// dispatch
    ///
    /// Runs `notify_cv_status` on the runtime so the HTTP response does not wait on SMTP.
    pub fn dispatch(&self, notice: CvStatusNotice) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let cv_id = notice.cv_id;
            match service.notify_cv_status(notice).await {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => {
                    tracing::warn!(cv_id, message = %outcome.message, "CV notification not delivered")
                }
                Err(e) => tracing::error!(cv_id, error = %e, "CV notification rejected"),
            }
        })
    }

    async fn record(
        &self,
        notice: &CvStatusNotice,
        email: &str,
        subject: String,
        status: DeliveryStatus,
        error_message: &str,
    ) {
        let entry = NewNotification {
            recipient_user_id: notice.student_id,
            recipient_email: email.to_string(),
            notification_type: NotificationType::CvStatusChange,
            subject,
            status,
            error_message: error_message.to_string(),
            cv_id: Some(notice.cv_id),
        };
        if let Err(e) = self.repo.create_notification(entry).await {
            tracing::error!(cv_id = notice.cv_id, error = %e, "Failed to record notification");
        }
    }

    fn outcome(
        &self,
        notice: &CvStatusNotice,
        success: bool,
        email: Option<String>,
        message: String,
    ) -> NotificationOutcome {
        NotificationOutcome {
            success,
            cv_id: notice.cv_id,
            status: outcome_label(notice.status).to_string(),
            email,
            message,
        }
    }
}
