use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use super::notification::{CvStatusNotice, NotificationService};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    filters::{CvFilter, CvListParams, Page, PageRequest},
    models::{
        Cv, CvAccessLog, CvSignedUrlResponse, CvStatus, NewCv, NewCvAccessLog, ReviewCvRequest,
        ReviewOutcome, Role,
    },
    repository::RepositoryState,
    storage::StorageState,
};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const MAX_PATH_LEN: usize = 255;

/// A CV file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct CvUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
}

/// Object key for a new upload: `estudante_<uuid>/cv_<timestamp>.pdf`.
pub fn object_key(student_id: Uuid, at: DateTime<Utc>) -> String {
    format!(
        "estudante_{}/cv_{}.pdf",
        student_id,
        at.format("%Y%m%d%H%M%S%3f")
    )
}

/// CvService
///
/// The résumé workflow: submission, review state machine, removal, signed download URLs
/// and their audit trail. Role gates happen in the handlers; the ownership and
/// visibility rules live here.
#[derive(Clone)]
pub struct CvService {
    repo: RepositoryState,
    storage: StorageState,
    notifications: NotificationService,
    max_bytes: usize,
    signed_url_ttl: Duration,
}

impl CvService {
    pub fn new(
        repo: RepositoryState,
        storage: StorageState,
        notifications: NotificationService,
        max_bytes: usize,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            storage,
            notifications,
            max_bytes,
            signed_url_ttl,
        }
    }

    /// validate_upload
    ///
    /// PDF by extension and (when sent) by content type, non-empty, within the size cap.
    pub fn validate_upload(&self, upload: &CvUpload) -> ApiResult<()> {
        if !upload.filename.to_lowercase().ends_with(".pdf") {
            return Err(ApiError::bad_request("Only PDF files are accepted."));
        }
        if let Some(content_type) = upload.content_type.as_deref() {
            let essence = content_type.split(';').next().unwrap_or_default().trim();
            if !essence.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
                return Err(ApiError::bad_request("Only PDF files are accepted."));
            }
        }
        if upload.bytes.is_empty() {
            return Err(ApiError::bad_request("The uploaded file is empty."));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(ApiError::bad_request(format!(
                "The file exceeds the maximum size of {} bytes.",
                self.max_bytes
            )));
        }
        Ok(())
    }

    /// submit
    ///
    /// Uploads the file and opens a pending CV, or swaps the file of the student's
    /// existing pending CV. Returns the CV and whether a new record was created.
    pub async fn submit(&self, user: &AuthUser, upload: CvUpload) -> ApiResult<(Cv, bool)> {
        let student = self
            .repo
            .get_student(user.id)
            .await?
            .ok_or_else(|| ApiError::not_found("Student profile not found."))?;
        if !student.share_consent {
            return Err(ApiError::bad_request(
                "You must consent to sharing your data before submitting a CV.",
            ));
        }
        self.validate_upload(&upload)?;

        let key = object_key(user.id, Utc::now());
        if key.len() > MAX_PATH_LEN {
            return Err(ApiError::bad_request("The storage path is too long."));
        }

        let stored = self
            .storage
            .upload(&key, upload.bytes, PDF_CONTENT_TYPE)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "CV upload failed");
                e
            })?;

        if let Some(pending) = self.repo.pending_cv(user.id).await? {
            if let Some(cv) = self
                .repo
                .replace_cv_file(pending.id, &stored, upload.description.clone())
                .await?
            {
                if let Some(old) = pending.file_path.filter(|old| *old != stored) {
                    self.remove_file(&old, cv.id).await;
                }
                tracing::info!(cv_id = cv.id, user_id = %user.id, "Pending CV file replaced");
                return Ok((cv, false));
            }
        }

        let new = NewCv {
            student_id: user.id,
            file_path: stored.clone(),
            description: upload.description,
        };
        match self.repo.create_cv(new).await {
            Ok(cv) => {
                tracing::info!(cv_id = cv.id, user_id = %user.id, "CV submitted");
                Ok((cv, true))
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&stored).await {
                    tracing::warn!(key = %stored, error = %cleanup, "Orphaned CV object");
                }
                Err(e.into())
            }
        }
    }

    /// review
    ///
    /// pending -> approved: validated today, older approved CVs removed, student notified.
    /// pending -> rejected: feedback mandatory, student notified, CV and file removed.
    pub async fn review(
        &self,
        cv_id: i64,
        reviewer: &AuthUser,
        req: ReviewCvRequest,
    ) -> ApiResult<ReviewOutcome> {
        let status = match CvStatus::try_from(req.status) {
            Ok(s @ (CvStatus::Approved | CvStatus::Rejected)) => s,
            _ => {
                return Err(ApiError::bad_request(
                    "status must be 1 (approved) or 2 (rejected).",
                ));
            }
        };
        let feedback = req.feedback.trim().to_string();
        if status == CvStatus::Rejected && feedback.is_empty() {
            return Err(ApiError::bad_request("Feedback is required to reject a CV."));
        }

        match status {
            CvStatus::Approved => self.approve(cv_id, reviewer, feedback).await,
            _ => self.reject(cv_id, reviewer, feedback).await,
        }
    }

    async fn approve(
        &self,
        cv_id: i64,
        reviewer: &AuthUser,
        feedback: String,
    ) -> ApiResult<ReviewOutcome> {
        let approval = self.repo.approve_cv(cv_id, reviewer.id).await?;
        let cv = approval.cv;

        for old in &approval.cleared {
            if let Some(path) = &old.file_path {
                self.remove_file(path, old.id).await;
            }
        }
        tracing::info!(
            cv_id,
            reviewer = %reviewer.id,
            cleared = approval.cleared.len(),
            "CV approved"
        );

        self.notify(&cv, feedback).await;

        Ok(ReviewOutcome {
            id: cv.id,
            status: cv.status,
            status_label: cv.status.label().to_string(),
            validated_date: cv.validated_date,
            deleted: false,
        })
    }

    async fn reject(
        &self,
        cv_id: i64,
        reviewer: &AuthUser,
        feedback: String,
    ) -> ApiResult<ReviewOutcome> {
        let cv = self.repo.reject_cv(cv_id).await?;
        tracing::info!(cv_id, reviewer = %reviewer.id, "CV rejected");

        self.notify(&cv, feedback).await;

        if let Some(path) = &cv.file_path {
            self.remove_file(path, cv.id).await;
        }

        Ok(ReviewOutcome {
            id: cv.id,
            status: CvStatus::Rejected,
            status_label: CvStatus::Rejected.label().to_string(),
            validated_date: None,
            deleted: true,
        })
    }

    async fn notify(&self, cv: &Cv, feedback: String) {
        let student_name = match self.repo.get_student(cv.student_id).await {
            Ok(student) => student.and_then(|s| s.name),
            Err(e) => {
                tracing::warn!(cv_id = cv.id, error = %e, "Student lookup failed");
                None
            }
        };
        self.notifications.dispatch(CvStatusNotice {
            cv_id: cv.id,
            student_id: cv.student_id,
            student_name,
            status: cv.status,
            feedback,
        });
    }

    async fn remove_file(&self, path: &str, cv_id: i64) {
        if let Err(e) = self.storage.delete(path).await {
            tracing::warn!(cv_id, key = %path, error = %e, "Failed to delete CV file");
        }
    }

    /// Whether `user` may see `cv`. Companies only see approved CVs of consenting students.
    async fn can_view(&self, user: &AuthUser, cv: &Cv) -> ApiResult<bool> {
        Ok(match user.role {
            Role::Reviewer => true,
            Role::Student => cv.student_id == user.id,
            Role::Company => {
                cv.status == CvStatus::Approved
                    && self
                        .repo
                        .get_student(cv.student_id)
                        .await?
                        .is_some_and(|s| s.share_consent)
            }
        })
    }

    /// Loads a CV the caller is allowed to see: 404 when missing, 403 when hidden.
    pub async fn get(&self, cv_id: i64, user: &AuthUser) -> ApiResult<Cv> {
        let cv = self
            .repo
            .get_cv(cv_id)
            .await?
            .ok_or_else(|| ApiError::not_found("CV not found."))?;
        if !self.can_view(user, &cv).await? {
            return Err(ApiError::forbidden(
                "You do not have permission to access this CV.",
            ));
        }
        Ok(cv)
    }

    /// list
    ///
    /// Reviewers see everything (optionally by status / student); companies only approved
    /// CVs of consenting students; students only their own.
    pub async fn list(
        &self,
        user: &AuthUser,
        params: &CvListParams,
        page: &PageRequest,
    ) -> ApiResult<Page<Cv>> {
        let status = params
            .status
            .map(CvStatus::try_from)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let filter = match user.role {
            Role::Reviewer => CvFilter {
                status,
                student: params.student,
                only_consenting: false,
            },
            Role::Company => CvFilter {
                status: Some(CvStatus::Approved),
                student: params.student,
                only_consenting: true,
            },
            Role::Student => CvFilter {
                status,
                student: Some(user.id),
                only_consenting: false,
            },
        };
        Ok(self.repo.list_cvs(&filter, page).await?)
    }

    pub async fn mine(&self, user: &AuthUser) -> ApiResult<Vec<Cv>> {
        Ok(self.repo.student_cvs(user.id).await?)
    }

    /// delete
    ///
    /// Owner student or reviewer. The stored file goes first so a storage outage leaves
    /// the record in place.
    pub async fn delete(&self, cv_id: i64, user: &AuthUser) -> ApiResult<()> {
        let cv = self
            .repo
            .get_cv(cv_id)
            .await?
            .ok_or_else(|| ApiError::not_found("CV not found."))?;

        let allowed = user.is(Role::Reviewer) || cv.student_id == user.id;
        if !allowed {
            return Err(ApiError::forbidden(
                "You do not have permission to delete this CV.",
            ));
        }

        if let Some(path) = &cv.file_path {
            self.storage.delete(path).await?;
        }
        self.repo.delete_cv(cv_id).await?;
        tracing::info!(cv_id, user_id = %user.id, "CV deleted");
        Ok(())
    }

    /// signed_url
    ///
    /// Issues a time-limited download URL and records who asked for it. A failure to
    /// write the audit row does not block the download.
    pub async fn signed_url(&self, cv_id: i64, user: &AuthUser) -> ApiResult<CvSignedUrlResponse> {
        let cv = self.get(cv_id, user).await?;

        let path = cv.file_path.as_deref().ok_or_else(|| {
            tracing::error!(cv_id, "CV has no file path");
            ApiError::internal("CV file path is not set (data inconsistency).")
        })?;

        let signed_url = self
            .storage
            .signed_url(path, self.signed_url_ttl)
            .await
            .map_err(|e| {
                tracing::error!(cv_id, error = %e, "Signed URL generation failed");
                ApiError::ServiceUnavailable("Could not generate a download URL.".to_string())
            })?;

        let entry = NewCvAccessLog {
            cv_id,
            accessed_by_user_id: user.id,
            accessed_by_role: user.role,
        };
        if let Err(e) = self.repo.record_cv_access(entry).await {
            tracing::warn!(cv_id, error = %e, "Failed to record CV access");
        }

        Ok(CvSignedUrlResponse {
            id: cv.id,
            signed_url,
            status: cv.status,
            status_label: cv.status.label().to_string(),
            validated_date: cv.validated_date,
            expires_in_seconds: self.signed_url_ttl.as_secs(),
        })
    }

    /// Audit trail of a CV: reviewers and the owning student.
    pub async fn access_log(&self, cv_id: i64, user: &AuthUser) -> ApiResult<Vec<CvAccessLog>> {
        let cv = self
            .repo
            .get_cv(cv_id)
            .await?
            .ok_or_else(|| ApiError::not_found("CV not found."))?;
        if !(user.is(Role::Reviewer) || cv.student_id == user.id) {
            return Err(ApiError::forbidden(
                "You do not have permission to view this audit log.",
            ));
        }
        Ok(self.repo.cv_access_logs(cv_id).await?)
    }
}
