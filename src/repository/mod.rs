use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::filters::{CvFilter, JobFilter, NotificationFilter, Page, PageRequest, StudentFilter};
use crate::models::{
    Area, CompanyProfile, CreateAreaRequest, CreateJobPostingRequest, Cv, CvAccessLog,
    CvApproval, JobPosting, NewCv, NewCvAccessLog, NewNotification, Notification,
    StudentProfile, UpdateCompanyRequest, UpdateJobPostingRequest, UpdateStudentRequest, User,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The payload points at a row that does not exist (e.g. an unknown area id).
    #[error("{0}")]
    UnknownReference(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers and services only see
/// `Arc<dyn Repository>`, so the Postgres implementation and the in-memory one used by
/// the test-suite are interchangeable.
///
/// Lookups return `Ok(None)` for missing rows; `Err` is reserved for storage failures
/// and constraint violations (`Conflict`).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;

    // --- Areas ---
    async fn list_areas(&self) -> RepoResult<Vec<Area>>;
    async fn get_area(&self, id: i64) -> RepoResult<Option<Area>>;
    async fn create_area(&self, req: CreateAreaRequest) -> RepoResult<Area>;

    // --- Students ---
    /// Filtered, paginated listing. `only_consenting` hides students without data-sharing
    /// consent.
    async fn list_students(
        &self,
        filter: &StudentFilter,
        only_consenting: bool,
        page: &PageRequest,
    ) -> RepoResult<Page<StudentProfile>>;
    async fn get_student(&self, user_id: Uuid) -> RepoResult<Option<StudentProfile>>;
    /// Partial update; creates the student row on first write. `NotFound` when the user
    /// itself does not exist.
    async fn update_student(
        &self,
        user_id: Uuid,
        req: UpdateStudentRequest,
    ) -> RepoResult<StudentProfile>;

    // --- Companies ---
    async fn list_companies(&self, page: &PageRequest) -> RepoResult<Page<CompanyProfile>>;
    async fn get_company(&self, user_id: Uuid) -> RepoResult<Option<CompanyProfile>>;
    async fn update_company(
        &self,
        user_id: Uuid,
        req: UpdateCompanyRequest,
    ) -> RepoResult<CompanyProfile>;

    // --- Job postings ---
    async fn list_jobs(&self, filter: &JobFilter, page: &PageRequest)
    -> RepoResult<Page<JobPosting>>;
    async fn get_job(&self, id: i64) -> RepoResult<Option<JobPosting>>;
    /// Increments `views` and returns the updated posting.
    async fn record_job_view(&self, id: i64) -> RepoResult<Option<JobPosting>>;
    /// `Conflict` when the name is already taken.
    async fn create_job(
        &self,
        company_id: Uuid,
        req: CreateJobPostingRequest,
    ) -> RepoResult<JobPosting>;
    async fn update_job(
        &self,
        id: i64,
        req: UpdateJobPostingRequest,
    ) -> RepoResult<Option<JobPosting>>;
    async fn delete_job(&self, id: i64) -> RepoResult<bool>;

    // --- CVs ---
    async fn list_cvs(&self, filter: &CvFilter, page: &PageRequest) -> RepoResult<Page<Cv>>;
    async fn get_cv(&self, id: i64) -> RepoResult<Option<Cv>>;
    /// All CVs of a student, newest first.
    async fn student_cvs(&self, student_id: Uuid) -> RepoResult<Vec<Cv>>;
    async fn pending_cv(&self, student_id: Uuid) -> RepoResult<Option<Cv>>;
    /// `Conflict` when the student already has a pending CV.
    async fn create_cv(&self, cv: NewCv) -> RepoResult<Cv>;
    /// Points a pending CV at a new file. Returns `None` if the CV is gone or no longer
    /// pending.
    async fn replace_cv_file(
        &self,
        id: i64,
        file_path: &str,
        description: Option<String>,
    ) -> RepoResult<Option<Cv>>;
    /// Marks a pending CV approved and, atomically, deletes every other approved CV of
    /// the same student. `NotFound` / `Conflict` when the CV is missing / not pending.
    async fn approve_cv(&self, id: i64, reviewer_id: Uuid) -> RepoResult<CvApproval>;
    /// Deletes a pending CV and returns it. `NotFound` / `Conflict` as for `approve_cv`.
    async fn reject_cv(&self, id: i64) -> RepoResult<Cv>;
    async fn delete_cv(&self, id: i64) -> RepoResult<Option<Cv>>;

    // --- CV access audit ---
    async fn record_cv_access(&self, entry: NewCvAccessLog) -> RepoResult<CvAccessLog>;
    /// Newest first.
    async fn cv_access_logs(&self, cv_id: i64) -> RepoResult<Vec<CvAccessLog>>;

    // --- Notifications ---
    async fn create_notification(&self, n: NewNotification) -> RepoResult<Notification>;
    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        page: &PageRequest,
    ) -> RepoResult<Page<Notification>>;
    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>>;
    async fn set_notification_read(&self, id: i64, read: bool)
    -> RepoResult<Option<Notification>>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held by the application state.
pub type RepositoryState = Arc<dyn Repository>;
