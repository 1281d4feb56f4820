use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Integer Tags ---

/// Raised when a stored or submitted tag does not map to a known variant.
#[derive(Debug, Error)]
#[error("invalid {kind}: {value}")]
pub struct InvalidTag {
    pub kind: &'static str,
    pub value: String,
}

/// Role
///
/// The RBAC tag stored on every user: `0` career-office reviewer, `1` company, `2` student.
/// Serialized as the bare integer for compatibility with the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum Role {
    Reviewer,
    Company,
    Student,
}

impl From<Role> for i16 {
    fn from(role: Role) -> i16 {
        match role {
            Role::Reviewer => 0,
            Role::Company => 1,
            Role::Student => 2,
        }
    }
}

impl TryFrom<i16> for Role {
    type Error = InvalidTag;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Reviewer),
            1 => Ok(Role::Company),
            2 => Ok(Role::Student),
            other => Err(InvalidTag {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reviewer => "reviewer",
            Role::Company => "company",
            Role::Student => "student",
        }
    }
}

/// CvStatus
///
/// Review state of a CV. The only transitions are pending -> approved and
/// pending -> rejected; both are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum CvStatus {
    Pending,
    Approved,
    Rejected,
}

impl From<CvStatus> for i16 {
    fn from(status: CvStatus) -> i16 {
        match status {
            CvStatus::Pending => 0,
            CvStatus::Approved => 1,
            CvStatus::Rejected => 2,
        }
    }
}

impl TryFrom<i16> for CvStatus {
    type Error = InvalidTag;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CvStatus::Pending),
            1 => Ok(CvStatus::Approved),
            2 => Ok(CvStatus::Rejected),
            other => Err(InvalidTag {
                kind: "cv status",
                value: other.to_string(),
            }),
        }
    }
}

impl CvStatus {
    /// Label shown to the frontend next to the numeric status.
    pub fn label(&self) -> &'static str {
        match self {
            CvStatus::Pending => "pendente",
            CvStatus::Approved => "aprovado",
            CvStatus::Rejected => "rejeitado",
        }
    }
}

/// Opportunity
///
/// Kind of job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Opportunity {
    Estagio,
    Emprego,
    Projeto,
}

impl Opportunity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opportunity::Estagio => "estagio",
            Opportunity::Emprego => "emprego",
            Opportunity::Projeto => "projeto",
        }
    }
}

impl TryFrom<String> for Opportunity {
    type Error = InvalidTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "estagio" => Ok(Opportunity::Estagio),
            "emprego" => Ok(Opportunity::Emprego),
            "projeto" => Ok(Opportunity::Projeto),
            _ => Err(InvalidTag {
                kind: "opportunity",
                value,
            }),
        }
    }
}

/// NotificationType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NotificationType {
    CvStatusChange,
    CvFeedback,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::CvStatusChange => "cv_status_change",
            NotificationType::CvFeedback => "cv_feedback",
        }
    }
}

impl TryFrom<String> for NotificationType {
    type Error = InvalidTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "cv_status_change" => Ok(NotificationType::CvStatusChange),
            "cv_feedback" => Ok(NotificationType::CvFeedback),
            _ => Err(InvalidTag {
                kind: "notification type",
                value,
            }),
        }
    }
}

/// DeliveryStatus
///
/// Outcome of the delivery attempt recorded on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for DeliveryStatus {
    type Error = InvalidTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(InvalidTag {
                kind: "delivery status",
                value,
            }),
        }
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// Mirror of the identity provider's user, stored in `users`. The `id` is the
/// Supabase auth UUID.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    #[sqlx(try_from = "i16")]
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub role: Role,
}

/// Area
///
/// A field of study / business area used to tag students, companies and job postings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Area {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// StudentProfile
///
/// Student record joined with its user row. `areas` is loaded with a second query.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct StudentProfile {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub age: Option<i32>,
    pub degree: Option<String>,
    pub year: Option<i32>,
    pub availability: Option<String>,
    /// Consent to share profile data and CV with companies.
    pub share_consent: bool,
    #[sqlx(skip)]
    pub areas: Vec<Area>,
}

/// CompanyProfile
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CompanyProfile {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    #[sqlx(skip)]
    pub areas: Vec<Area>,
}

/// JobPosting
///
/// A vacancy (vaga) published by a company. `name` is unique across the platform.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct JobPosting {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub opportunity: Opportunity,
    pub views: i32,
    pub applications: i32,
    pub company_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub areas: Vec<Area>,
}

/// Cv
///
/// A résumé submission. `file_path` is the object key inside the CV bucket.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Cv {
    pub id: i64,
    pub student_id: Uuid,
    pub file_path: Option<String>,
    #[sqlx(try_from = "i16")]
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub status: CvStatus,
    pub description: Option<String>,
    #[ts(type = "string | null")]
    pub validated_date: Option<NaiveDate>,
    pub reviewed_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// CvAccessLog
///
/// Audit trail entry written every time a signed download URL is issued.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct CvAccessLog {
    pub id: Uuid,
    pub cv_id: i64,
    pub accessed_by_user_id: Uuid,
    #[sqlx(try_from = "i16")]
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub accessed_by_role: Role,
    #[ts(type = "string")]
    pub accessed_at: DateTime<Utc>,
}

/// Notification
///
/// Record of a notification sent (or attempted) to a user. `cv_id` is kept even after
/// the CV itself has been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Notification {
    pub id: i64,
    pub recipient_user_id: Uuid,
    pub recipient_email: String,
    // 'type' is a reserved keyword in Rust.
    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub notification_type: NotificationType,
    pub subject: String,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub error_message: String,
    pub read: bool,
    pub cv_id: Option<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Insert Records (Internal) ---

/// NewCv
#[derive(Debug, Clone)]
pub struct NewCv {
    pub student_id: Uuid,
    pub file_path: String,
    pub description: Option<String>,
}

/// NewNotification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_user_id: Uuid,
    pub recipient_email: String,
    pub notification_type: NotificationType,
    pub subject: String,
    pub status: DeliveryStatus,
    pub error_message: String,
    pub cv_id: Option<i64>,
}

/// NewCvAccessLog
#[derive(Debug, Clone)]
pub struct NewCvAccessLog {
    pub cv_id: i64,
    pub accessed_by_user_id: Uuid,
    pub accessed_by_role: Role,
}

/// CvApproval
///
/// Result of an approval: the approved CV plus the previously approved CVs of the same
/// student that were removed, so their stored files can be cleaned up.
#[derive(Debug, Clone)]
pub struct CvApproval {
    pub cv: Cv,
    pub cleared: Vec<Cv>,
}

// --- Request Payloads (Input Schemas) ---

/// CreateAreaRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateAreaRequest {
    pub name: String,
    pub description: Option<String>,
}

/// UpdateStudentRequest
///
/// Partial update of the authenticated student's profile. `area_ids`, when present,
/// replaces the full set of areas.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStudentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_consent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_ids: Option<Vec<i64>>,
}

/// UpdateCompanyRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCompanyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_ids: Option<Vec<i64>>,
}

/// CreateJobPostingRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateJobPostingRequest {
    pub name: String,
    pub description: Option<String>,
    pub opportunity: Opportunity,
    #[serde(default)]
    pub area_ids: Vec<i64>,
}

/// UpdateJobPostingRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateJobPostingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity: Option<Opportunity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_ids: Option<Vec<i64>>,
}

/// ReviewCvRequest
///
/// Reviewer decision on a pending CV. `status` is `1` (approve) or `2` (reject);
/// `feedback` is mandatory for a rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewCvRequest {
    pub status: i16,
    #[serde(default)]
    pub feedback: String,
}

/// MarkNotificationRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MarkNotificationRequest {
    pub read: bool,
}

/// CvUploadForm
///
/// Multipart body of `POST /cvs/me`; documented for OpenAPI only, the handler reads the
/// fields from the stream.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct CvUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub cv: Vec<u8>,
    pub descricao: Option<String>,
}

// --- Output Schemas ---

/// MeResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MeResponse {
    pub id: Uuid,
    pub name: Option<String>,
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub role: Role,
    pub role_name: String,
}

/// CvSignedUrlResponse
///
/// A time-limited download URL for a CV plus the metadata the frontend displays with it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CvSignedUrlResponse {
    pub id: i64,
    pub signed_url: String,
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub status: CvStatus,
    pub status_label: String,
    #[ts(type = "string | null")]
    pub validated_date: Option<NaiveDate>,
    pub expires_in_seconds: u64,
}

/// ReviewOutcome
///
/// Response of `POST /cvs/{id}/review`. After a rejection the CV no longer exists,
/// so only the id and the final status are reported.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewOutcome {
    pub id: i64,
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub status: CvStatus,
    pub status_label: String,
    #[ts(type = "string | null")]
    pub validated_date: Option<NaiveDate>,
    pub deleted: bool,
}
