use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::{
    Cv, CvStatus, DeliveryStatus, JobPosting, Notification, NotificationType, Opportunity,
    StudentProfile,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// --- Pagination ---

/// PageRequest
///
/// `?page=&page_size=` query parameters. Page numbers start at 1; the size is clamped
/// to `MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Some(1),
            page_size: Some(DEFAULT_PAGE_SIZE),
        }
    }
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip, widened so far-away pages cannot overflow.
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1).saturating_mul(i64::from(self.limit()))
    }

    /// Applies the window to an already filtered and ordered list.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(self.limit() as usize)
            .collect()
    }
}

/// Page
///
/// Paginated list envelope: total `count`, neighbouring page numbers and the rows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, request: &PageRequest) -> Self {
        let page = request.page();
        let seen = request.offset().saturating_add(results.len() as i64);
        Self {
            count,
            next: page.checked_add(1).filter(|_| seen < count),
            previous: (page > 1).then_some(page - 1),
            results,
        }
    }
}

/// Splits a comma-separated query value, dropping blanks.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn eq_ignore_case(a: Option<&str>, b: &str) -> bool {
    a.is_some_and(|a| a.to_lowercase() == b.to_lowercase())
}

// --- Students ---

/// StudentFilter
///
/// Query parameters of `GET /students`. The wire names follow the frontend's
/// Portuguese vocabulary.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentFilter {
    /// Degree, case-insensitive exact match.
    #[serde(rename = "grau")]
    pub degree: Option<String>,
    /// Comma-separated degrees, any of them (case-insensitive).
    #[serde(rename = "grau_in")]
    pub degree_in: Option<String>,
    /// Minimum academic year (inclusive).
    #[serde(rename = "ano_min")]
    pub year_min: Option<i32>,
    /// Maximum academic year (inclusive).
    #[serde(rename = "ano_max")]
    pub year_max: Option<i32>,
    /// Availability (estagio, emprego, projeto...), case-insensitive.
    #[serde(rename = "disponibilidade")]
    pub availability: Option<String>,
    /// Comma-separated availabilities.
    #[serde(rename = "disponibilidade_in")]
    pub availability_in: Option<String>,
    /// Area id the student is tagged with.
    pub area: Option<i64>,
    /// Substring of an area name, case-insensitive.
    #[serde(rename = "area_nome")]
    pub area_name: Option<String>,
}

impl StudentFilter {
    pub fn degrees(&self) -> Vec<String> {
        self.degree_in.as_deref().map(split_csv).unwrap_or_default()
    }

    pub fn availabilities(&self) -> Vec<String> {
        self.availability_in
            .as_deref()
            .map(split_csv)
            .unwrap_or_default()
    }

    pub fn matches(&self, student: &StudentProfile) -> bool {
        if let Some(degree) = self.degree.as_deref().filter(|v| !v.is_empty()) {
            if !eq_ignore_case(student.degree.as_deref(), degree) {
                return false;
            }
        }
        let degrees = self.degrees();
        if !degrees.is_empty()
            && !degrees
                .iter()
                .any(|d| eq_ignore_case(student.degree.as_deref(), d))
        {
            return false;
        }
        if let Some(min) = self.year_min {
            if student.year.is_none_or(|y| y < min) {
                return false;
            }
        }
        if let Some(max) = self.year_max {
            if student.year.is_none_or(|y| y > max) {
                return false;
            }
        }
        if let Some(availability) = self.availability.as_deref().filter(|v| !v.is_empty()) {
            if !eq_ignore_case(student.availability.as_deref(), availability) {
                return false;
            }
        }
        let availabilities = self.availabilities();
        if !availabilities.is_empty()
            && !availabilities
                .iter()
                .any(|a| eq_ignore_case(student.availability.as_deref(), a))
        {
            return false;
        }
        if let Some(area) = self.area {
            if !student.areas.iter().any(|a| a.id == area) {
                return false;
            }
        }
        if let Some(name) = self.area_name.as_deref().filter(|v| !v.is_empty()) {
            let needle = name.to_lowercase();
            if !student
                .areas
                .iter()
                .any(|a| a.name.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

// --- Job Postings ---

/// JobFilter
///
/// Query parameters of `GET /jobs`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobFilter {
    #[serde(rename = "oportunidade")]
    pub opportunity: Option<Opportunity>,
    pub area: Option<i64>,
    /// Company (user id) that published the posting.
    #[serde(rename = "empresa")]
    pub company: Option<Uuid>,
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &JobPosting) -> bool {
        if self.opportunity.is_some_and(|o| o != job.opportunity) {
            return false;
        }
        if self.company.is_some_and(|c| c != job.company_id) {
            return false;
        }
        if let Some(area) = self.area {
            if !job.areas.iter().any(|a| a.id == area) {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = job.name.to_lowercase().contains(&needle);
            let in_description = job
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

// --- CVs ---

/// CvListParams
///
/// Query parameters of `GET /cvs` as sent by the client.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CvListParams {
    /// 0 pending, 1 approved, 2 rejected.
    pub status: Option<i16>,
    /// Student user id (reviewers only).
    pub student: Option<Uuid>,
}

/// CvFilter
///
/// Resolved CV listing scope, after the caller's role has been applied.
#[derive(Debug, Clone, Default)]
pub struct CvFilter {
    pub status: Option<CvStatus>,
    pub student: Option<Uuid>,
    /// Restrict to students that consented to share their data.
    pub only_consenting: bool,
}

impl CvFilter {
    pub fn matches(&self, cv: &Cv, student_consents: bool) -> bool {
        self.status.is_none_or(|s| s == cv.status)
            && self.student.is_none_or(|s| s == cv.student_id)
            && (!self.only_consenting || student_consents)
    }
}

// --- Notifications ---

/// NotificationParams
///
/// Query parameters of `GET /notifications` as sent by the client.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationParams {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub status: Option<DeliveryStatus>,
    pub read: Option<bool>,
    /// Inclusive lower bound on the creation date (YYYY-MM-DD).
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date (YYYY-MM-DD).
    pub date_to: Option<NaiveDate>,
    /// Recipient user id (reviewers only).
    pub student: Option<Uuid>,
    /// `created_at` or `-created_at` (default).
    pub ordering: Option<String>,
}

/// NotificationFilter
///
/// Resolved notification query. `recipient` is forced to the caller for students.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub recipient: Option<Uuid>,
    pub notification_type: Option<NotificationType>,
    pub status: Option<DeliveryStatus>,
    pub read: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub oldest_first: bool,
}

impl NotificationFilter {
    pub fn from_params(params: &NotificationParams, recipient: Option<Uuid>) -> Self {
        Self {
            recipient,
            notification_type: params.notification_type,
            status: params.status,
            read: params.read,
            created_from: params.date_from.map(start_of_day),
            // Upper bound is exclusive on the following midnight so the whole day counts.
            created_before: params
                .date_to
                .and_then(|d| d.checked_add_days(Days::new(1)))
                .map(start_of_day),
            oldest_first: params.ordering.as_deref() == Some("created_at"),
        }
    }

    pub fn matches(&self, n: &Notification) -> bool {
        self.recipient.is_none_or(|r| r == n.recipient_user_id)
            && self
                .notification_type
                .is_none_or(|t| t == n.notification_type)
            && self.status.is_none_or(|s| s == n.status)
            && self.read.is_none_or(|r| r == n.read)
            && self.created_from.is_none_or(|from| n.created_at >= from)
            && self.created_before.is_none_or(|before| n.created_at < before)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Area;

    fn student(degree: &str, year: i32, availability: &str, areas: Vec<Area>) -> StudentProfile {
        StudentProfile {
            user_id: Uuid::new_v4(),
            degree: Some(degree.to_string()),
            year: Some(year),
            availability: Some(availability.to_string()),
            share_consent: true,
            areas,
            ..Default::default()
        }
    }

    #[test]
    fn page_reports_neighbours() {
        let req = PageRequest {
            page: Some(2),
            page_size: Some(2),
        };
        let page = Page::new(vec![3, 4], 5, &req);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let last = Page::new(vec![5], 5, &PageRequest { page: Some(3), page_size: Some(2) });
        assert_eq!(last.next, None);
    }

    #[test]
    fn page_size_is_clamped() {
        let req = PageRequest {
            page: Some(0),
            page_size: Some(10_000),
        };
        assert_eq!(req.page(), 1);
        assert_eq!(req.limit(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn far_pages_do_not_overflow() {
        let req = PageRequest {
            page: Some(u32::MAX),
            page_size: Some(MAX_PAGE_SIZE),
        };
        assert_eq!(req.offset(), i64::from(u32::MAX - 1) * 100);
        assert!(req.slice(vec![1, 2, 3]).is_empty());

        let page = Page::new(Vec::<i32>::new(), 3, &req);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(u32::MAX - 1));
    }

    #[test]
    fn student_filter_is_case_insensitive() {
        let s = student("Licenciatura", 3, "estagio", vec![]);
        let filter = StudentFilter {
            degree: Some("LICENCIATURA".into()),
            availability: Some("ESTAGIO".into()),
            ..Default::default()
        };
        assert!(filter.matches(&s));
    }

    #[test]
    fn student_filter_year_range_excludes_unknown_year() {
        let mut s = student("Mestrado", 1, "emprego", vec![]);
        let filter = StudentFilter {
            year_min: Some(2),
            year_max: Some(4),
            ..Default::default()
        };
        assert!(!filter.matches(&s));
        s.year = None;
        assert!(!filter.matches(&s));
        s.year = Some(3);
        assert!(filter.matches(&s));
    }

    #[test]
    fn student_filter_by_area_name_and_lists() {
        let area = Area {
            id: 7,
            name: "Informática".into(),
            description: None,
        };
        let s = student("Mestrado", 2, "projeto", vec![area]);
        let filter = StudentFilter {
            area_name: Some("inform".into()),
            degree_in: Some("Licenciatura, mestrado".into()),
            availability_in: Some("estagio,projeto".into()),
            area: Some(7),
            ..Default::default()
        };
        assert!(filter.matches(&s));

        let other_area = StudentFilter {
            area: Some(8),
            ..Default::default()
        };
        assert!(!other_area.matches(&s));
    }

    #[test]
    fn notification_date_to_includes_whole_day() {
        let params = NotificationParams {
            date_to: NaiveDate::from_ymd_opt(2025, 3, 10),
            ..Default::default()
        };
        let filter = NotificationFilter::from_params(&params, None);
        let before = filter.created_before.unwrap();
        assert_eq!(before.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
    }
}
