use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::filters::{CvFilter, JobFilter, NotificationFilter, Page, PageRequest, StudentFilter};
use crate::models::{
    Area, CompanyProfile, CreateAreaRequest, CreateJobPostingRequest, Cv, CvAccessLog,
    CvApproval, CvStatus, JobPosting, NewCv, NewCvAccessLog, NewNotification, Notification,
    Role, StudentProfile, UpdateCompanyRequest, UpdateJobPostingRequest, UpdateStudentRequest,
    User,
};

#[derive(Debug, Clone, Default)]
struct StudentRow {
    age: Option<i32>,
    degree: Option<String>,
    year: Option<i32>,
    availability: Option<String>,
    share_consent: bool,
    area_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
struct CompanyRow {
    location: Option<String>,
    website: Option<String>,
    area_ids: Vec<i64>,
}

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, User>,
    students: HashMap<Uuid, StudentRow>,
    companies: HashMap<Uuid, CompanyRow>,
    areas: BTreeMap<i64, Area>,
    jobs: BTreeMap<i64, (JobPosting, Vec<i64>)>,
    cvs: BTreeMap<i64, Cv>,
    access_logs: Vec<CvAccessLog>,
    notifications: BTreeMap<i64, Notification>,
    next_id: i64,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn areas_for(&self, ids: &[i64]) -> Vec<Area> {
        let mut areas: Vec<Area> = ids
            .iter()
            .filter_map(|id| self.areas.get(id).cloned())
            .collect();
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        areas
    }

    fn check_areas(&self, ids: &[i64]) -> RepoResult<()> {
        match ids.iter().find(|id| !self.areas.contains_key(id)) {
            Some(id) => Err(RepositoryError::UnknownReference(format!(
                "area {id} does not exist"
            ))),
            None => Ok(()),
        }
    }

    fn student(&self, user_id: Uuid) -> Option<StudentProfile> {
        let row = self.students.get(&user_id)?;
        let user = self.users.get(&user_id);
        Some(StudentProfile {
            user_id,
            name: user.and_then(|u| u.name.clone()),
            description: user.and_then(|u| u.description.clone()),
            age: row.age,
            degree: row.degree.clone(),
            year: row.year,
            availability: row.availability.clone(),
            share_consent: row.share_consent,
            areas: self.areas_for(&row.area_ids),
        })
    }

    fn company(&self, user_id: Uuid) -> Option<CompanyProfile> {
        let row = self.companies.get(&user_id)?;
        let user = self.users.get(&user_id);
        Some(CompanyProfile {
            user_id,
            name: user.and_then(|u| u.name.clone()),
            description: user.and_then(|u| u.description.clone()),
            location: row.location.clone(),
            website: row.website.clone(),
            areas: self.areas_for(&row.area_ids),
        })
    }

    fn job(&self, id: i64) -> Option<JobPosting> {
        let (job, area_ids) = self.jobs.get(&id)?;
        Some(JobPosting {
            areas: self.areas_for(area_ids),
            ..job.clone()
        })
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.jobs
            .iter()
            .any(|(id, (job, _))| job.name == name && Some(*id) != except)
    }

    fn pending_cv(&self, id: i64) -> RepoResult<Cv> {
        let cv = self
            .cvs
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("CV {id} not found")))?;
        if cv.status != CvStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "CV {id} has already been reviewed"
            )));
        }
        Ok(cv.clone())
    }

    fn consents(&self, student_id: Uuid) -> bool {
        self.students
            .get(&student_id)
            .is_some_and(|s| s.share_consent)
    }
}

fn paginate<T>(items: Vec<T>, page: &PageRequest) -> Page<T> {
    let count = items.len() as i64;
    Page::new(page.slice(items), count, page)
}

fn display_name(profile_name: &Option<String>) -> String {
    profile_name.clone().unwrap_or_default().to_lowercase()
}

/// InMemoryRepository
///
/// `Repository` kept entirely in memory behind a `tokio::sync::RwLock`. Backs the
/// integration tests and local demos without a database. Mirrors the Postgres
/// constraints: unique job names, one pending CV per student, foreign keys on areas.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding helpers ---

    pub async fn seed_user(&self, id: Uuid, role: Role, name: &str) {
        self.store.write().await.users.insert(
            id,
            User {
                id,
                name: Some(name.to_string()),
                description: None,
                role,
            },
        );
    }

    /// Creates the user and a student profile with the given consent flag.
    pub async fn seed_student(&self, id: Uuid, name: &str, share_consent: bool) {
        self.seed_user(id, Role::Student, name).await;
        self.store.write().await.students.insert(
            id,
            StudentRow {
                share_consent,
                ..Default::default()
            },
        );
    }

    pub async fn seed_company(&self, id: Uuid, name: &str) {
        self.seed_user(id, Role::Company, name).await;
        self.store
            .write()
            .await
            .companies
            .insert(id, CompanyRow::default());
    }

    /// Inserts a CV in any state, bypassing the workflow.
    pub async fn seed_cv(&self, student_id: Uuid, status: CvStatus, file_path: &str) -> Cv {
        let mut store = self.store.write().await;
        let id = store.next_id();
        let cv = Cv {
            id,
            student_id,
            file_path: (!file_path.is_empty()).then(|| file_path.to_string()),
            status,
            description: None,
            validated_date: (status == CvStatus::Approved).then(|| Utc::now().date_naive()),
            reviewed_by: None,
            created_at: Utc::now(),
        };
        store.cvs.insert(id, cv.clone());
        cv
    }

    /// Moves a notification's creation time, for date filter and ordering tests.
    pub async fn backdate_notification(&self, id: i64, created_at: DateTime<Utc>) {
        if let Some(n) = self.store.write().await.notifications.get_mut(&id) {
            n.created_at = created_at;
            n.updated_at = created_at;
        }
    }

    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.store
            .read()
            .await
            .notifications
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn list_areas(&self) -> RepoResult<Vec<Area>> {
        let mut areas: Vec<Area> = self.store.read().await.areas.values().cloned().collect();
        areas.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(areas)
    }

    async fn get_area(&self, id: i64) -> RepoResult<Option<Area>> {
        Ok(self.store.read().await.areas.get(&id).cloned())
    }

    async fn create_area(&self, req: CreateAreaRequest) -> RepoResult<Area> {
        let mut store = self.store.write().await;
        let area = Area {
            id: store.next_id(),
            name: req.name,
            description: req.description,
        };
        store.areas.insert(area.id, area.clone());
        Ok(area)
    }

    async fn list_students(
        &self,
        filter: &StudentFilter,
        only_consenting: bool,
        page: &PageRequest,
    ) -> RepoResult<Page<StudentProfile>> {
        let store = self.store.read().await;
        let mut students: Vec<StudentProfile> = store
            .students
            .keys()
            .filter_map(|id| store.student(*id))
            .filter(|s| !only_consenting || s.share_consent)
            .filter(|s| filter.matches(s))
            .collect();
        students.sort_by(|a, b| {
            display_name(&a.name)
                .cmp(&display_name(&b.name))
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(paginate(students, page))
    }

    async fn get_student(&self, user_id: Uuid) -> RepoResult<Option<StudentProfile>> {
        Ok(self.store.read().await.student(user_id))
    }

    async fn update_student(
        &self,
        user_id: Uuid,
        req: UpdateStudentRequest,
    ) -> RepoResult<StudentProfile> {
        let mut store = self.store.write().await;
        if let Some(ids) = &req.area_ids {
            store.check_areas(ids)?;
        }
        let user = store
            .users
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {user_id} not found")))?;
        if req.name.is_some() {
            user.name = req.name;
        }
        if req.description.is_some() {
            user.description = req.description;
        }

        let row = store.students.entry(user_id).or_default();
        if req.age.is_some() {
            row.age = req.age;
        }
        if req.degree.is_some() {
            row.degree = req.degree;
        }
        if req.year.is_some() {
            row.year = req.year;
        }
        if req.availability.is_some() {
            row.availability = req.availability;
        }
        if let Some(consent) = req.share_consent {
            row.share_consent = consent;
        }
        if let Some(ids) = req.area_ids {
            row.area_ids = ids;
        }

        store
            .student(user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("student {user_id} not found")))
    }

    async fn list_companies(&self, page: &PageRequest) -> RepoResult<Page<CompanyProfile>> {
        let store = self.store.read().await;
        let mut companies: Vec<CompanyProfile> = store
            .companies
            .keys()
            .filter_map(|id| store.company(*id))
            .collect();
        companies.sort_by(|a, b| {
            display_name(&a.name)
                .cmp(&display_name(&b.name))
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(paginate(companies, page))
    }

    async fn get_company(&self, user_id: Uuid) -> RepoResult<Option<CompanyProfile>> {
        Ok(self.store.read().await.company(user_id))
    }

    async fn update_company(
        &self,
        user_id: Uuid,
        req: UpdateCompanyRequest,
    ) -> RepoResult<CompanyProfile> {
        let mut store = self.store.write().await;
        if let Some(ids) = &req.area_ids {
            store.check_areas(ids)?;
        }
        let user = store
            .users
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {user_id} not found")))?;
        if req.name.is_some() {
            user.name = req.name;
        }
        if req.description.is_some() {
            user.description = req.description;
        }

        let row = store.companies.entry(user_id).or_default();
        if req.location.is_some() {
            row.location = req.location;
        }
        if req.website.is_some() {
            row.website = req.website;
        }
        if let Some(ids) = req.area_ids {
            row.area_ids = ids;
        }

        store
            .company(user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("company {user_id} not found")))
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: &PageRequest,
    ) -> RepoResult<Page<JobPosting>> {
        let store = self.store.read().await;
        let mut jobs: Vec<JobPosting> = store
            .jobs
            .keys()
            .filter_map(|id| store.job(*id))
            .filter(|j| filter.matches(j))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(jobs, page))
    }

    async fn get_job(&self, id: i64) -> RepoResult<Option<JobPosting>> {
        Ok(self.store.read().await.job(id))
    }

    async fn record_job_view(&self, id: i64) -> RepoResult<Option<JobPosting>> {
        let mut store = self.store.write().await;
        match store.jobs.get_mut(&id) {
            Some((job, _)) => job.views += 1,
            None => return Ok(None),
        }
        Ok(store.job(id))
    }

    async fn create_job(
        &self,
        company_id: Uuid,
        req: CreateJobPostingRequest,
    ) -> RepoResult<JobPosting> {
        let mut store = self.store.write().await;
        if store.name_taken(&req.name, None) {
            return Err(RepositoryError::Conflict(format!(
                "a job posting named '{}' already exists",
                req.name
            )));
        }
        if !store.companies.contains_key(&company_id) {
            return Err(RepositoryError::NotFound(
                "company profile not found".to_string(),
            ));
        }
        store.check_areas(&req.area_ids)?;

        let id = store.next_id();
        let job = JobPosting {
            id,
            name: req.name,
            description: req.description,
            opportunity: req.opportunity,
            views: 0,
            applications: 0,
            company_id,
            created_at: Utc::now(),
            areas: Vec::new(),
        };
        store.jobs.insert(id, (job, req.area_ids));
        store
            .job(id)
            .ok_or_else(|| RepositoryError::NotFound("job posting not found".to_string()))
    }

    async fn update_job(
        &self,
        id: i64,
        req: UpdateJobPostingRequest,
    ) -> RepoResult<Option<JobPosting>> {
        let mut store = self.store.write().await;
        if !store.jobs.contains_key(&id) {
            return Ok(None);
        }
        if let Some(name) = &req.name {
            if store.name_taken(name, Some(id)) {
                return Err(RepositoryError::Conflict(format!(
                    "a job posting named '{name}' already exists"
                )));
            }
        }
        if let Some(ids) = &req.area_ids {
            store.check_areas(ids)?;
        }

        if let Some((job, area_ids)) = store.jobs.get_mut(&id) {
            if let Some(name) = req.name {
                job.name = name;
            }
            if req.description.is_some() {
                job.description = req.description;
            }
            if let Some(opportunity) = req.opportunity {
                job.opportunity = opportunity;
            }
            if let Some(ids) = req.area_ids {
                *area_ids = ids;
            }
        }
        Ok(store.job(id))
    }

    async fn delete_job(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.jobs.remove(&id).is_some())
    }

    async fn list_cvs(&self, filter: &CvFilter, page: &PageRequest) -> RepoResult<Page<Cv>> {
        let store = self.store.read().await;
        let mut cvs: Vec<Cv> = store
            .cvs
            .values()
            .filter(|cv| filter.matches(cv, store.consents(cv.student_id)))
            .cloned()
            .collect();
        cvs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(cvs, page))
    }

    async fn get_cv(&self, id: i64) -> RepoResult<Option<Cv>> {
        Ok(self.store.read().await.cvs.get(&id).cloned())
    }

    async fn student_cvs(&self, student_id: Uuid) -> RepoResult<Vec<Cv>> {
        let store = self.store.read().await;
        let mut cvs: Vec<Cv> = store
            .cvs
            .values()
            .filter(|cv| cv.student_id == student_id)
            .cloned()
            .collect();
        cvs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(cvs)
    }

    async fn pending_cv(&self, student_id: Uuid) -> RepoResult<Option<Cv>> {
        Ok(self
            .store
            .read()
            .await
            .cvs
            .values()
            .find(|cv| cv.student_id == student_id && cv.status == CvStatus::Pending)
            .cloned())
    }

    async fn create_cv(&self, new: NewCv) -> RepoResult<Cv> {
        let mut store = self.store.write().await;
        if !store.students.contains_key(&new.student_id) {
            return Err(RepositoryError::NotFound(
                "student profile not found".to_string(),
            ));
        }
        if store
            .cvs
            .values()
            .any(|cv| cv.student_id == new.student_id && cv.status == CvStatus::Pending)
        {
            return Err(RepositoryError::Conflict(
                "student already has a pending CV".to_string(),
            ));
        }

        let id = store.next_id();
        let cv = Cv {
            id,
            student_id: new.student_id,
            file_path: Some(new.file_path),
            status: CvStatus::Pending,
            description: new.description,
            validated_date: None,
            reviewed_by: None,
            created_at: Utc::now(),
        };
        store.cvs.insert(id, cv.clone());
        Ok(cv)
    }

    async fn replace_cv_file(
        &self,
        id: i64,
        file_path: &str,
        description: Option<String>,
    ) -> RepoResult<Option<Cv>> {
        let mut store = self.store.write().await;
        let Some(cv) = store
            .cvs
            .get_mut(&id)
            .filter(|cv| cv.status == CvStatus::Pending)
        else {
            return Ok(None);
        };
        cv.file_path = Some(file_path.to_string());
        if description.is_some() {
            cv.description = description;
        }
        Ok(Some(cv.clone()))
    }

    async fn approve_cv(&self, id: i64, reviewer_id: Uuid) -> RepoResult<CvApproval> {
        let mut store = self.store.write().await;
        let pending = store.pending_cv(id)?;

        let stale: Vec<i64> = store
            .cvs
            .values()
            .filter(|cv| {
                cv.student_id == pending.student_id
                    && cv.status == CvStatus::Approved
                    && cv.id != id
            })
            .map(|cv| cv.id)
            .collect();
        let cleared: Vec<Cv> = stale
            .iter()
            .filter_map(|old| store.cvs.remove(old))
            .collect();
        store.access_logs.retain(|log| !stale.contains(&log.cv_id));

        let cv = store
            .cvs
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("CV {id} not found")))?;
        cv.status = CvStatus::Approved;
        cv.validated_date = Some(Utc::now().date_naive());
        cv.reviewed_by = Some(reviewer_id);

        Ok(CvApproval {
            cv: cv.clone(),
            cleared,
        })
    }

    async fn reject_cv(&self, id: i64) -> RepoResult<Cv> {
        let mut store = self.store.write().await;
        let mut cv = store.pending_cv(id)?;
        store.cvs.remove(&id);
        store.access_logs.retain(|log| log.cv_id != id);
        cv.status = CvStatus::Rejected;
        Ok(cv)
    }

    async fn delete_cv(&self, id: i64) -> RepoResult<Option<Cv>> {
        let mut store = self.store.write().await;
        let removed = store.cvs.remove(&id);
        if removed.is_some() {
            store.access_logs.retain(|log| log.cv_id != id);
        }
        Ok(removed)
    }

    async fn record_cv_access(&self, entry: NewCvAccessLog) -> RepoResult<CvAccessLog> {
        let mut store = self.store.write().await;
        if !store.cvs.contains_key(&entry.cv_id) {
            return Err(RepositoryError::NotFound("CV not found".to_string()));
        }
        let log = CvAccessLog {
            id: Uuid::new_v4(),
            cv_id: entry.cv_id,
            accessed_by_user_id: entry.accessed_by_user_id,
            accessed_by_role: entry.accessed_by_role,
            accessed_at: Utc::now(),
        };
        store.access_logs.push(log.clone());
        Ok(log)
    }

    async fn cv_access_logs(&self, cv_id: i64) -> RepoResult<Vec<CvAccessLog>> {
        let store = self.store.read().await;
        let mut logs: Vec<CvAccessLog> = store
            .access_logs
            .iter()
            .filter(|log| log.cv_id == cv_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
        Ok(logs)
    }

    async fn create_notification(&self, n: NewNotification) -> RepoResult<Notification> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let notification = Notification {
            id: store.next_id(),
            recipient_user_id: n.recipient_user_id,
            recipient_email: n.recipient_email,
            notification_type: n.notification_type,
            subject: n.subject,
            status: n.status,
            error_message: n.error_message,
            read: false,
            cv_id: n.cv_id,
            created_at: now,
            updated_at: now,
        };
        store
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        page: &PageRequest,
    ) -> RepoResult<Page<Notification>> {
        let store = self.store.read().await;
        let mut rows: Vec<Notification> = store
            .notifications
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if !filter.oldest_first {
            rows.reverse();
        }
        Ok(paginate(rows, page))
    }

    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>> {
        Ok(self.store.read().await.notifications.get(&id).cloned())
    }

    async fn set_notification_read(
        &self,
        id: i64,
        read: bool,
    ) -> RepoResult<Option<Notification>> {
        let mut store = self.store.write().await;
        Ok(store.notifications.get_mut(&id).map(|n| {
            n.read = read;
            n.updated_at = Utc::now();
            n.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Opportunity;

    #[tokio::test]
    async fn job_names_are_unique() {
        let repo = InMemoryRepository::new();
        let company = Uuid::new_v4();
        repo.seed_company(company, "Acme").await;

        let req = CreateJobPostingRequest {
            name: "Backend Intern".into(),
            description: None,
            opportunity: Opportunity::Estagio,
            area_ids: vec![],
        };
        repo.create_job(company, req.clone()).await.unwrap();
        assert!(matches!(
            repo.create_job(company, req).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn one_pending_cv_per_student() {
        let repo = InMemoryRepository::new();
        let student = Uuid::new_v4();
        repo.seed_student(student, "Ana", true).await;

        let new = NewCv {
            student_id: student,
            file_path: "estudante_a/cv_1.pdf".into(),
            description: None,
        };
        repo.create_cv(new.clone()).await.unwrap();
        assert!(matches!(
            repo.create_cv(new).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn approval_clears_previous_approved_cv() {
        let repo = InMemoryRepository::new();
        let student = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        repo.seed_student(student, "Ana", true).await;

        let old = repo.seed_cv(student, CvStatus::Approved, "old.pdf").await;
        let new = repo.seed_cv(student, CvStatus::Pending, "new.pdf").await;

        let approval = repo.approve_cv(new.id, reviewer).await.unwrap();
        assert_eq!(approval.cv.status, CvStatus::Approved);
        assert_eq!(approval.cv.reviewed_by, Some(reviewer));
        assert_eq!(approval.cleared.len(), 1);
        assert_eq!(approval.cleared[0].id, old.id);
        assert!(repo.get_cv(old.id).await.unwrap().is_none());

        assert!(matches!(
            repo.approve_cv(new.id, reviewer).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn unknown_area_is_rejected_on_update() {
        let repo = InMemoryRepository::new();
        let student = Uuid::new_v4();
        repo.seed_student(student, "Ana", true).await;

        let req = UpdateStudentRequest {
            area_ids: Some(vec![999]),
            ..Default::default()
        };
        assert!(matches!(
            repo.update_student(student, req).await,
            Err(RepositoryError::UnknownReference(_))
        ));
    }
}
