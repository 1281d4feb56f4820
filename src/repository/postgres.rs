use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::filters::{CvFilter, JobFilter, NotificationFilter, Page, PageRequest, StudentFilter};
use crate::models::{
    Area, CompanyProfile, CreateAreaRequest, CreateJobPostingRequest, Cv, CvAccessLog,
    CvApproval, CvStatus, JobPosting, NewCv, NewCvAccessLog, NewNotification, Notification,
    StudentProfile, UpdateCompanyRequest, UpdateJobPostingRequest, UpdateStudentRequest, User,
};

const STUDENT_FROM: &str = " FROM students s JOIN users u ON u.id = s.user_id WHERE 1=1";
const STUDENT_COLUMNS: &str = "SELECT u.id AS user_id, u.name, u.description, s.age, s.degree, \
     s.year, s.availability, s.share_consent";

const COMPANY_SELECT: &str = "SELECT u.id AS user_id, u.name, u.description, c.location, \
     c.website FROM companies c JOIN users u ON u.id = c.user_id";

const JOB_COLUMNS: &str = "SELECT j.id, j.name, j.description, j.opportunity, j.views, \
     j.applications, j.company_id, j.created_at";
const JOB_RETURNING: &str = " RETURNING id, name, description, opportunity, views, \
     applications, company_id, created_at";

const CV_COLUMNS: &str = "SELECT c.id, c.student_id, c.file_path, c.status, c.description, \
     c.validated_date, c.reviewed_by, c.created_at";
const CV_RETURNING: &str = " RETURNING id, student_id, file_path, status, description, \
     validated_date, reviewed_by, created_at";

const NOTIFICATION_COLUMNS: &str = "SELECT id, recipient_user_id, recipient_email, type, \
     subject, status, error_message, read, cv_id, created_at, updated_at";
const NOTIFICATION_RETURNING: &str = " RETURNING id, recipient_user_id, recipient_email, \
     type, subject, status, error_message, read, cv_id, created_at, updated_at";

/// Area row tagged with the user (student or company) it is linked to.
#[derive(FromRow)]
struct UserArea {
    owner_id: Uuid,
    id: i64,
    name: String,
    description: Option<String>,
}

/// Area row tagged with the job posting it is linked to.
#[derive(FromRow)]
struct JobArea {
    owner_id: i64,
    id: i64,
    name: String,
    description: Option<String>,
}

/// Link tables between users and areas.
#[derive(Clone, Copy)]
enum UserAreaLink {
    Student,
    Company,
}

impl UserAreaLink {
    fn table(self) -> &'static str {
        match self {
            UserAreaLink::Student => "student_areas",
            UserAreaLink::Company => "company_areas",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            UserAreaLink::Student => "student_id",
            UserAreaLink::Company => "company_id",
        }
    }
}

/// Translates constraint violations into domain errors; everything else stays a
/// database error.
fn constraint_error(e: sqlx::Error, conflict: &str, missing: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(conflict.to_string());
        }
        if db.is_foreign_key_violation() {
            return RepositoryError::NotFound(missing.to_string());
        }
    }
    RepositoryError::Database(e)
}

/// A foreign-key failure while linking areas means the request named an unknown area.
fn area_link_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return RepositoryError::UnknownReference(
                "one of the areas does not exist".to_string(),
            );
        }
    }
    constraint_error(e, "duplicate area", "area not found")
}

fn push_page(builder: &mut QueryBuilder<'static, Postgres>, page: &PageRequest) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(page.limit()))
        .push(" OFFSET ")
        .push_bind(page.offset());
}

fn student_query(
    head: &str,
    filter: &StudentFilter,
    only_consenting: bool,
) -> QueryBuilder<'static, Postgres> {
    let mut b = QueryBuilder::new(format!("{head}{STUDENT_FROM}"));

    if only_consenting {
        b.push(" AND s.share_consent = true");
    }
    if let Some(degree) = filter.degree.clone().filter(|v| !v.is_empty()) {
        b.push(" AND LOWER(s.degree) = LOWER(").push_bind(degree).push(")");
    }
    let degrees: Vec<String> = filter.degrees().iter().map(|d| d.to_lowercase()).collect();
    if !degrees.is_empty() {
        b.push(" AND LOWER(s.degree) = ANY(").push_bind(degrees).push(")");
    }
    if let Some(min) = filter.year_min {
        b.push(" AND s.year >= ").push_bind(min);
    }
    if let Some(max) = filter.year_max {
        b.push(" AND s.year <= ").push_bind(max);
    }
    if let Some(availability) = filter.availability.clone().filter(|v| !v.is_empty()) {
        b.push(" AND LOWER(s.availability) = LOWER(")
            .push_bind(availability)
            .push(")");
    }
    let availabilities: Vec<String> = filter
        .availabilities()
        .iter()
        .map(|a| a.to_lowercase())
        .collect();
    if !availabilities.is_empty() {
        b.push(" AND LOWER(s.availability) = ANY(")
            .push_bind(availabilities)
            .push(")");
    }
    if let Some(area) = filter.area {
        b.push(
            " AND EXISTS (SELECT 1 FROM student_areas sa \
             WHERE sa.student_id = s.user_id AND sa.area_id = ",
        )
        .push_bind(area)
        .push(")");
    }
    if let Some(name) = filter.area_name.clone().filter(|v| !v.is_empty()) {
        b.push(
            " AND EXISTS (SELECT 1 FROM student_areas sa JOIN areas a ON a.id = sa.area_id \
             WHERE sa.student_id = s.user_id AND a.name ILIKE ",
        )
        .push_bind(contains_pattern(&name))
        .push(" ESCAPE '\\')");
    }
    b
}

fn job_query(head: &str, filter: &JobFilter) -> QueryBuilder<'static, Postgres> {
    let mut b = QueryBuilder::new(format!("{head} FROM job_postings j WHERE 1=1"));

    if let Some(opportunity) = filter.opportunity {
        b.push(" AND j.opportunity = ").push_bind(opportunity.as_str());
    }
    if let Some(company) = filter.company {
        b.push(" AND j.company_id = ").push_bind(company);
    }
    if let Some(area) = filter.area {
        b.push(
            " AND EXISTS (SELECT 1 FROM job_posting_areas ja \
             WHERE ja.job_posting_id = j.id AND ja.area_id = ",
        )
        .push_bind(area)
        .push(")");
    }
    if let Some(search) = filter.search.clone().filter(|v| !v.is_empty()) {
        let pattern = contains_pattern(&search);
        b.push(" AND (j.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR j.description ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    b
}

/// `ILIKE` pattern matching `needle` literally anywhere in the column.
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn cv_query(head: &str, filter: &CvFilter) -> QueryBuilder<'static, Postgres> {
    let mut b = QueryBuilder::new(format!(
        "{head} FROM cvs c JOIN students s ON s.user_id = c.student_id WHERE 1=1"
    ));

    if let Some(status) = filter.status {
        b.push(" AND c.status = ").push_bind(i16::from(status));
    }
    if let Some(student) = filter.student {
        b.push(" AND c.student_id = ").push_bind(student);
    }
    if filter.only_consenting {
        b.push(" AND s.share_consent = true");
    }
    b
}

fn notification_query(head: &str, filter: &NotificationFilter) -> QueryBuilder<'static, Postgres> {
    let mut b = QueryBuilder::new(format!("{head} FROM notifications WHERE 1=1"));

    if let Some(recipient) = filter.recipient {
        b.push(" AND recipient_user_id = ").push_bind(recipient);
    }
    if let Some(kind) = filter.notification_type {
        b.push(" AND type = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        b.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(read) = filter.read {
        b.push(" AND read = ").push_bind(read);
    }
    if let Some(from) = filter.created_from {
        b.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(before) = filter.created_before {
        b.push(" AND created_at < ").push_bind(before);
    }
    b
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are built at runtime (`query_as` and
/// `QueryBuilder`) so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_areas(
        &self,
        link: UserAreaLink,
        owners: &[Uuid],
    ) -> RepoResult<HashMap<Uuid, Vec<Area>>> {
        let sql = format!(
            "SELECT l.{col} AS owner_id, a.id, a.name, a.description \
             FROM {table} l JOIN areas a ON a.id = l.area_id \
             WHERE l.{col} = ANY($1) ORDER BY a.name",
            col = link.owner_column(),
            table = link.table(),
        );
        let rows = sqlx::query_as::<_, UserArea>(&sql)
            .bind(owners.to_vec())
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<Area>> = HashMap::new();
        for row in rows {
            grouped.entry(row.owner_id).or_default().push(Area {
                id: row.id,
                name: row.name,
                description: row.description,
            });
        }
        Ok(grouped)
    }

    async fn job_areas(&self, jobs: &[i64]) -> RepoResult<HashMap<i64, Vec<Area>>> {
        let rows = sqlx::query_as::<_, JobArea>(
            "SELECT l.job_posting_id AS owner_id, a.id, a.name, a.description \
             FROM job_posting_areas l JOIN areas a ON a.id = l.area_id \
             WHERE l.job_posting_id = ANY($1) ORDER BY a.name",
        )
        .bind(jobs.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<Area>> = HashMap::new();
        for row in rows {
            grouped.entry(row.owner_id).or_default().push(Area {
                id: row.id,
                name: row.name,
                description: row.description,
            });
        }
        Ok(grouped)
    }

    async fn with_student_areas(
        &self,
        mut students: Vec<StudentProfile>,
    ) -> RepoResult<Vec<StudentProfile>> {
        let ids: Vec<Uuid> = students.iter().map(|s| s.user_id).collect();
        let mut areas = self.user_areas(UserAreaLink::Student, &ids).await?;
        for student in &mut students {
            student.areas = areas.remove(&student.user_id).unwrap_or_default();
        }
        Ok(students)
    }

    async fn with_company_areas(
        &self,
        mut companies: Vec<CompanyProfile>,
    ) -> RepoResult<Vec<CompanyProfile>> {
        let ids: Vec<Uuid> = companies.iter().map(|c| c.user_id).collect();
        let mut areas = self.user_areas(UserAreaLink::Company, &ids).await?;
        for company in &mut companies {
            company.areas = areas.remove(&company.user_id).unwrap_or_default();
        }
        Ok(companies)
    }

    async fn with_job_areas(&self, mut jobs: Vec<JobPosting>) -> RepoResult<Vec<JobPosting>> {
        let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
        let mut areas = self.job_areas(&ids).await?;
        for job in &mut jobs {
            job.areas = areas.remove(&job.id).unwrap_or_default();
        }
        Ok(jobs)
    }

    async fn with_one_job_area(&self, job: Option<JobPosting>) -> RepoResult<Option<JobPosting>> {
        match job {
            Some(job) => Ok(self.with_job_areas(vec![job]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Replaces the full area set of a student or company inside `tx`.
    async fn replace_user_areas(
        tx: &mut Transaction<'_, Postgres>,
        link: UserAreaLink,
        owner: Uuid,
        area_ids: &[i64],
    ) -> RepoResult<()> {
        let delete = format!(
            "DELETE FROM {} WHERE {} = $1",
            link.table(),
            link.owner_column()
        );
        sqlx::query(&delete).bind(owner).execute(&mut **tx).await?;

        if area_ids.is_empty() {
            return Ok(());
        }
        let mut insert = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} (area_id, {}) ",
            link.table(),
            link.owner_column()
        ));
        insert.push_values(area_ids, |mut row, area_id| {
            row.push_bind(*area_id).push_bind(owner);
        });
        insert.push(" ON CONFLICT DO NOTHING");
        insert
            .build()
            .execute(&mut **tx)
            .await
            .map_err(area_link_error)?;
        Ok(())
    }

    async fn replace_job_areas(
        tx: &mut Transaction<'_, Postgres>,
        job_id: i64,
        area_ids: &[i64],
    ) -> RepoResult<()> {
        sqlx::query("DELETE FROM job_posting_areas WHERE job_posting_id = $1")
            .bind(job_id)
            .execute(&mut **tx)
            .await?;

        if area_ids.is_empty() {
            return Ok(());
        }
        let mut insert =
            QueryBuilder::<Postgres>::new("INSERT INTO job_posting_areas (job_posting_id, area_id) ");
        insert.push_values(area_ids, |mut row, area_id| {
            row.push_bind(job_id).push_bind(*area_id);
        });
        insert.push(" ON CONFLICT DO NOTHING");
        insert
            .build()
            .execute(&mut **tx)
            .await
            .map_err(area_link_error)?;
        Ok(())
    }

    /// Locks a CV row and checks it is still pending.
    async fn lock_pending_cv(tx: &mut Transaction<'_, Postgres>, id: i64) -> RepoResult<Cv> {
        let cv = sqlx::query_as::<_, Cv>(&format!(
            "{CV_COLUMNS} FROM cvs c WHERE c.id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("CV {id} not found")))?;

        if cv.status != CvStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "CV {id} has already been reviewed"
            )));
        }
        Ok(cv)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// Identity mirror row used by `/me`.
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT id, name, description, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn list_areas(&self) -> RepoResult<Vec<Area>> {
        let areas =
            sqlx::query_as::<_, Area>("SELECT id, name, description FROM areas ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(areas)
    }

    async fn get_area(&self, id: i64) -> RepoResult<Option<Area>> {
        let area = sqlx::query_as::<_, Area>("SELECT id, name, description FROM areas WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(area)
    }

    async fn create_area(&self, req: CreateAreaRequest) -> RepoResult<Area> {
        let area = sqlx::query_as::<_, Area>(
            "INSERT INTO areas (name, description) VALUES ($1, $2) \
             RETURNING id, name, description",
        )
        .bind(req.name)
        .bind(req.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(area)
    }

    /// list_students
    ///
    /// Filtered listing built with `QueryBuilder`; the count and page queries share the
    /// same WHERE clause. Areas are loaded for the page in one extra query.
    async fn list_students(
        &self,
        filter: &StudentFilter,
        only_consenting: bool,
        page: &PageRequest,
    ) -> RepoResult<Page<StudentProfile>> {
        let count: i64 = student_query("SELECT COUNT(*)", filter, only_consenting)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = student_query(STUDENT_COLUMNS, filter, only_consenting);
        select.push(" ORDER BY u.name NULLS LAST, u.id");
        push_page(&mut select, page);
        let students = select
            .build_query_as::<StudentProfile>()
            .fetch_all(&self.pool)
            .await?;

        let students = self.with_student_areas(students).await?;
        Ok(Page::new(students, count, page))
    }

    async fn get_student(&self, user_id: Uuid) -> RepoResult<Option<StudentProfile>> {
        let student = sqlx::query_as::<_, StudentProfile>(&format!(
            "{STUDENT_COLUMNS}{STUDENT_FROM} AND s.user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match student {
            Some(s) => Ok(self.with_student_areas(vec![s]).await?.pop()),
            None => Ok(None),
        }
    }

    /// update_student
    ///
    /// COALESCE-based partial update of the user and student rows, plus a full
    /// replacement of the areas when `area_ids` is present, in one transaction.
    async fn update_student(
        &self,
        user_id: Uuid,
        req: UpdateStudentRequest,
    ) -> RepoResult<StudentProfile> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE users SET name = COALESCE($2, name), \
             description = COALESCE($3, description) WHERE id = $1",
        )
        .bind(user_id)
        .bind(req.name)
        .bind(req.description)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user {user_id} not found")));
        }

        sqlx::query(
            "INSERT INTO students (user_id, age, degree, year, availability, share_consent) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, false)) \
             ON CONFLICT (user_id) DO UPDATE SET \
                age = COALESCE($2, students.age), \
                degree = COALESCE($3, students.degree), \
                year = COALESCE($4, students.year), \
                availability = COALESCE($5, students.availability), \
                share_consent = COALESCE($6, students.share_consent)",
        )
        .bind(user_id)
        .bind(req.age)
        .bind(req.degree)
        .bind(req.year)
        .bind(req.availability)
        .bind(req.share_consent)
        .execute(&mut *tx)
        .await?;

        if let Some(area_ids) = &req.area_ids {
            Self::replace_user_areas(&mut tx, UserAreaLink::Student, user_id, area_ids).await?;
        }
        tx.commit().await?;

        self.get_student(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("student {user_id} not found")))
    }

    async fn list_companies(&self, page: &PageRequest) -> RepoResult<Page<CompanyProfile>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .fetch_one(&self.pool)
            .await?;

        let companies = sqlx::query_as::<_, CompanyProfile>(&format!(
            "{COMPANY_SELECT} ORDER BY u.name NULLS LAST, u.id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit()))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let companies = self.with_company_areas(companies).await?;
        Ok(Page::new(companies, count, page))
    }

    async fn get_company(&self, user_id: Uuid) -> RepoResult<Option<CompanyProfile>> {
        let company = sqlx::query_as::<_, CompanyProfile>(&format!(
            "{COMPANY_SELECT} WHERE c.user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match company {
            Some(c) => Ok(self.with_company_areas(vec![c]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_company(
        &self,
        user_id: Uuid,
        req: UpdateCompanyRequest,
    ) -> RepoResult<CompanyProfile> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE users SET name = COALESCE($2, name), \
             description = COALESCE($3, description) WHERE id = $1",
        )
        .bind(user_id)
        .bind(req.name)
        .bind(req.description)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user {user_id} not found")));
        }

        sqlx::query(
            "INSERT INTO companies (user_id, location, website) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                location = COALESCE($2, companies.location), \
                website = COALESCE($3, companies.website)",
        )
        .bind(user_id)
        .bind(req.location)
        .bind(req.website)
        .execute(&mut *tx)
        .await?;

        if let Some(area_ids) = &req.area_ids {
            Self::replace_user_areas(&mut tx, UserAreaLink::Company, user_id, area_ids).await?;
        }
        tx.commit().await?;

        self.get_company(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("company {user_id} not found")))
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: &PageRequest,
    ) -> RepoResult<Page<JobPosting>> {
        let count: i64 = job_query("SELECT COUNT(*)", filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = job_query(JOB_COLUMNS, filter);
        select.push(" ORDER BY j.created_at DESC, j.id DESC");
        push_page(&mut select, page);
        let jobs = select
            .build_query_as::<JobPosting>()
            .fetch_all(&self.pool)
            .await?;

        let jobs = self.with_job_areas(jobs).await?;
        Ok(Page::new(jobs, count, page))
    }

    async fn get_job(&self, id: i64) -> RepoResult<Option<JobPosting>> {
        let job = sqlx::query_as::<_, JobPosting>(&format!(
            "{JOB_COLUMNS} FROM job_postings j WHERE j.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_one_job_area(job).await
    }

    async fn record_job_view(&self, id: i64) -> RepoResult<Option<JobPosting>> {
        let job = sqlx::query_as::<_, JobPosting>(&format!(
            "UPDATE job_postings SET views = views + 1 WHERE id = $1{JOB_RETURNING}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_one_job_area(job).await
    }

    /// create_job
    ///
    /// The unique index on `name` is the source of truth for duplicates.
    async fn create_job(
        &self,
        company_id: Uuid,
        req: CreateJobPostingRequest,
    ) -> RepoResult<JobPosting> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobPosting>(&format!(
            "INSERT INTO job_postings (name, description, opportunity, company_id) \
             VALUES ($1, $2, $3, $4){JOB_RETURNING}"
        ))
        .bind(&req.name)
        .bind(req.description)
        .bind(req.opportunity.as_str())
        .bind(company_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            constraint_error(
                e,
                &format!("a job posting named '{}' already exists", req.name),
                "company profile not found",
            )
        })?;

        Self::replace_job_areas(&mut tx, job.id, &req.area_ids).await?;
        tx.commit().await?;

        self.with_one_job_area(Some(job))
            .await?
            .ok_or_else(|| RepositoryError::NotFound("job posting not found".to_string()))
    }

    async fn update_job(
        &self,
        id: i64,
        req: UpdateJobPostingRequest,
    ) -> RepoResult<Option<JobPosting>> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobPosting>(&format!(
            "UPDATE job_postings SET name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             opportunity = COALESCE($4, opportunity) \
             WHERE id = $1{JOB_RETURNING}"
        ))
        .bind(id)
        .bind(req.name.clone())
        .bind(req.description)
        .bind(req.opportunity.map(|o| o.as_str()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            constraint_error(
                e,
                &format!(
                    "a job posting named '{}' already exists",
                    req.name.as_deref().unwrap_or_default()
                ),
                "company profile not found",
            )
        })?;

        let Some(job) = job else {
            return Ok(None);
        };
        if let Some(area_ids) = &req.area_ids {
            Self::replace_job_areas(&mut tx, job.id, area_ids).await?;
        }
        tx.commit().await?;

        self.with_one_job_area(Some(job)).await
    }

    async fn delete_job(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM job_postings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_cvs(&self, filter: &CvFilter, page: &PageRequest) -> RepoResult<Page<Cv>> {
        let count: i64 = cv_query("SELECT COUNT(*)", filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = cv_query(CV_COLUMNS, filter);
        select.push(" ORDER BY c.created_at DESC, c.id DESC");
        push_page(&mut select, page);
        let cvs = select.build_query_as::<Cv>().fetch_all(&self.pool).await?;

        Ok(Page::new(cvs, count, page))
    }

    async fn get_cv(&self, id: i64) -> RepoResult<Option<Cv>> {
        let cv = sqlx::query_as::<_, Cv>(&format!("{CV_COLUMNS} FROM cvs c WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cv)
    }

    async fn student_cvs(&self, student_id: Uuid) -> RepoResult<Vec<Cv>> {
        let cvs = sqlx::query_as::<_, Cv>(&format!(
            "{CV_COLUMNS} FROM cvs c WHERE c.student_id = $1 ORDER BY c.created_at DESC, c.id DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(cvs)
    }

    async fn pending_cv(&self, student_id: Uuid) -> RepoResult<Option<Cv>> {
        let cv = sqlx::query_as::<_, Cv>(&format!(
            "{CV_COLUMNS} FROM cvs c WHERE c.student_id = $1 AND c.status = 0"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cv)
    }

    /// create_cv
    ///
    /// The partial unique index `cvs_one_pending_per_student` turns a concurrent second
    /// submission into a `Conflict`.
    async fn create_cv(&self, cv: NewCv) -> RepoResult<Cv> {
        let created = sqlx::query_as::<_, Cv>(&format!(
            "INSERT INTO cvs (student_id, file_path, description) VALUES ($1, $2, $3){CV_RETURNING}"
        ))
        .bind(cv.student_id)
        .bind(cv.file_path)
        .bind(cv.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            constraint_error(
                e,
                "student already has a pending CV",
                "student profile not found",
            )
        })?;
        Ok(created)
    }

    async fn replace_cv_file(
        &self,
        id: i64,
        file_path: &str,
        description: Option<String>,
    ) -> RepoResult<Option<Cv>> {
        let cv = sqlx::query_as::<_, Cv>(&format!(
            "UPDATE cvs SET file_path = $2, description = COALESCE($3, description) \
             WHERE id = $1 AND status = 0{CV_RETURNING}"
        ))
        .bind(id)
        .bind(file_path)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cv)
    }

    /// approve_cv
    ///
    /// Row-locks the CV, removes the student's other approved CVs and flips the status in
    /// a single transaction.
    async fn approve_cv(&self, id: i64, reviewer_id: Uuid) -> RepoResult<CvApproval> {
        let mut tx = self.pool.begin().await?;
        let pending = Self::lock_pending_cv(&mut tx, id).await?;

        let cleared = sqlx::query_as::<_, Cv>(&format!(
            "DELETE FROM cvs WHERE student_id = $1 AND status = 1 AND id <> $2{CV_RETURNING}"
        ))
        .bind(pending.student_id)
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let cv = sqlx::query_as::<_, Cv>(&format!(
            "UPDATE cvs SET status = 1, validated_date = $2, reviewed_by = $3 \
             WHERE id = $1{CV_RETURNING}"
        ))
        .bind(id)
        .bind(Utc::now().date_naive())
        .bind(reviewer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CvApproval { cv, cleared })
    }

    async fn reject_cv(&self, id: i64) -> RepoResult<Cv> {
        let mut tx = self.pool.begin().await?;
        let mut cv = Self::lock_pending_cv(&mut tx, id).await?;

        sqlx::query("DELETE FROM cvs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        cv.status = CvStatus::Rejected;
        Ok(cv)
    }

    async fn delete_cv(&self, id: i64) -> RepoResult<Option<Cv>> {
        let cv = sqlx::query_as::<_, Cv>(&format!("DELETE FROM cvs WHERE id = $1{CV_RETURNING}"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cv)
    }

    async fn record_cv_access(&self, entry: NewCvAccessLog) -> RepoResult<CvAccessLog> {
        let log = sqlx::query_as::<_, CvAccessLog>(
            "INSERT INTO cv_access_logs (id, cv_id, accessed_by_user_id, accessed_by_role) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, cv_id, accessed_by_user_id, accessed_by_role, accessed_at",
        )
        .bind(Uuid::new_v4())
        .bind(entry.cv_id)
        .bind(entry.accessed_by_user_id)
        .bind(i16::from(entry.accessed_by_role))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "duplicate access log", "CV not found"))?;
        Ok(log)
    }

    async fn cv_access_logs(&self, cv_id: i64) -> RepoResult<Vec<CvAccessLog>> {
        let logs = sqlx::query_as::<_, CvAccessLog>(
            "SELECT id, cv_id, accessed_by_user_id, accessed_by_role, accessed_at \
             FROM cv_access_logs WHERE cv_id = $1 ORDER BY accessed_at DESC",
        )
        .bind(cv_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn create_notification(&self, n: NewNotification) -> RepoResult<Notification> {
        let created = sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO notifications \
             (recipient_user_id, recipient_email, type, subject, status, error_message, cv_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7){NOTIFICATION_RETURNING}"
        ))
        .bind(n.recipient_user_id)
        .bind(n.recipient_email)
        .bind(n.notification_type.as_str())
        .bind(n.subject)
        .bind(n.status.as_str())
        .bind(n.error_message)
        .bind(n.cv_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        page: &PageRequest,
    ) -> RepoResult<Page<Notification>> {
        let count: i64 = notification_query("SELECT COUNT(*)", filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = notification_query(NOTIFICATION_COLUMNS, filter);
        if filter.oldest_first {
            select.push(" ORDER BY created_at ASC, id ASC");
        } else {
            select.push(" ORDER BY created_at DESC, id DESC");
        }
        push_page(&mut select, page);
        let rows = select
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, count, page))
    }

    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>> {
        let n = sqlx::query_as::<_, Notification>(&format!(
            "{NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(n)
    }

    async fn set_notification_read(
        &self,
        id: i64,
        read: bool,
    ) -> RepoResult<Option<Notification>> {
        let n = sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET read = $2, updated_at = NOW() \
             WHERE id = $1{NOTIFICATION_RETURNING}"
        ))
        .bind(id)
        .bind(read)
        .fetch_optional(&self.pool)
        .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("rust"), "%rust%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("c:\\dev"), "%c:\\\\dev%");
    }
}
