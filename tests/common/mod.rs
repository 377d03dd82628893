#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use booking::assignment::{booking_conflict, is_claimable};
use booking::config::{AppConfig, EmailConfig, PushConfig, ScheduleConfig, SmsConfig};
use booking::db::{self, PgPool};
use booking::domain::{
    Assignment, AssignmentMark, AuditEntry, ConsumerType, Gender, Job, JobStatus, JobType,
    Preferences, Role, TranslatorLevel, TranslatorType, UserProfile,
};
use booking::lifecycle::BookingService;
use booking::notify::{DispatchError, EmailMessage, NotificationGateway, PushMessage, Recipient};
use booking::routes;
use booking::state::AppState;
use booking::store::{
    AssignmentClaim, ClaimOutcome, JobStore, PreferenceStore, StoreError, StoreResult,
};
use booking::time::{will_expire_at, Clock};
use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const ARABIC: i32 = 1;
pub const SOMALI: i32 = 2;

/// Monday 2030-01-07 10:00 UTC, 11:00 local: business hours.
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 7, 10, 0, 0).unwrap()
}

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    assignments: Vec<Assignment>,
    audit: Vec<AuditEntry>,
    users: HashMap<Uuid, UserProfile>,
    blacklist: HashSet<(Uuid, Uuid)>,
    languages: HashMap<i32, String>,
}

impl Tables {
    fn open_jobs_for(&self, translator_id: Uuid) -> Vec<Job> {
        self.assignments
            .iter()
            .filter(|assignment| assignment.translator_id == translator_id && assignment.is_open())
            .filter_map(|assignment| self.jobs.get(&assignment.job_id).cloned())
            .collect()
    }

    fn has_open_assignment(&self, job_id: Uuid) -> bool {
        self.assignments
            .iter()
            .any(|assignment| assignment.job_id == job_id && assignment.is_open())
    }
}

/// Both store traits over one mutex, so `claim` is as atomic as the
/// Postgres transaction.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub async fn add_user(&self, user: UserProfile) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn add_language(&self, id: i32, name: &str) {
        self.tables
            .lock()
            .await
            .languages
            .insert(id, name.to_string());
    }

    pub async fn blacklist(&self, requester_id: Uuid, translator_id: Uuid) {
        self.tables
            .lock()
            .await
            .blacklist
            .insert((requester_id, translator_id));
    }

    pub async fn job(&self, id: Uuid) -> Option<Job> {
        self.tables.lock().await.jobs.get(&id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.tables.lock().await.jobs.len()
    }

    pub async fn assignments_for(&self, job_id: Uuid) -> Vec<Assignment> {
        self.tables
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| assignment.job_id == job_id)
            .cloned()
            .collect()
    }

    pub async fn open_assignments(&self, job_id: Uuid) -> usize {
        self.assignments_for(job_id)
            .await
            .iter()
            .filter(|assignment| assignment.is_open())
            .count()
    }

    pub async fn audit(&self) -> Vec<AuditEntry> {
        self.tables.lock().await.audit.clone()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn insert(&self, job: &Job) -> StoreResult<()> {
        self.tables.lock().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save(&self, job: &Job) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(stored) = tables.jobs.get_mut(&job.id) {
            let (status, reopened_as) = (stored.status, stored.reopened_as);
            *stored = Job {
                status,
                reopened_as,
                ..job.clone()
            };
        }
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.jobs.get_mut(&id) {
            Some(job) if job.status == expected => {
                job.status = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn supersede(
        &self,
        id: Uuid,
        expected: JobStatus,
        replacement: Uuid,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.jobs.get_mut(&id) {
            Some(job) if job.status == expected && job.reopened_as.is_none() => {
                job.reopened_as = Some(replacement);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim(&self, claim: AssignmentClaim) -> StoreResult<ClaimOutcome> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get(&claim.job_id).cloned() else {
            return Ok(ClaimOutcome::JobNotFound);
        };
        let open = tables.open_jobs_for(claim.translator_id);
        if booking_conflict(open.iter(), &job) {
            return Ok(ClaimOutcome::AlreadyBookedAtThatTime);
        }
        if !is_claimable(&job, claim.now) || tables.has_open_assignment(job.id) {
            return Ok(ClaimOutcome::AlreadyTaken);
        }

        let assignment = Assignment {
            id: Uuid::new_v4(),
            job_id: job.id,
            translator_id: claim.translator_id,
            accepted_at: claim.now,
            completed_at: None,
            completed_by: None,
            cancelled_at: None,
        };
        tables.assignments.push(assignment.clone());
        let stored = tables
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::Corrupt("job vanished".into()))?;
        stored.status = JobStatus::Assigned;
        Ok(ClaimOutcome::Accepted {
            job: stored.clone(),
            assignment,
        })
    }

    async fn create_assignment(
        &self,
        job_id: Uuid,
        translator_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Assignment> {
        let mut tables = self.tables.lock().await;
        if tables.has_open_assignment(job_id) {
            return Err(StoreError::OpenAssignmentExists(job_id));
        }
        let assignment = Assignment {
            id: Uuid::new_v4(),
            job_id,
            translator_id,
            accepted_at: at,
            completed_at: None,
            completed_by: None,
            cancelled_at: None,
        };
        tables.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn record_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if assignment.is_open() && tables.has_open_assignment(assignment.job_id) {
            return Err(StoreError::OpenAssignmentExists(assignment.job_id));
        }
        tables.assignments.push(assignment.clone());
        Ok(())
    }

    async fn close_assignment(&self, id: Uuid, mark: AssignmentMark) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(assignment) = tables
            .assignments
            .iter_mut()
            .find(|assignment| assignment.id == id && assignment.is_open())
        {
            match mark {
                AssignmentMark::Cancelled { at } => assignment.cancelled_at = Some(at),
                AssignmentMark::Completed { at, by } => {
                    assignment.completed_at = Some(at);
                    assignment.completed_by = Some(by);
                }
            }
        }
        Ok(())
    }

    async fn current_assignment(&self, job_id: Uuid) -> StoreResult<Option<Assignment>> {
        Ok(self
            .tables
            .lock()
            .await
            .assignments
            .iter()
            .find(|assignment| assignment.job_id == job_id && assignment.is_open())
            .cloned())
    }

    async fn assignments(&self, job_id: Uuid) -> StoreResult<Vec<Assignment>> {
        Ok(self.assignments_for(job_id).await)
    }

    async fn open_jobs_for_translator(&self, translator_id: Uuid) -> StoreResult<Vec<Job>> {
        Ok(self.tables.lock().await.open_jobs_for(translator_id))
    }

    async fn jobs_with_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        Ok(self
            .tables
            .lock()
            .await
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn record_audit(&self, entries: &[AuditEntry]) -> StoreResult<()> {
        self.tables.lock().await.audit.extend_from_slice(entries);
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn translators(&self) -> StoreResult<Vec<UserProfile>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .filter(|user| user.role == Role::Translator && user.active)
            .cloned()
            .collect())
    }

    async fn blacklisted_translators(&self, requester_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        Ok(self
            .tables
            .lock()
            .await
            .blacklist
            .iter()
            .filter(|(requester, _)| *requester == requester_id)
            .map(|(_, translator)| *translator)
            .collect())
    }

    async fn language_name(&self, language_id: i32) -> StoreResult<Option<String>> {
        Ok(self.tables.lock().await.languages.get(&language_id).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct SentPush {
    pub recipients: Vec<Uuid>,
    pub message: PushMessage,
    pub send_after: Option<DateTime<Utc>>,
}

/// Records every outbound message instead of sending it.
#[derive(Default)]
pub struct FakeGateway {
    pushes: Mutex<Vec<SentPush>>,
    sms: Mutex<Vec<(String, String)>>,
    emails: Mutex<Vec<EmailMessage>>,
    fail_push: AtomicBool,
    stall_push: AtomicBool,
    stalled: Notify,
    resume: Notify,
}

impl FakeGateway {
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Holds the next push inside the gateway until `resume_pushes`.
    pub fn stall_pushes(&self) {
        self.stall_push.store(true, Ordering::SeqCst);
    }

    pub async fn wait_for_stalled_push(&self) {
        self.stalled.notified().await;
    }

    pub fn resume_pushes(&self) {
        self.stall_push.store(false, Ordering::SeqCst);
        self.resume.notify_one();
    }

    pub async fn pushes(&self) -> Vec<SentPush> {
        self.pushes.lock().await.clone()
    }

    pub async fn sms(&self) -> Vec<(String, String)> {
        self.sms.lock().await.clone()
    }

    pub async fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.pushes.lock().await.clear();
        self.sms.lock().await.clear();
        self.emails.lock().await.clear();
    }
}

#[async_trait]
impl NotificationGateway for FakeGateway {
    async fn send_push(
        &self,
        recipients: &[Recipient],
        message: &PushMessage,
        send_after: Option<DateTime<Utc>>,
    ) -> Result<(), DispatchError> {
        if self.stall_push.load(Ordering::SeqCst) {
            self.stalled.notify_one();
            self.resume.notified().await;
        }
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected {
                channel: "push",
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.pushes.lock().await.push(SentPush {
            recipients: recipients.iter().map(|recipient| recipient.user_id).collect(),
            message: message.clone(),
            send_after,
        });
        Ok(())
    }

    async fn send_sms(&self, to: &str, text: &str) -> Result<(), DispatchError> {
        self.sms
            .lock()
            .await
            .push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        self.emails.lock().await.push(message.clone());
        Ok(())
    }
}

/// Clock tests move by hand.
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn customer(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@customer.example", name.to_lowercase()),
        mobile: None,
        role: Role::Customer,
        active: true,
        preferences: Preferences {
            consumer_type: Some(ConsumerType::Paid),
            town: Some("Stockholm".into()),
            ..Preferences::default()
        },
    }
}

/// Paid, certified, Arabic-speaking translator in Stockholm.
pub fn translator(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@translator.example", name.to_lowercase()),
        mobile: Some(format!("+4670{}", name.len())),
        role: Role::Translator,
        active: true,
        preferences: Preferences {
            translator_type: Some(TranslatorType::Professional),
            level: Some(TranslatorLevel::Certified),
            gender: Some(Gender::Female),
            town: Some("Stockholm".into()),
            languages: [ARABIC].into_iter().collect(),
            ..Preferences::default()
        },
    }
}

pub fn admin(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@admin.example", name.to_lowercase()),
        mobile: None,
        role: Role::Admin,
        active: true,
        preferences: Preferences::default(),
    }
}

/// A pending paid phone booking for `requester`, due `lead` from `now`.
pub fn pending_job(requester: &UserProfile, now: DateTime<Utc>, lead: Duration) -> Job {
    let due = now + lead;
    Job {
        id: Uuid::new_v4(),
        requester_id: requester.id,
        from_language_id: ARABIC,
        duration: 60,
        immediate: false,
        due,
        status: JobStatus::Pending,
        job_type: Some(JobType::Paid),
        certification: None,
        gender: None,
        phone: true,
        physical: false,
        town: Some("Stockholm".into()),
        admin_comment: None,
        reference: None,
        contact_email: None,
        by_admin: false,
        session_time: None,
        end_at: None,
        withdraw_at: None,
        created_at: now,
        will_expire_at: will_expire_at(due, now),
        reopened_as: None,
    }
}

/// The booking engine wired to in-memory fakes.
pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<FixedClock>,
    pub service: BookingService,
}

impl Engine {
    pub async fn new() -> Self {
        Self::at(monday_morning()).await
    }

    pub async fn at(now: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::default());
        store.add_language(ARABIC, "Arabic").await;
        store.add_language(SOMALI, "Somali").await;
        let gateway = Arc::new(FakeGateway::default());
        let clock = Arc::new(FixedClock::new(now));

        let jobs: Arc<dyn JobStore> = store.clone();
        let preferences: Arc<dyn PreferenceStore> = store.clone();
        let notifications: Arc<dyn NotificationGateway> = gateway.clone();
        let time: Arc<dyn Clock> = clock.clone();
        let service = BookingService::new(
            jobs,
            preferences,
            notifications,
            time,
            ScheduleConfig::default(),
            "+46 8 000 00 00",
        );

        Self {
            store,
            gateway,
            clock,
            service,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn add(&self, user: UserProfile) -> UserProfile {
        self.store.add_user(user.clone()).await;
        user
    }

    /// Stores a pending job due `lead` from now.
    pub async fn pending(&self, requester: &UserProfile, lead: Duration) -> Result<Job> {
        let job = pending_job(requester, self.now(), lead);
        self.store.insert(&job).await?;
        Ok(job)
    }

    /// Stores a job and puts `translator` on it through the accept path.
    pub async fn assigned(
        &self,
        requester: &UserProfile,
        translator: &UserProfile,
        lead: Duration,
    ) -> Result<Job> {
        let job = self.pending(requester, lead).await?;
        let outcome = self.service.accept_job(job.id, translator).await?;
        anyhow::ensure!(outcome.is_accepted(), "accept failed: {outcome:?}");
        self.reload(job.id).await
    }

    /// An assigned job forced to `started`, the way an admin would.
    pub async fn started(
        &self,
        requester: &UserProfile,
        translator: &UserProfile,
        lead: Duration,
    ) -> Result<Job> {
        let job = self.assigned(requester, translator, lead).await?;
        anyhow::ensure!(
            self.store
                .compare_and_set_status(job.id, JobStatus::Assigned, JobStatus::Started)
                .await?,
            "could not start job"
        );
        self.reload(job.id).await
    }

    pub async fn reload(&self, id: Uuid) -> Result<Job> {
        self.store
            .job(id)
            .await
            .ok_or_else(|| anyhow!("job {id} missing"))
    }
}

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        push: PushConfig {
            api_url: "http://push.invalid".to_string(),
            app_id: None,
            api_key: None,
        },
        sms: SmsConfig {
            api_url: None,
            username: None,
            password: None,
            sender: "Test".to_string(),
        },
        email: EmailConfig {
            api_url: None,
            api_key: None,
            sender: "noreply@test".to_string(),
        },
        schedule: ScheduleConfig::default(),
        support_phone: "+46 8 000 00 00".to_string(),
        sweep_interval_secs: 60,
        notify_timeout_secs: 10,
    }
}

/// The HTTP router over an in-memory engine.
pub struct TestApp {
    pub engine: Engine,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let engine = Engine::new().await;
        let preferences: Arc<dyn PreferenceStore> = engine.store.clone();
        let state = AppState::new(
            test_config("postgres://unused"),
            engine.service.clone(),
            preferences,
        );
        let router = routes::create_router(state);
        Self { engine, router }
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        acting: Option<Uuid>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(acting) = acting {
            builder = builder.header("x-acting-user", acting.to_string());
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        acting: Option<Uuid>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, acting).await
    }

    pub async fn post(&self, path: &str, acting: Option<Uuid>) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, &serde_json::json!({}), acting)
            .await
    }

    pub async fn get(&self, path: &str, acting: Option<Uuid>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(acting) = acting {
            builder = builder.header("x-acting-user", acting.to_string());
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<serde_json::Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// A migrated, emptied database from `TEST_DATABASE_URL`, or `None` when the
/// variable is unset.
pub async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return Ok(None);
    };
    let pool = db::init_pool_with_size(&database_url, db::DEFAULT_MAX_POOL_SIZE)?;
    db::run_migrations(&pool).await?;
    with_conn(&pool, truncate_all).await?;
    Ok(Some(pool))
}

pub async fn with_conn<F, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
        f(&mut conn)
    })
    .await
    .context("connection task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE job_audit_log, translator_assignments, jobs, users_blacklist, \
         user_languages, user_preferences, languages, users CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
