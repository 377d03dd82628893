use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Assignment, AssignmentMark, AuditEntry, Job, JobStatus, UserProfile};

pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("job {0} already has an open assignment")]
    OpenAssignmentExists(Uuid),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything the accept critical section needs, evaluated as one unit.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentClaim {
    pub job_id: Uuid,
    pub translator_id: Uuid,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Accepted { job: Job, assignment: Assignment },
    AlreadyTaken,
    AlreadyBookedAtThatTime,
    JobNotFound,
}

/// Durable jobs and translator-assignment rows.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>>;

    async fn insert(&self, job: &Job) -> StoreResult<()>;

    /// Writes every field but `status`; statuses only move through
    /// `compare_and_set_status` and `claim`.
    async fn save(&self, job: &Job) -> StoreResult<()>;

    /// Writes `new` only when the stored status still equals `expected`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool>;

    /// Points a job at the copy that replaced it, only while its status is
    /// still `expected` and no copy has been recorded yet.
    async fn supersede(
        &self,
        id: Uuid,
        expected: JobStatus,
        replacement: Uuid,
    ) -> StoreResult<bool>;

    /// The single atomic accept unit: overlap check, status CAS and
    /// assignment insert commit together or not at all.
    async fn claim(&self, claim: AssignmentClaim) -> StoreResult<ClaimOutcome>;

    /// Opens an assignment row; fails with `OpenAssignmentExists` when the
    /// job already has one.
    async fn create_assignment(
        &self,
        job_id: Uuid,
        translator_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Assignment>;

    /// Stores an already-closed assignment row kept for history.
    async fn record_assignment(&self, assignment: &Assignment) -> StoreResult<()>;

    async fn close_assignment(&self, id: Uuid, mark: AssignmentMark) -> StoreResult<()>;

    async fn current_assignment(&self, job_id: Uuid) -> StoreResult<Option<Assignment>>;

    async fn assignments(&self, job_id: Uuid) -> StoreResult<Vec<Assignment>>;

    /// Jobs the translator holds an open assignment on.
    async fn open_jobs_for_translator(&self, translator_id: Uuid) -> StoreResult<Vec<Job>>;

    async fn jobs_with_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    async fn record_audit(&self, entries: &[AuditEntry]) -> StoreResult<()>;
}

/// Read-only view of users, their preferences and blacklists.
#[async_trait]
pub trait PreferenceStore: Send + Sync + 'static {
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>>;

    async fn profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>>;

    /// Active translators with their preferences loaded.
    async fn translators(&self) -> StoreResult<Vec<UserProfile>>;

    async fn blacklisted_translators(&self, requester_id: Uuid) -> StoreResult<HashSet<Uuid>>;

    async fn is_blacklisted(&self, requester_id: Uuid, translator_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .blacklisted_translators(requester_id)
            .await?
            .contains(&translator_id))
    }

    async fn language_name(&self, language_id: i32) -> StoreResult<Option<String>>;
}
