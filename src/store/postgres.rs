use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use super::{AssignmentClaim, ClaimOutcome, JobStore, PreferenceStore, StoreError, StoreResult};
use crate::assignment::{booking_conflict, is_claimable};
use crate::db::PgPool;
use crate::domain::{Assignment, AssignmentMark, AuditEntry, Job, JobStatus, Role, UserProfile};
use crate::models::{
    user_profile, AssignmentRow, JobChanges, JobRow, NewAuditRow, PreferenceRow, UserRow,
};
use crate::schema::{
    job_audit_log, jobs, languages, translator_assignments, user_languages, user_preferences,
    users, users_blacklist,
};

diesel::sql_function!(fn lower(value: diesel::sql_types::Text) -> diesel::sql_types::Text);

/// Diesel-backed implementation of both store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Early exits from the claim transaction; every variant rolls back.
enum ClaimAbort {
    Lost(ClaimOutcome),
    Store(StoreError),
}

impl From<DieselError> for ClaimAbort {
    fn from(value: DieselError) -> Self {
        ClaimAbort::Store(StoreError::Database(value))
    }
}

impl From<StoreError> for ClaimAbort {
    fn from(value: StoreError) -> Self {
        ClaimAbort::Store(value)
    }
}

fn is_unique_violation(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _
        ))
    )
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

fn load_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

fn open_jobs_for(conn: &mut PgConnection, translator_id: Uuid) -> StoreResult<Vec<Job>> {
    let rows = jobs::table
        .inner_join(translator_assignments::table)
        .filter(translator_assignments::translator_id.eq(translator_id))
        .filter(translator_assignments::completed_at.is_null())
        .filter(translator_assignments::cancelled_at.is_null())
        .select(JobRow::as_select())
        .load::<JobRow>(conn)?;
    load_jobs(rows)
}

fn claim_in_transaction(
    conn: &mut PgConnection,
    claim: AssignmentClaim,
) -> Result<ClaimOutcome, ClaimAbort> {
    // Serialises claims by the same translator so two overlapping jobs
    // cannot both pass the overlap check.
    users::table
        .find(claim.translator_id)
        .select(users::id)
        .for_update()
        .first::<Uuid>(conn)
        .optional()?;

    let row = jobs::table
        .find(claim.job_id)
        .select(JobRow::as_select())
        .for_update()
        .first::<JobRow>(conn)
        .optional()?;
    let Some(row) = row else {
        return Err(ClaimAbort::Lost(ClaimOutcome::JobNotFound));
    };
    let mut job = Job::try_from(row)?;

    let open = open_jobs_for(conn, claim.translator_id)?;
    if booking_conflict(open.iter(), &job) {
        return Err(ClaimAbort::Lost(ClaimOutcome::AlreadyBookedAtThatTime));
    }

    if !is_claimable(&job, claim.now) {
        return Err(ClaimAbort::Lost(ClaimOutcome::AlreadyTaken));
    }

    diesel::update(jobs::table.find(job.id))
        .set(jobs::status.eq(JobStatus::Assigned.as_str()))
        .execute(conn)?;

    let assignment = Assignment {
        id: Uuid::new_v4(),
        job_id: job.id,
        translator_id: claim.translator_id,
        accepted_at: claim.now,
        completed_at: None,
        completed_by: None,
        cancelled_at: None,
    };
    diesel::insert_into(translator_assignments::table)
        .values(AssignmentRow::from(&assignment))
        .execute(conn)?;

    job.status = JobStatus::Assigned;
    Ok(ClaimOutcome::Accepted { job, assignment })
}

fn load_profiles(conn: &mut PgConnection, rows: Vec<UserRow>) -> StoreResult<Vec<UserProfile>> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

    let mut preferences: HashMap<Uuid, PreferenceRow> = user_preferences::table
        .filter(user_preferences::user_id.eq_any(&ids))
        .select(PreferenceRow::as_select())
        .load::<PreferenceRow>(conn)?
        .into_iter()
        .map(|row| (row.user_id, row))
        .collect();

    let mut languages: HashMap<Uuid, Vec<i32>> = HashMap::new();
    for (user_id, language_id) in user_languages::table
        .filter(user_languages::user_id.eq_any(&ids))
        .select((user_languages::user_id, user_languages::language_id))
        .load::<(Uuid, i32)>(conn)?
    {
        languages.entry(user_id).or_default().push(language_id);
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            user_profile(
                row,
                preferences.remove(&id),
                languages.remove(&id).unwrap_or_default(),
            )
        })
        .collect()
}

#[async_trait]
impl JobStore for PgStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        self.run(move |conn| {
            jobs::table
                .find(id)
                .select(JobRow::as_select())
                .first::<JobRow>(conn)
                .optional()?
                .map(Job::try_from)
                .transpose()
        })
        .await
    }

    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let row = JobRow::from(job);
        self.run(move |conn| {
            diesel::insert_into(jobs::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn save(&self, job: &Job) -> StoreResult<()> {
        let id = job.id;
        let changes = JobChanges::from(JobRow::from(job));
        self.run(move |conn| {
            diesel::update(jobs::table.find(id))
                .set(&changes)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                jobs::table
                    .find(id)
                    .filter(jobs::status.eq(expected.as_str())),
            )
            .set(jobs::status.eq(new.as_str()))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn supersede(
        &self,
        id: Uuid,
        expected: JobStatus,
        replacement: Uuid,
    ) -> StoreResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                jobs::table
                    .find(id)
                    .filter(jobs::status.eq(expected.as_str()))
                    .filter(jobs::reopened_as.is_null()),
            )
            .set(jobs::reopened_as.eq(Some(replacement)))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn claim(&self, claim: AssignmentClaim) -> StoreResult<ClaimOutcome> {
        self.run(move |conn| {
            match conn.transaction(|conn| claim_in_transaction(conn, claim)) {
                Ok(outcome) => Ok(outcome),
                Err(ClaimAbort::Lost(outcome)) => Ok(outcome),
                Err(ClaimAbort::Store(err)) if is_unique_violation(&err) => {
                    Ok(ClaimOutcome::AlreadyTaken)
                }
                Err(ClaimAbort::Store(err)) => Err(err),
            }
        })
        .await
    }

    async fn create_assignment(
        &self,
        job_id: Uuid,
        translator_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Assignment> {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            job_id,
            translator_id,
            accepted_at: at,
            completed_at: None,
            completed_by: None,
            cancelled_at: None,
        };
        let row = AssignmentRow::from(&assignment);
        self.run(move |conn| {
            diesel::insert_into(translator_assignments::table)
                .values(&row)
                .execute(conn)
                .map_err(StoreError::from)
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::OpenAssignmentExists(job_id)
                    } else {
                        err
                    }
                })?;
            Ok(assignment)
        })
        .await
    }

    async fn record_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        let row = AssignmentRow::from(assignment);
        let job_id = assignment.job_id;
        self.run(move |conn| {
            diesel::insert_into(translator_assignments::table)
                .values(&row)
                .execute(conn)
                .map_err(StoreError::from)
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::OpenAssignmentExists(job_id)
                    } else {
                        err
                    }
                })?;
            Ok(())
        })
        .await
    }

    async fn close_assignment(&self, id: Uuid, mark: AssignmentMark) -> StoreResult<()> {
        self.run(move |conn| {
            let target = translator_assignments::table
                .find(id)
                .filter(translator_assignments::completed_at.is_null())
                .filter(translator_assignments::cancelled_at.is_null());
            match mark {
                AssignmentMark::Cancelled { at } => {
                    diesel::update(target)
                        .set(translator_assignments::cancelled_at.eq(Some(at.naive_utc())))
                        .execute(conn)?;
                }
                AssignmentMark::Completed { at, by } => {
                    diesel::update(target)
                        .set((
                            translator_assignments::completed_at.eq(Some(at.naive_utc())),
                            translator_assignments::completed_by.eq(Some(by)),
                        ))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn current_assignment(&self, job_id: Uuid) -> StoreResult<Option<Assignment>> {
        self.run(move |conn| {
            let row = translator_assignments::table
                .filter(translator_assignments::job_id.eq(job_id))
                .filter(translator_assignments::completed_at.is_null())
                .filter(translator_assignments::cancelled_at.is_null())
                .select(AssignmentRow::as_select())
                .first::<AssignmentRow>(conn)
                .optional()?;
            Ok(row.map(Assignment::from))
        })
        .await
    }

    async fn assignments(&self, job_id: Uuid) -> StoreResult<Vec<Assignment>> {
        self.run(move |conn| {
            let rows = translator_assignments::table
                .filter(translator_assignments::job_id.eq(job_id))
                .order(translator_assignments::accepted_at.asc())
                .select(AssignmentRow::as_select())
                .load::<AssignmentRow>(conn)?;
            Ok(rows.into_iter().map(Assignment::from).collect())
        })
        .await
    }

    async fn open_jobs_for_translator(&self, translator_id: Uuid) -> StoreResult<Vec<Job>> {
        self.run(move |conn| open_jobs_for(conn, translator_id)).await
    }

    async fn jobs_with_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        self.run(move |conn| {
            let rows = jobs::table
                .filter(jobs::status.eq(status.as_str()))
                .order(jobs::due.asc())
                .select(JobRow::as_select())
                .load::<JobRow>(conn)?;
            load_jobs(rows)
        })
        .await
    }

    async fn record_audit(&self, entries: &[AuditEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let rows: Vec<NewAuditRow> = entries.iter().map(NewAuditRow::from).collect();
        self.run(move |conn| {
            diesel::insert_into(job_audit_log::table)
                .values(&rows)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        self.run(move |conn| {
            let row = users::table
                .find(user_id)
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()?;
            match row {
                Some(row) => Ok(load_profiles(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        let email = email.trim().to_lowercase();
        self.run(move |conn| {
            let row = users::table
                .filter(lower(users::email).eq(&email))
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()?;
            match row {
                Some(row) => Ok(load_profiles(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn translators(&self) -> StoreResult<Vec<UserProfile>> {
        self.run(move |conn| {
            let rows = users::table
                .filter(users::role.eq(Role::Translator.as_str()))
                .filter(users::active.eq(true))
                .order(users::created_at.asc())
                .select(UserRow::as_select())
                .load::<UserRow>(conn)?;
            load_profiles(conn, rows)
        })
        .await
    }

    async fn blacklisted_translators(&self, requester_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        self.run(move |conn| {
            let ids = users_blacklist::table
                .filter(users_blacklist::requester_id.eq(requester_id))
                .select(users_blacklist::translator_id)
                .load::<Uuid>(conn)?;
            Ok(ids.into_iter().collect())
        })
        .await
    }

    async fn language_name(&self, language_id: i32) -> StoreResult<Option<String>> {
        self.run(move |conn| {
            let name = languages::table
                .find(language_id)
                .select(languages::name)
                .first::<String>(conn)
                .optional()?;
            Ok(name)
        })
        .await
    }
}
