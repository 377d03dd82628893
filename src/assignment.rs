use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Assignment, Job, JobStatus};
use crate::error::{BookingError, BookingResult};
use crate::store::{AssignmentClaim, ClaimOutcome, JobStore};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcceptOutcome {
    Accepted { job: Job, assignment: Assignment },
    AlreadyTaken,
    AlreadyBookedAtThatTime,
}

impl AcceptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted { .. })
    }
}

fn window(job: &Job) -> (DateTime<Utc>, DateTime<Utc>) {
    let minutes = i64::from(job.duration.max(1));
    (job.due, job.due + Duration::minutes(minutes))
}

/// Two bookings collide when their `[due, due + duration)` windows overlap.
pub fn windows_overlap(a: &Job, b: &Job) -> bool {
    let (a_start, a_end) = window(a);
    let (b_start, b_end) = window(b);
    a_start < b_end && b_start < a_end
}

/// True when any of the translator's open bookings collides with `job`.
pub fn booking_conflict<'a>(open: impl IntoIterator<Item = &'a Job>, job: &Job) -> bool {
    open.into_iter()
        .filter(|other| other.id != job.id)
        .any(|other| windows_overlap(other, job))
}

/// Pending jobs can be accepted; timed-out ones only until their due time
/// and only while no reopened copy has replaced them.
pub fn is_claimable(job: &Job, now: DateTime<Utc>) -> bool {
    if job.reopened_as.is_some() {
        return false;
    }
    match job.status {
        JobStatus::Pending => true,
        JobStatus::Timedout => job.due > now,
        _ => false,
    }
}

/// First-accept-wins claim of a job by a translator.
#[derive(Clone)]
pub struct AssignmentProtocol {
    jobs: Arc<dyn JobStore>,
}

impl AssignmentProtocol {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    pub async fn accept(
        &self,
        job_id: Uuid,
        translator_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<AcceptOutcome> {
        let claim = AssignmentClaim {
            job_id,
            translator_id,
            now,
        };

        match self.jobs.claim(claim).await? {
            ClaimOutcome::Accepted { job, assignment } => {
                info!(job_id = %job.id, translator_id = %translator_id, "job accepted");
                Ok(AcceptOutcome::Accepted { job, assignment })
            }
            ClaimOutcome::AlreadyTaken => {
                debug!(job_id = %job_id, translator_id = %translator_id, "accept lost: already taken");
                Ok(AcceptOutcome::AlreadyTaken)
            }
            ClaimOutcome::AlreadyBookedAtThatTime => {
                debug!(job_id = %job_id, translator_id = %translator_id, "accept lost: translator busy");
                Ok(AcceptOutcome::AlreadyBookedAtThatTime)
            }
            ClaimOutcome::JobNotFound => Err(BookingError::NotFound("job")),
        }
    }
}
