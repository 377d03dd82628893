use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod admin;
pub mod locks;
pub mod transitions;

pub use admin::{AdminEdit, AdminEditOutcome, StatusChange, TranslatorRef};
pub use locks::JobLocks;
pub use transitions::Trigger;

use crate::assignment::{AcceptOutcome, AssignmentProtocol};
use crate::config::ScheduleConfig;
use crate::domain::{
    Assignment, AssignmentMark, Certification, Gender, Job, JobStatus, Role, UserProfile,
};
use crate::error::{BookingError, BookingResult};
use crate::matcher::TranslatorMatcher;
use crate::notify::{DispatchReport, Dispatcher, Messages, NotificationGateway, NotificationPolicy};
use crate::store::{JobStore, PreferenceStore};
use crate::time::{session_time, will_expire_at, Clock, IMMEDIATE_LEAD_MINUTES};

const CANCEL_ATTEMPTS: usize = 3;

/// Booking form as submitted by a customer, or by an admin on a customer's
/// behalf (`requester_id` set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBooking {
    pub requester_id: Option<Uuid>,
    pub from_language_id: Option<i32>,
    pub duration: Option<i32>,
    pub immediate: bool,
    pub due: Option<DateTime<Utc>>,
    pub job_for: Vec<String>,
    pub phone: bool,
    pub physical: bool,
    pub town: Option<String>,
    pub reference: Option<String>,
    pub contact_email: Option<String>,
}

/// The job state machine and every side effect its transitions fire.
#[derive(Clone)]
pub struct BookingService {
    jobs: Arc<dyn JobStore>,
    preferences: Arc<dyn PreferenceStore>,
    matcher: TranslatorMatcher,
    protocol: AssignmentProtocol,
    dispatcher: Dispatcher,
    messages: Messages,
    clock: Arc<dyn Clock>,
    locks: JobLocks,
    support_phone: String,
}

impl BookingService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        preferences: Arc<dyn PreferenceStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        schedule: ScheduleConfig,
        support_phone: impl Into<String>,
    ) -> Self {
        Self {
            matcher: TranslatorMatcher::new(jobs.clone(), preferences.clone()),
            protocol: AssignmentProtocol::new(jobs.clone()),
            dispatcher: Dispatcher::new(gateway, NotificationPolicy::new(schedule), clock.clone()),
            messages: Messages::new(schedule.offset()),
            jobs,
            preferences,
            clock,
            locks: JobLocks::default(),
            support_phone: support_phone.into(),
        }
    }

    pub fn matcher(&self) -> &TranslatorMatcher {
        &self.matcher
    }

    pub async fn job(&self, job_id: Uuid) -> BookingResult<Job> {
        self.load(job_id).await
    }

    pub async fn assignments(&self, job_id: Uuid) -> BookingResult<Vec<Assignment>> {
        self.load(job_id).await?;
        Ok(self.jobs.assignments(job_id).await?)
    }

    pub async fn create_job(&self, acting: &UserProfile, form: NewBooking) -> BookingResult<Job> {
        let requester = match acting.role {
            Role::Customer => acting.clone(),
            role if role.is_admin() => {
                let Some(requester_id) = form.requester_id else {
                    return Err(BookingError::validation(
                        "requester_id",
                        "choose the customer the booking is for",
                    ));
                };
                match self.preferences.profile(requester_id).await? {
                    Some(profile) if profile.role == Role::Customer => profile,
                    Some(_) => {
                        return Err(BookingError::validation(
                            "requester_id",
                            "bookings can only be made for customers",
                        ))
                    }
                    None => return Err(BookingError::NotFound("requester")),
                }
            }
            _ => return Err(BookingError::Forbidden("only customers can book interpreters")),
        };

        let Some(from_language_id) = form.from_language_id else {
            return Err(BookingError::validation("from_language_id", "language is required"));
        };
        let duration = match form.duration {
            Some(duration) if duration > 0 => duration,
            _ => return Err(BookingError::validation("duration", "duration is required")),
        };

        let now = self.clock.now();
        let (due, phone) = if form.immediate {
            (now + Duration::minutes(IMMEDIATE_LEAD_MINUTES), true)
        } else {
            let Some(due) = form.due else {
                return Err(BookingError::validation("due", "due time is required"));
            };
            if due < now {
                return Err(BookingError::validation("due", "due time is in the past"));
            }
            if !form.phone && !form.physical {
                return Err(BookingError::validation(
                    "physical",
                    "choose phone, on-site or both",
                ));
            }
            (due, form.phone)
        };

        let job = Job {
            id: Uuid::new_v4(),
            requester_id: requester.id,
            from_language_id,
            duration,
            immediate: form.immediate,
            due,
            status: JobStatus::Pending,
            job_type: requester
                .preferences
                .consumer_type
                .map(|consumer| consumer.job_type()),
            certification: Certification::from_job_for(&form.job_for),
            gender: Gender::from_job_for(&form.job_for),
            phone,
            physical: form.physical,
            town: form
                .town
                .filter(|town| !town.trim().is_empty())
                .or_else(|| requester.preferences.town.clone()),
            admin_comment: None,
            reference: form.reference,
            contact_email: form.contact_email.filter(|email| !email.trim().is_empty()),
            by_admin: acting.role.is_admin(),
            session_time: None,
            end_at: None,
            withdraw_at: None,
            created_at: now,
            will_expire_at: will_expire_at(due, now),
            reopened_as: None,
        };
        self.jobs.insert(&job).await?;
        info!(
            job_id = %job.id,
            requester_id = %job.requester_id,
            immediate = job.immediate,
            by_admin = job.by_admin,
            "job created"
        );

        let email = job
            .contact_email
            .clone()
            .unwrap_or_else(|| requester.email.clone());
        self.dispatcher
            .email(self.messages.job_created_email(&job, &email, &requester.name))
            .await;
        self.broadcast(&job, None).await?;
        Ok(job)
    }

    /// A translator accepting a job. Losing the race is a normal outcome.
    pub async fn accept_job(
        &self,
        job_id: Uuid,
        acting: &UserProfile,
    ) -> BookingResult<AcceptOutcome> {
        if acting.role != Role::Translator {
            return Err(BookingError::Forbidden("only translators can accept bookings"));
        }
        let outcome = self
            .protocol
            .accept(job_id, acting.id, self.clock.now())
            .await?;

        if let AcceptOutcome::Accepted { job, .. } = &outcome {
            let (email, name, requester) = self.requester_contact(job).await?;
            self.dispatcher
                .email(self.messages.job_accepted_email(job, &email, &name, acting))
                .await;
            let language = self.language(job.from_language_id).await?;
            self.dispatcher
                .push_one(&requester, &self.messages.job_accepted(job, &language))
                .await;
        }
        Ok(outcome)
    }

    /// Cancels on behalf of the requester (or an admin), or hands the job
    /// back when the acting user is the assigned translator.
    pub async fn cancel_job(&self, job_id: Uuid, acting: &UserProfile) -> BookingResult<Job> {
        let guard = self.locks.lock(job_id).await;
        let job = self.load(job_id).await?;

        if acting.role == Role::Translator {
            return self.translator_cancel(guard, job, acting).await;
        }
        if acting.id != job.requester_id && !acting.role.is_admin() {
            return Err(BookingError::Forbidden("not your booking"));
        }
        self.requester_cancel(guard, job, acting).await
    }

    async fn requester_cancel(
        &self,
        guard: OwnedMutexGuard<()>,
        mut job: Job,
        acting: &UserProfile,
    ) -> BookingResult<Job> {
        let mut attempts = 0;
        let (from, now) = loop {
            attempts += 1;
            let now = self.clock.now();
            let target = withdraw_status(job.due, now);
            transitions::ensure(job.status, target, Trigger::RequesterCancel)?;
            if self
                .jobs
                .compare_and_set_status(job.id, job.status, target)
                .await?
            {
                let from = job.status;
                job.status = target;
                break (from, now);
            }
            // An accept slipped in between the read and the write.
            if attempts >= CANCEL_ATTEMPTS {
                let fresh = self.load(job.id).await?;
                return Err(BookingError::InvalidTransition {
                    from: fresh.status,
                    to: target,
                });
            }
            job = self.load(job.id).await?;
        };

        job.withdraw_at = Some(now);
        let translator = match self.jobs.current_assignment(job.id).await? {
            Some(assignment) => {
                self.jobs
                    .close_assignment(assignment.id, AssignmentMark::Cancelled { at: now })
                    .await?;
                self.preferences.profile(assignment.translator_id).await?
            }
            None => None,
        };
        self.jobs.save(&job).await?;
        info!(
            job_id = %job.id,
            actor_id = %acting.id,
            from = %from,
            to = %job.status,
            "job cancelled"
        );
        drop(guard);

        if let Some(translator) = translator {
            let language = self.language(job.from_language_id).await?;
            self.dispatcher
                .push_one(&translator, &self.messages.job_cancelled(&job, &language))
                .await;
        }
        Ok(job)
    }

    async fn translator_cancel(
        &self,
        guard: OwnedMutexGuard<()>,
        mut job: Job,
        acting: &UserProfile,
    ) -> BookingResult<Job> {
        let assignment = match self.jobs.current_assignment(job.id).await? {
            Some(assignment) if assignment.translator_id == acting.id => assignment,
            _ => return Err(BookingError::Forbidden("you are not assigned to this booking")),
        };
        transitions::ensure(job.status, JobStatus::Pending, Trigger::TranslatorCancel)?;

        let now = self.clock.now();
        if job.due - now <= Duration::hours(24) {
            return Err(BookingError::Policy {
                message: format!(
                    "Bookings due within 24 hours cannot be cancelled here. Please call {} instead.",
                    self.support_phone
                ),
            });
        }

        self.jobs
            .close_assignment(assignment.id, AssignmentMark::Cancelled { at: now })
            .await?;
        if !self
            .jobs
            .compare_and_set_status(job.id, JobStatus::Assigned, JobStatus::Pending)
            .await?
        {
            let fresh = self.load(job.id).await?;
            return Err(BookingError::InvalidTransition {
                from: fresh.status,
                to: JobStatus::Pending,
            });
        }
        job.status = JobStatus::Pending;
        info!(job_id = %job.id, translator_id = %acting.id, "translator handed job back");
        drop(guard);

        let (_, _, requester) = self.requester_contact(&job).await?;
        let language = self.language(job.from_language_id).await?;
        self.dispatcher
            .push_one(&requester, &self.messages.translator_withdrew(&job, &language))
            .await;
        self.broadcast(&job, Some(acting.id)).await?;
        Ok(job)
    }

    /// Ends a started session; records the elapsed time since the due time.
    pub async fn end_session(&self, job_id: Uuid, acting: &UserProfile) -> BookingResult<Job> {
        let guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;
        let assignment = self.jobs.current_assignment(job_id).await?;
        let is_translator = assignment
            .as_ref()
            .is_some_and(|assignment| assignment.translator_id == acting.id);
        if acting.id != job.requester_id && !is_translator && !acting.role.is_admin() {
            return Err(BookingError::Forbidden("not your booking"));
        }
        transitions::ensure(job.status, JobStatus::Completed, Trigger::EndSession)?;

        let now = self.clock.now();
        self.move_status(&job, JobStatus::Completed).await?;
        job.status = JobStatus::Completed;
        job.end_at = Some(now);
        job.session_time = Some(session_time(job.due, now));
        if let Some(assignment) = &assignment {
            self.jobs
                .close_assignment(
                    assignment.id,
                    AssignmentMark::Completed {
                        at: now,
                        by: acting.id,
                    },
                )
                .await?;
        }
        self.jobs.save(&job).await?;
        info!(
            job_id = %job.id,
            actor_id = %acting.id,
            session_time = job.session_time.as_deref().unwrap_or(""),
            "session ended"
        );
        drop(guard);

        let (email, name, _) = self.requester_contact(&job).await?;
        self.send_session_ended(&job, &email, &name).await?;
        Ok(job)
    }

    /// The requester reports that the session never took place.
    pub async fn customer_no_show(&self, job_id: Uuid, acting: &UserProfile) -> BookingResult<Job> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;
        if acting.id != job.requester_id && !acting.role.is_admin() {
            return Err(BookingError::Forbidden("not your booking"));
        }
        transitions::ensure(
            job.status,
            JobStatus::NotCarriedOutCustomer,
            Trigger::CustomerNoShow,
        )?;

        let now = self.clock.now();
        self.move_status(&job, JobStatus::NotCarriedOutCustomer).await?;
        job.status = JobStatus::NotCarriedOutCustomer;
        job.end_at = Some(now);
        job.session_time = Some(session_time(job.due, now));
        if let Some(assignment) = self.jobs.current_assignment(job_id).await? {
            self.jobs
                .close_assignment(
                    assignment.id,
                    AssignmentMark::Completed {
                        at: now,
                        by: assignment.translator_id,
                    },
                )
                .await?;
        }
        self.jobs.save(&job).await?;
        info!(job_id = %job.id, actor_id = %acting.id, "customer did not show");
        Ok(job)
    }

    /// Puts a job back on the market. Timed-out jobs are cloned into a new
    /// booking; everything else is reopened in place.
    pub async fn reopen(&self, job_id: Uuid, acting: &UserProfile) -> BookingResult<Job> {
        if !acting.role.is_admin() {
            return Err(BookingError::Forbidden("only admins may reopen bookings"));
        }
        let guard = self.locks.lock(job_id).await;
        let job = self.load(job_id).await?;
        transitions::ensure(job.status, JobStatus::Pending, Trigger::Reopen)?;
        ensure_not_replaced(&job, JobStatus::Pending)?;

        let now = self.clock.now();
        let history = self.jobs.assignments(job_id).await?;
        if let Some(open) = history.iter().find(|assignment| assignment.is_open()) {
            self.jobs
                .close_assignment(open.id, AssignmentMark::Cancelled { at: now })
                .await?;
        }
        let previous_translator = latest(&history).map(|assignment| assignment.translator_id);

        let reopened = if job.status == JobStatus::Timedout {
            let copy = Job {
                id: Uuid::new_v4(),
                status: JobStatus::Pending,
                admin_comment: Some(format!(
                    "This booking is a reopening of booking #{}",
                    job.id
                )),
                reopened_as: None,
                ..reset_for_market(job.clone(), now)
            };
            // The old row leaves the claimable set before the copy exists.
            if !self
                .jobs
                .supersede(job.id, JobStatus::Timedout, copy.id)
                .await?
            {
                let fresh = self.load(job.id).await?;
                return Err(BookingError::InvalidTransition {
                    from: fresh.status,
                    to: JobStatus::Pending,
                });
            }
            self.jobs.insert(&copy).await?;
            copy
        } else {
            self.move_status(&job, JobStatus::Pending).await?;
            let reset = Job {
                status: JobStatus::Pending,
                ..reset_for_market(job.clone(), now)
            };
            self.jobs.save(&reset).await?;
            reset
        };

        if let Some(translator_id) = previous_translator {
            self.jobs
                .record_assignment(&Assignment {
                    id: Uuid::new_v4(),
                    job_id: reopened.id,
                    translator_id,
                    accepted_at: now,
                    completed_at: None,
                    completed_by: None,
                    cancelled_at: Some(now),
                })
                .await?;
        }
        info!(
            job_id = %reopened.id,
            reopened_from = %job.id,
            actor_id = %acting.id,
            from = %job.status,
            "job reopened"
        );
        drop(guard);

        let (email, name, _) = self.requester_contact(&reopened).await?;
        self.dispatcher
            .email(self.messages.job_reopened_email(&reopened, &email, &name))
            .await;
        self.broadcast(&reopened, None).await?;
        Ok(reopened)
    }

    /// Time-based sweep trigger: nobody accepted in time.
    pub async fn expire(&self, job_id: Uuid) -> BookingResult<Job> {
        let guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;
        transitions::ensure(job.status, JobStatus::Timedout, Trigger::Expire)?;
        self.move_status(&job, JobStatus::Timedout).await?;
        job.status = JobStatus::Timedout;
        info!(job_id = %job.id, "job expired");
        drop(guard);

        let (_, _, requester) = self.requester_contact(&job).await?;
        let language = self.language(job.from_language_id).await?;
        self.dispatcher
            .push_one(&requester, &self.messages.job_expired(&job, &language))
            .await;
        Ok(job)
    }

    /// Expires every pending job whose offer window closed by `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> BookingResult<Vec<Uuid>> {
        let due: Vec<Job> = self
            .jobs
            .jobs_with_status(JobStatus::Pending)
            .await?
            .into_iter()
            .filter(|job| job.will_expire_at <= now)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for job in due {
            match self.expire(job.id).await {
                Ok(job) => expired.push(job.id),
                Err(BookingError::InvalidTransition { from, .. }) => {
                    debug!(job_id = %job.id, status = %from, "job left pending before expiry");
                }
                Err(err) => warn!(job_id = %job.id, error = %err, "failed to expire job"),
            }
        }
        Ok(expired)
    }

    pub async fn get_candidates(&self, job_id: Uuid) -> BookingResult<Vec<UserProfile>> {
        let job = self.load(job_id).await?;
        Ok(self.matcher.find_candidates(&job).await?)
    }

    pub async fn potential_jobs(&self, acting: &UserProfile) -> BookingResult<Vec<Job>> {
        if acting.role != Role::Translator {
            return Err(BookingError::Forbidden("only translators have potential jobs"));
        }
        Ok(self.matcher.potential_jobs(acting).await?)
    }

    pub async fn resend_push(&self, job_id: Uuid) -> BookingResult<DispatchReport> {
        let job = self.load(job_id).await?;
        self.broadcast(&job, None).await
    }

    /// Texts every current candidate; returns how many were texted.
    pub async fn resend_sms(&self, job_id: Uuid) -> BookingResult<usize> {
        let job = self.load(job_id).await?;
        let candidates = self.matcher.find_candidates(&job).await?;
        let sent = self
            .dispatcher
            .sms(job.id, &candidates, &self.messages.sms(&job))
            .await;
        info!(job_id = %job.id, sent, "sms broadcast");
        Ok(sent)
    }

    async fn load(&self, job_id: Uuid) -> BookingResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(BookingError::NotFound("job"))
    }

    async fn move_status(&self, job: &Job, to: JobStatus) -> BookingResult<()> {
        if self
            .jobs
            .compare_and_set_status(job.id, job.status, to)
            .await?
        {
            return Ok(());
        }
        let fresh = self.load(job.id).await?;
        Err(BookingError::InvalidTransition {
            from: fresh.status,
            to,
        })
    }

    async fn language(&self, language_id: i32) -> BookingResult<String> {
        Ok(self
            .preferences
            .language_name(language_id)
            .await?
            .unwrap_or_else(|| format!("language #{language_id}")))
    }

    /// Where mail about `job` goes: the booking's contact address, else the
    /// requester's own.
    async fn requester_contact(&self, job: &Job) -> BookingResult<(String, String, UserProfile)> {
        let requester = self
            .preferences
            .profile(job.requester_id)
            .await?
            .ok_or(BookingError::NotFound("requester"))?;
        let email = job
            .contact_email
            .clone()
            .unwrap_or_else(|| requester.email.clone());
        Ok((email, requester.name.clone(), requester))
    }

    async fn last_translator(&self, job_id: Uuid) -> BookingResult<Option<UserProfile>> {
        let history = self.jobs.assignments(job_id).await?;
        match latest(&history) {
            Some(assignment) => Ok(self.preferences.profile(assignment.translator_id).await?),
            None => Ok(None),
        }
    }

    async fn broadcast(&self, job: &Job, excluded: Option<Uuid>) -> BookingResult<DispatchReport> {
        let candidates = self.matcher.find_candidates_excluding(job, excluded).await?;
        let language = self.language(job.from_language_id).await?;
        let message = self.messages.new_booking(job, &language);
        Ok(self
            .dispatcher
            .push(&candidates, &message, job.immediate)
            .await)
    }
}

/// At least 24 hours ahead is an early withdrawal.
pub fn withdraw_status(due: DateTime<Utc>, now: DateTime<Utc>) -> JobStatus {
    if due - now >= Duration::hours(24) {
        JobStatus::WithdrawBefore24
    } else {
        JobStatus::WithdrawAfter24
    }
}

/// A timed-out job replaced by a reopened copy takes no further transitions.
fn ensure_not_replaced(job: &Job, to: JobStatus) -> BookingResult<()> {
    match job.reopened_as {
        Some(_) => Err(BookingError::InvalidTransition {
            from: job.status,
            to,
        }),
        None => Ok(()),
    }
}

fn latest(history: &[Assignment]) -> Option<&Assignment> {
    history.iter().max_by_key(|assignment| assignment.accepted_at)
}

fn reset_for_market(job: Job, now: DateTime<Utc>) -> Job {
    Job {
        created_at: now,
        will_expire_at: will_expire_at(job.due, now),
        withdraw_at: None,
        end_at: None,
        session_time: None,
        ..job
    }
}
