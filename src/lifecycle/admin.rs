use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::transitions::{self, Trigger};
use super::{ensure_not_replaced, BookingService};
use crate::domain::{AssignmentMark, AuditEntry, Job, JobStatus, Role, UserProfile};
use crate::error::{BookingError, BookingResult};
use crate::notify::messages::SessionParty;
use crate::notify::EmailTemplate;
use crate::time::{parse_session_time, will_expire_at};

/// Translator picked by an admin, by id or by e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranslatorRef {
    Id(Uuid),
    Email(String),
}

/// Fields an admin may change in one edit; `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminEdit {
    pub due: Option<DateTime<Utc>>,
    pub from_language_id: Option<i32>,
    pub translator: Option<TranslatorRef>,
    pub status: Option<JobStatus>,
    pub admin_comment: Option<String>,
    pub session_time: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StatusChange {
    NotRequested,
    Changed { from: JobStatus, to: JobStatus },
    /// A companion field was missing; nothing was written.
    NotChanged { field: &'static str },
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminEditOutcome {
    pub job: Job,
    pub status: StatusChange,
    pub audit: Vec<AuditEntry>,
    /// False when the due time had already passed and change notices were
    /// skipped.
    pub notified: bool,
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

/// Companion fields an admin status change needs. Returns the first missing
/// field.
pub fn missing_field(
    from: JobStatus,
    to: JobStatus,
    edit: &AdminEdit,
    translator_changed: bool,
) -> Option<&'static str> {
    use JobStatus::*;

    let comment = has_text(edit.admin_comment.as_deref());
    match (from, to) {
        (Pending, Assigned) => {
            if !translator_changed {
                Some("translator")
            } else if !comment {
                Some("admin_comment")
            } else {
                None
            }
        }
        (Timedout, Assigned) if !translator_changed => Some("translator"),
        (_, Timedout) if from != WithdrawAfter24 && !comment => Some("admin_comment"),
        (Assigned, Started) | (Started, NotCarriedOutCustomer) if !comment => {
            Some("admin_comment")
        }
        (Started, Completed) => {
            if !comment {
                Some("admin_comment")
            } else if edit
                .session_time
                .as_deref()
                .and_then(parse_session_time)
                .is_none()
            {
                Some("session_time")
            } else {
                None
            }
        }
        _ => None,
    }
}

fn audit(
    job_id: Uuid,
    actor_id: Uuid,
    field: &str,
    old: Option<String>,
    new: Option<String>,
    at: DateTime<Utc>,
) -> AuditEntry {
    AuditEntry {
        job_id,
        actor_id,
        field: field.to_string(),
        old_value: old,
        new_value: new,
        recorded_at: at,
    }
}

impl BookingService {
    /// Admin edit of due time, language, translator, status, comment and
    /// reference. Applied under the job lock; notices go out after it is
    /// released.
    pub async fn update_job(
        &self,
        job_id: Uuid,
        acting: &UserProfile,
        edit: AdminEdit,
    ) -> BookingResult<AdminEditOutcome> {
        if !acting.role.is_admin() {
            return Err(BookingError::Forbidden("only admins may edit bookings"));
        }
        let guard = self.locks.lock(job_id).await;
        let now = self.clock.now();

        let original = self.load(job_id).await?;
        let mut job = original.clone();
        let current = self.jobs.current_assignment(job_id).await?;
        let outgoing = match &current {
            Some(assignment) => self.preferences.profile(assignment.translator_id).await?,
            None => None,
        };

        let incoming = match &edit.translator {
            Some(reference) => Some(self.resolve_translator(reference).await?),
            None => None,
        };
        let incoming = incoming.filter(|translator| {
            current
                .as_ref()
                .map_or(true, |assignment| assignment.translator_id != translator.id)
        });
        let translator_changed = incoming.is_some();

        let from = job.status;
        let target = edit.status.filter(|status| *status != from);
        if let Some(to) = target {
            transitions::ensure(from, to, Trigger::Admin)?;
            ensure_not_replaced(&job, to)?;
            if let Some(field) = missing_field(from, to, &edit, translator_changed) {
                return Ok(AdminEditOutcome {
                    job: original,
                    status: StatusChange::NotChanged { field },
                    audit: Vec::new(),
                    notified: false,
                });
            }
        }
        let final_status = target.unwrap_or(from);
        if translator_changed && !final_status.holds_assignment() {
            return Ok(AdminEditOutcome {
                job: original,
                status: StatusChange::NotChanged {
                    field: "translator",
                },
                audit: Vec::new(),
                notified: false,
            });
        }

        let mut entries = Vec::new();

        let old_due = job.due;
        let due_changed = edit.due.is_some_and(|due| due != job.due);
        if let Some(due) = edit.due.filter(|_| due_changed) {
            entries.push(audit(
                job.id,
                acting.id,
                "due",
                Some(old_due.to_rfc3339()),
                Some(due.to_rfc3339()),
                now,
            ));
            job.due = due;
        }

        let old_language = job.from_language_id;
        let language_changed = edit
            .from_language_id
            .is_some_and(|language| language != job.from_language_id);
        if let Some(language) = edit.from_language_id.filter(|_| language_changed) {
            entries.push(audit(
                job.id,
                acting.id,
                "language",
                Some(self.language(old_language).await?),
                Some(self.language(language).await?),
                now,
            ));
            job.from_language_id = language;
        }

        if let Some(comment) = edit.admin_comment.as_deref() {
            job.admin_comment = Some(comment.to_string());
        }
        if let Some(reference) = edit.reference.as_deref() {
            job.reference = Some(reference.to_string());
        }

        // Status first, so an accept racing this edit is detected before any
        // assignment rows move.
        if let Some(to) = target {
            if !self.jobs.compare_and_set_status(job.id, from, to).await? {
                let fresh = self.load(job_id).await?;
                return Err(BookingError::InvalidTransition {
                    from: fresh.status,
                    to,
                });
            }
            job.status = to;
            entries.push(audit(
                job.id,
                acting.id,
                "status",
                Some(from.to_string()),
                Some(to.to_string()),
                now,
            ));
        }

        let mut assigned = current.clone();
        if let Some(translator) = &incoming {
            if let Some(old) = &current {
                self.jobs
                    .close_assignment(old.id, AssignmentMark::Cancelled { at: now })
                    .await?;
            }
            assigned = Some(
                self.jobs
                    .create_assignment(job.id, translator.id, now)
                    .await?,
            );
            entries.push(audit(
                job.id,
                acting.id,
                "translator",
                outgoing.as_ref().map(|user| user.email.clone()),
                Some(translator.email.clone()),
                now,
            ));
        }

        if let Some(to) = target {
            let assignment_id = assigned.as_ref().map(|assignment| assignment.id);
            self.apply_admin_status(&mut job, from, to, &edit, acting, now, assignment_id)
                .await?;
        }

        self.jobs.save(&job).await?;
        self.jobs.record_audit(&entries).await?;
        for entry in &entries {
            info!(
                job_id = %job.id,
                actor_id = %acting.id,
                field = %entry.field,
                old = entry.old_value.as_deref().unwrap_or(""),
                new = entry.new_value.as_deref().unwrap_or(""),
                "booking updated"
            );
        }
        drop(guard);

        if let Some(to) = target {
            self.after_admin_status(&job, from, to, incoming.as_ref()).await?;
        }

        let notified = job.due > now;
        if notified {
            self.send_change_notices(
                &job,
                due_changed.then_some(old_due),
                language_changed.then_some(old_language),
                incoming.as_ref(),
                outgoing.as_ref(),
            )
            .await?;
        }

        Ok(AdminEditOutcome {
            status: match target {
                Some(to) => StatusChange::Changed { from, to },
                None => StatusChange::NotRequested,
            },
            job,
            audit: entries,
            notified,
        })
    }

    /// Status-only admin edit.
    pub async fn change_status(
        &self,
        job_id: Uuid,
        acting: &UserProfile,
        status: JobStatus,
        context: AdminEdit,
    ) -> BookingResult<StatusChange> {
        let edit = AdminEdit {
            status: Some(status),
            ..context
        };
        Ok(self.update_job(job_id, acting, edit).await?.status)
    }

    async fn resolve_translator(&self, reference: &TranslatorRef) -> BookingResult<UserProfile> {
        let profile = match reference {
            TranslatorRef::Id(id) => self.preferences.profile(*id).await?,
            TranslatorRef::Email(email) => self.preferences.profile_by_email(email).await?,
        };
        match profile {
            Some(profile) if profile.role == Role::Translator => Ok(profile),
            Some(_) => Err(BookingError::validation(
                "translator",
                "user is not a translator",
            )),
            None => Err(BookingError::NotFound("translator")),
        }
    }

    /// Field updates and assignment bookkeeping of an admin status change,
    /// before the job row is saved.
    #[allow(clippy::too_many_arguments)]
    async fn apply_admin_status(
        &self,
        job: &mut Job,
        from: JobStatus,
        to: JobStatus,
        edit: &AdminEdit,
        acting: &UserProfile,
        now: DateTime<Utc>,
        assignment_id: Option<Uuid>,
    ) -> BookingResult<()> {
        use JobStatus::*;

        match (from, to) {
            (Pending | Assigned, WithdrawBefore24 | WithdrawAfter24) => {
                job.withdraw_at = Some(now);
            }
            (Started, Completed) => {
                job.end_at = Some(now);
                job.session_time = edit.session_time.as_deref().and_then(parse_session_time);
            }
            (Timedout, Pending) => {
                job.created_at = now;
                job.will_expire_at = will_expire_at(job.due, now);
            }
            _ => {}
        }

        let Some(assignment_id) = assignment_id else {
            return Ok(());
        };
        let mark = match (from, to) {
            (Assigned, WithdrawBefore24 | WithdrawAfter24 | Timedout) => {
                Some(AssignmentMark::Cancelled { at: now })
            }
            (Started, Completed) => Some(AssignmentMark::Completed {
                at: now,
                by: acting.id,
            }),
            (Started, NotCarriedOutCustomer) => {
                let translator = self
                    .jobs
                    .current_assignment(job.id)
                    .await?
                    .map_or(acting.id, |assignment| assignment.translator_id);
                Some(AssignmentMark::Completed {
                    at: now,
                    by: translator,
                })
            }
            _ => None,
        };
        if let Some(mark) = mark {
            self.jobs.close_assignment(assignment_id, mark).await?;
        }
        Ok(())
    }

    /// Notifications for an admin status change, after it is committed.
    async fn after_admin_status(
        &self,
        job: &Job,
        from: JobStatus,
        to: JobStatus,
        incoming: Option<&UserProfile>,
    ) -> BookingResult<()> {
        use JobStatus::*;

        let (email, name, requester) = self.requester_contact(job).await?;
        match (from, to) {
            (Pending | Timedout, Assigned) => {
                let Some(translator) = incoming else {
                    return Ok(());
                };
                self.dispatcher
                    .email(self.messages.job_accepted_email(job, &email, &name, translator))
                    .await;
                if from == Pending {
                    let language = self.language(job.from_language_id).await?;
                    let reminder = self.messages.session_reminder(job, &language);
                    self.dispatcher.push_one(&requester, &reminder).await;
                    self.dispatcher.push_one(translator, &reminder).await;
                }
            }
            (Pending, WithdrawBefore24 | WithdrawAfter24 | Timedout) => {
                self.dispatcher
                    .email(self.messages.job_cancelled_email(job, &email, &name))
                    .await;
            }
            (Assigned, WithdrawBefore24 | WithdrawAfter24) => {
                self.dispatcher
                    .email(self.messages.job_cancelled_email(job, &email, &name))
                    .await;
                if let Some(translator) = self.last_translator(job.id).await? {
                    self.dispatcher
                        .email(self.messages.job_cancelled_email(
                            job,
                            &translator.email,
                            &translator.name,
                        ))
                        .await;
                }
            }
            (Started, Completed) => {
                self.send_session_ended(job, &email, &name).await?;
            }
            (Timedout, Pending) => {
                self.dispatcher
                    .email(self.messages.job_reopened_email(job, &email, &name))
                    .await;
                self.broadcast(job, None).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn send_change_notices(
        &self,
        job: &Job,
        old_due: Option<DateTime<Utc>>,
        old_language: Option<i32>,
        incoming: Option<&UserProfile>,
        outgoing: Option<&UserProfile>,
    ) -> BookingResult<()> {
        if old_due.is_none() && old_language.is_none() && incoming.is_none() {
            return Ok(());
        }
        let (email, name, _) = self.requester_contact(job).await?;
        let assigned = match self.jobs.current_assignment(job.id).await? {
            Some(assignment) => self.preferences.profile(assignment.translator_id).await?,
            None => None,
        };

        if let Some(old_due) = old_due {
            self.dispatcher
                .email(self.messages.changed_date_email(job, &email, &name, old_due))
                .await;
            if let Some(translator) = &assigned {
                self.dispatcher
                    .email(self.messages.changed_date_email(
                        job,
                        &translator.email,
                        &translator.name,
                        old_due,
                    ))
                    .await;
            }
        }

        if let Some(translator) = incoming {
            self.dispatcher
                .email(self.messages.changed_translator_email(
                    job,
                    &email,
                    &name,
                    EmailTemplate::JobChangedTranslatorCustomer,
                ))
                .await;
            if let Some(previous) = outgoing {
                self.dispatcher
                    .email(self.messages.changed_translator_email(
                        job,
                        &previous.email,
                        &previous.name,
                        EmailTemplate::JobChangedTranslatorOldTranslator,
                    ))
                    .await;
            }
            self.dispatcher
                .email(self.messages.changed_translator_email(
                    job,
                    &translator.email,
                    &translator.name,
                    EmailTemplate::JobChangedTranslatorNewTranslator,
                ))
                .await;
        }

        if let Some(old_language) = old_language {
            let old_name = self.language(old_language).await?;
            self.dispatcher
                .email(self.messages.changed_language_email(job, &email, &name, &old_name))
                .await;
            if let Some(translator) = &assigned {
                self.dispatcher
                    .email(self.messages.changed_language_email(
                        job,
                        &translator.email,
                        &translator.name,
                        &old_name,
                    ))
                    .await;
            }
        }
        Ok(())
    }

    pub(super) async fn send_session_ended(
        &self,
        job: &Job,
        email: &str,
        name: &str,
    ) -> BookingResult<()> {
        self.dispatcher
            .email(
                self.messages
                    .session_ended_email(job, email, name, SessionParty::Requester),
            )
            .await;
        if let Some(translator) = self.last_translator(job.id).await? {
            self.dispatcher
                .email(self.messages.session_ended_email(
                    job,
                    &translator.email,
                    &translator.name,
                    SessionParty::Translator,
                ))
                .await;
        }
        Ok(())
    }
}
