use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{
    Assignment, AuditEntry, Job, OptOuts, Preferences, Role, UserProfile,
};
use crate::schema::*;
use crate::store::StoreError;

fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err: T::Err| StoreError::Corrupt(format!("{column}: {err}")))
}

fn parse_optional<T: FromStr>(column: &str, value: Option<&str>) -> Result<Option<T>, StoreError>
where
    T::Err: std::fmt::Display,
{
    value.map(|value| parse_column(column, value)).transpose()
}

fn utc(value: NaiveDateTime) -> DateTime<Utc> {
    value.and_utc()
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: String,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_preferences)]
pub struct PreferenceRow {
    pub user_id: Uuid,
    pub consumer_type: Option<String>,
    pub customer_type: Option<String>,
    pub translator_type: Option<String>,
    pub translator_level: Option<String>,
    pub gender: Option<String>,
    pub town: Option<String>,
    pub no_emergency: bool,
    pub no_notification: bool,
    pub accept_night_notifications: bool,
}

impl PreferenceRow {
    pub fn from_preferences(user_id: Uuid, preferences: &Preferences) -> Self {
        Self {
            user_id,
            consumer_type: preferences.consumer_type.map(|v| v.as_str().to_string()),
            customer_type: preferences.customer_type.clone(),
            translator_type: preferences.translator_type.map(|v| v.as_str().to_string()),
            translator_level: preferences.level.map(|v| v.as_str().to_string()),
            gender: preferences.gender.map(|v| v.as_str().to_string()),
            town: preferences.town.clone(),
            no_emergency: preferences.opt_outs.no_emergency,
            no_notification: preferences.opt_outs.no_notification,
            accept_night_notifications: preferences.opt_outs.accept_night_notifications,
        }
    }
}

/// Assembles a profile from its user row, optional preference row and
/// language ids.
pub fn user_profile(
    user: UserRow,
    preferences: Option<PreferenceRow>,
    languages: impl IntoIterator<Item = i32>,
) -> Result<UserProfile, StoreError> {
    let role: Role = parse_column("users.role", &user.role)?;
    let mut prefs = Preferences {
        languages: languages.into_iter().collect(),
        ..Preferences::default()
    };
    if let Some(row) = preferences {
        prefs.consumer_type = parse_optional("consumer_type", row.consumer_type.as_deref())?;
        prefs.customer_type = row.customer_type;
        prefs.translator_type =
            parse_optional("translator_type", row.translator_type.as_deref())?;
        prefs.level = parse_optional("translator_level", row.translator_level.as_deref())?;
        prefs.gender = parse_optional("gender", row.gender.as_deref())?;
        prefs.town = row.town;
        prefs.opt_outs = OptOuts {
            no_emergency: row.no_emergency,
            no_notification: row.no_notification,
            accept_night_notifications: row.accept_night_notifications,
        };
    }

    Ok(UserProfile {
        id: user.id,
        name: user.name,
        email: user.email,
        mobile: user.mobile,
        role,
        active: user.active,
        preferences: prefs,
    })
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = jobs)]
pub struct JobRow {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub from_language_id: i32,
    pub duration: i32,
    pub immediate: bool,
    pub due: NaiveDateTime,
    pub status: String,
    pub job_type: Option<String>,
    pub certification: Option<String>,
    pub gender: Option<String>,
    pub phone: bool,
    pub physical: bool,
    pub town: Option<String>,
    pub admin_comment: Option<String>,
    pub reference: Option<String>,
    pub contact_email: Option<String>,
    pub by_admin: bool,
    pub session_time: Option<String>,
    pub end_at: Option<NaiveDateTime>,
    pub withdraw_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub will_expire_at: NaiveDateTime,
    pub reopened_as: Option<Uuid>,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            requester_id: job.requester_id,
            from_language_id: job.from_language_id,
            duration: job.duration,
            immediate: job.immediate,
            due: job.due.naive_utc(),
            status: job.status.as_str().to_string(),
            job_type: job.job_type.map(|v| v.as_str().to_string()),
            certification: job.certification.map(|v| v.as_str().to_string()),
            gender: job.gender.map(|v| v.as_str().to_string()),
            phone: job.phone,
            physical: job.physical,
            town: job.town.clone(),
            admin_comment: job.admin_comment.clone(),
            reference: job.reference.clone(),
            contact_email: job.contact_email.clone(),
            by_admin: job.by_admin,
            session_time: job.session_time.clone(),
            end_at: job.end_at.map(|at| at.naive_utc()),
            withdraw_at: job.withdraw_at.map(|at| at.naive_utc()),
            created_at: job.created_at.naive_utc(),
            will_expire_at: job.will_expire_at.naive_utc(),
            reopened_as: job.reopened_as,
        }
    }
}

/// Every job column except `status` and `reopened_as`, which only move
/// through conditional updates and the accept transaction.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = jobs)]
#[diesel(treat_none_as_null = true)]
pub struct JobChanges {
    pub from_language_id: i32,
    pub duration: i32,
    pub immediate: bool,
    pub due: NaiveDateTime,
    pub job_type: Option<String>,
    pub certification: Option<String>,
    pub gender: Option<String>,
    pub phone: bool,
    pub physical: bool,
    pub town: Option<String>,
    pub admin_comment: Option<String>,
    pub reference: Option<String>,
    pub contact_email: Option<String>,
    pub by_admin: bool,
    pub session_time: Option<String>,
    pub end_at: Option<NaiveDateTime>,
    pub withdraw_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub will_expire_at: NaiveDateTime,
}

impl From<JobRow> for JobChanges {
    fn from(row: JobRow) -> Self {
        Self {
            from_language_id: row.from_language_id,
            duration: row.duration,
            immediate: row.immediate,
            due: row.due,
            job_type: row.job_type,
            certification: row.certification,
            gender: row.gender,
            phone: row.phone,
            physical: row.physical,
            town: row.town,
            admin_comment: row.admin_comment,
            reference: row.reference,
            contact_email: row.contact_email,
            by_admin: row.by_admin,
            session_time: row.session_time,
            end_at: row.end_at,
            withdraw_at: row.withdraw_at,
            created_at: row.created_at,
            will_expire_at: row.will_expire_at,
        }
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            requester_id: row.requester_id,
            from_language_id: row.from_language_id,
            duration: row.duration,
            immediate: row.immediate,
            due: utc(row.due),
            status: parse_column("jobs.status", &row.status)?,
            job_type: parse_optional("jobs.job_type", row.job_type.as_deref())?,
            certification: parse_optional("jobs.certification", row.certification.as_deref())?,
            gender: parse_optional("jobs.gender", row.gender.as_deref())?,
            phone: row.phone,
            physical: row.physical,
            town: row.town,
            admin_comment: row.admin_comment,
            reference: row.reference,
            contact_email: row.contact_email,
            by_admin: row.by_admin,
            session_time: row.session_time,
            end_at: row.end_at.map(utc),
            withdraw_at: row.withdraw_at.map(utc),
            created_at: utc(row.created_at),
            will_expire_at: utc(row.will_expire_at),
            reopened_as: row.reopened_as,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = translator_assignments)]
pub struct AssignmentRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub translator_id: Uuid,
    pub accepted_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub completed_by: Option<Uuid>,
    pub cancelled_at: Option<NaiveDateTime>,
}

impl From<&Assignment> for AssignmentRow {
    fn from(assignment: &Assignment) -> Self {
        Self {
            id: assignment.id,
            job_id: assignment.job_id,
            translator_id: assignment.translator_id,
            accepted_at: assignment.accepted_at.naive_utc(),
            completed_at: assignment.completed_at.map(|at| at.naive_utc()),
            completed_by: assignment.completed_by,
            cancelled_at: assignment.cancelled_at.map(|at| at.naive_utc()),
        }
    }
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Assignment {
            id: row.id,
            job_id: row.job_id,
            translator_id: row.translator_id,
            accepted_at: utc(row.accepted_at),
            completed_at: row.completed_at.map(utc),
            completed_by: row.completed_by,
            cancelled_at: row.cancelled_at.map(utc),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_audit_log)]
pub struct NewAuditRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub actor_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub recorded_at: NaiveDateTime,
}

impl From<&AuditEntry> for NewAuditRow {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: entry.job_id,
            actor_id: entry.actor_id,
            field: entry.field.clone(),
            old_value: entry.old_value.clone(),
            new_value: entry.new_value.clone(),
            recorded_at: entry.recorded_at.naive_utc(),
        }
    }
}
