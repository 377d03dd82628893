use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Declares a closed string-backed enumeration with `as_str`, `Display` and
/// `FromStr` so database columns and JSON share one spelling.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    Started,
    Completed,
    #[serde(rename = "withdrawbefore24")]
    WithdrawBefore24,
    #[serde(rename = "withdrawafter24")]
    WithdrawAfter24,
    Timedout,
    NotCarriedOutCustomer,
}

string_enum!(JobStatus, "job status", {
    Pending => "pending",
    Assigned => "assigned",
    Started => "started",
    Completed => "completed",
    WithdrawBefore24 => "withdrawbefore24",
    WithdrawAfter24 => "withdrawafter24",
    Timedout => "timedout",
    NotCarriedOutCustomer => "not_carried_out_customer",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::WithdrawBefore24
                | JobStatus::WithdrawAfter24
                | JobStatus::NotCarriedOutCustomer
        )
    }

    /// Statuses in which exactly one assignment must be open.
    pub fn holds_assignment(&self) -> bool {
        matches!(self, JobStatus::Assigned | JobStatus::Started)
    }
}

/// Which translator pool a booking is offered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Paid,
    Rws,
    Unpaid,
}

string_enum!(JobType, "job type", {
    Paid => "paid",
    Rws => "rws",
    Unpaid => "unpaid",
});

/// Customer category stored on the requester's preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerType {
    Paid,
    Rwsconsumer,
    Ngo,
}

string_enum!(ConsumerType, "consumer type", {
    Paid => "paid",
    Rwsconsumer => "rwsconsumer",
    Ngo => "ngo",
});

impl ConsumerType {
    pub fn job_type(&self) -> JobType {
        match self {
            ConsumerType::Paid => JobType::Paid,
            ConsumerType::Rwsconsumer => JobType::Rws,
            ConsumerType::Ngo => JobType::Unpaid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslatorType {
    Professional,
    Rwstranslator,
    Volunteer,
}

string_enum!(TranslatorType, "translator type", {
    Professional => "professional",
    Rwstranslator => "rwstranslator",
    Volunteer => "volunteer",
});

impl TranslatorType {
    pub fn job_type(&self) -> JobType {
        match self {
            TranslatorType::Professional => JobType::Paid,
            TranslatorType::Rwstranslator => JobType::Rws,
            TranslatorType::Volunteer => JobType::Unpaid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TranslatorLevel {
    Certified,
    CertifiedLaw,
    CertifiedHealth,
    Layman,
    ReadsTranslationCourses,
}

string_enum!(TranslatorLevel, "translator level", {
    Certified => "Certified",
    CertifiedLaw => "Certified with specialisation in law",
    CertifiedHealth => "Certified with specialisation in health care",
    Layman => "Layman",
    ReadsTranslationCourses => "Read Translation courses",
});

/// Certification a booking asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certification {
    Normal,
    Yes,
    Both,
    Law,
    NLaw,
    Health,
    NHealth,
}

string_enum!(Certification, "certification", {
    Normal => "normal",
    Yes => "yes",
    Both => "both",
    Law => "law",
    NLaw => "n_law",
    Health => "health",
    NHealth => "n_health",
});

impl Certification {
    /// Collapses the booking form's `job_for` tokens into one requirement.
    ///
    /// `normal` wins, then plain `certified`; more than one specialisation
    /// means `both`; otherwise the single remaining token is taken as is.
    pub fn from_job_for(tokens: &[String]) -> Option<Self> {
        let has = |needle: &str| tokens.iter().any(|token| token == needle);
        if has("normal") {
            return Some(Certification::Normal);
        }
        if has("certified") {
            return Some(Certification::Yes);
        }
        let specialisations = ["certified_in_law", "certified_in_helth", "certified_in_health"];
        let hits = tokens
            .iter()
            .filter(|token| specialisations.contains(&token.as_str()))
            .count();
        if hits > 1 {
            return Some(Certification::Both);
        }
        tokens.iter().find_map(|token| match token.as_str() {
            "certified_in_law" | "law" => Some(Certification::Law),
            "certified_in_helth" | "certified_in_health" | "health" => {
                Some(Certification::Health)
            }
            other => other.parse().ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

string_enum!(Gender, "gender", {
    Male => "male",
    Female => "female",
});

impl Gender {
    pub fn from_job_for(tokens: &[String]) -> Option<Self> {
        if tokens.iter().any(|token| token == "male") {
            Some(Gender::Male)
        } else if tokens.iter().any(|token| token == "female") {
            Some(Gender::Female)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Translator,
    Admin,
    Superadmin,
}

string_enum!(Role, "role", {
    Customer => "customer",
    Translator => "translator",
    Admin => "admin",
    Superadmin => "superadmin",
});

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptOuts {
    pub no_emergency: bool,
    pub no_notification: bool,
    /// Lets pushes through during the night window instead of holding them.
    pub accept_night_notifications: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub consumer_type: Option<ConsumerType>,
    pub customer_type: Option<String>,
    pub translator_type: Option<TranslatorType>,
    pub level: Option<TranslatorLevel>,
    pub gender: Option<Gender>,
    pub town: Option<String>,
    pub languages: BTreeSet<i32>,
    pub opt_outs: OptOuts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: Role,
    pub active: bool,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub from_language_id: i32,
    /// Minutes.
    pub duration: i32,
    pub immediate: bool,
    pub due: DateTime<Utc>,
    pub status: JobStatus,
    pub job_type: Option<JobType>,
    pub certification: Option<Certification>,
    pub gender: Option<Gender>,
    pub phone: bool,
    pub physical: bool,
    pub town: Option<String>,
    pub admin_comment: Option<String>,
    pub reference: Option<String>,
    pub contact_email: Option<String>,
    pub by_admin: bool,
    pub session_time: Option<String>,
    pub end_at: Option<DateTime<Utc>>,
    pub withdraw_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub will_expire_at: DateTime<Utc>,
    /// Set once a timed-out job has been cloned back onto the market; the
    /// old row can no longer be accepted.
    pub reopened_as: Option<Uuid>,
}

impl Job {
    /// On-site only: the requester did not accept a phone fallback.
    pub fn physical_only(&self) -> bool {
        self.physical && !self.phone
    }

    /// Labels shown to translators for the gender/certification demands.
    pub fn job_for(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(gender) = self.gender {
            labels.push(match gender {
                Gender::Male => "Man".to_string(),
                Gender::Female => "Kvinna".to_string(),
            });
        }
        match self.certification {
            Some(Certification::Both) => {
                labels.push("normal".to_string());
                labels.push("certified".to_string());
            }
            Some(Certification::Yes) => labels.push("certified".to_string()),
            Some(other) => labels.push(other.as_str().to_string()),
            None => {}
        }
        labels
    }
}

/// One translator's claim on one job over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub translator_id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none() && self.cancelled_at.is_none()
    }
}

/// How an open assignment gets closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentMark {
    Cancelled { at: DateTime<Utc> },
    Completed { at: DateTime<Utc>, by: Uuid },
}

/// One changed field of an admin edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub job_id: Uuid,
    pub actor_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
