use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::UserProfile;

pub mod dispatch;
pub mod http;
pub mod messages;
pub mod policy;

pub use dispatch::{DispatchReport, Dispatcher};
pub use http::HttpGateway;
pub use messages::Messages;
pub use policy::NotificationPolicy;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{channel} gateway is not configured")]
    NotConfigured { channel: &'static str },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{channel} gateway responded with {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
}

/// Who a push is addressed to; providers target devices by e-mail tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub email: String,
}

impl From<&UserProfile> for Recipient {
    fn from(user: &UserProfile) -> Self {
        Self {
            user_id: user.id,
            email: user.email.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SuitableJob,
    JobAccepted,
    JobCancelled,
    JobExpired,
    SessionStartRemind,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::SuitableJob => "suitable_job",
            NotificationType::JobAccepted => "job_accepted",
            NotificationType::JobCancelled => "job_cancelled",
            NotificationType::JobExpired => "job_expired",
            NotificationType::SessionStartRemind => "session_start_remind",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushSound {
    Default,
    NormalBooking,
    EmergencyBooking,
}

impl PushSound {
    pub fn android(&self) -> &'static str {
        match self {
            PushSound::Default => "default",
            PushSound::NormalBooking => "normal_booking",
            PushSound::EmergencyBooking => "emergency_booking",
        }
    }

    pub fn ios(&self) -> &'static str {
        match self {
            PushSound::Default => "default",
            PushSound::NormalBooking => "normal_booking.mp3",
            PushSound::EmergencyBooking => "emergency_booking.mp3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub job_id: Uuid,
    pub notification_type: NotificationType,
    pub text: String,
    pub data: Value,
    pub sound: PushSound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmailTemplate {
    JobCreated,
    JobAccepted,
    JobCancelled,
    JobReopened,
    SessionEnded,
    JobChangedDate,
    JobChangedLanguage,
    JobChangedTranslatorCustomer,
    JobChangedTranslatorOldTranslator,
    JobChangedTranslatorNewTranslator,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::JobCreated => "job-created",
            EmailTemplate::JobAccepted => "job-accepted",
            EmailTemplate::JobCancelled => "job-cancelled",
            EmailTemplate::JobReopened => "job-reopened",
            EmailTemplate::SessionEnded => "session-ended",
            EmailTemplate::JobChangedDate => "job-changed-date",
            EmailTemplate::JobChangedLanguage => "job-changed-lang",
            EmailTemplate::JobChangedTranslatorCustomer => "job-changed-translator-customer",
            EmailTemplate::JobChangedTranslatorOldTranslator => {
                "job-changed-translator-old-translator"
            }
            EmailTemplate::JobChangedTranslatorNewTranslator => {
                "job-changed-translator-new-translator"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    /// Booking the mail is about; kept for logging, not sent.
    #[serde(skip)]
    pub job_id: Uuid,
    pub to: String,
    pub name: String,
    pub subject: String,
    pub template: EmailTemplate,
    pub data: Value,
}

/// Outbound push, SMS and e-mail transport.
#[async_trait]
pub trait NotificationGateway: Send + Sync + 'static {
    /// One provider call for the whole recipient batch; `send_after` asks the
    /// provider to hold delivery until then.
    async fn send_push(
        &self,
        recipients: &[Recipient],
        message: &PushMessage,
        send_after: Option<DateTime<Utc>>,
    ) -> Result<(), DispatchError>;

    async fn send_sms(&self, to: &str, text: &str) -> Result<(), DispatchError>;

    async fn send_email(&self, message: &EmailMessage) -> Result<(), DispatchError>;
}
