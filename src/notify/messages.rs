use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Value};

use super::{EmailMessage, EmailTemplate, NotificationType, PushMessage, PushSound};
use crate::domain::{Job, UserProfile};
use crate::time::{duration_label, session_time_label};

/// Renders notification texts and payloads in local time.
#[derive(Debug, Clone, Copy)]
pub struct Messages {
    offset: FixedOffset,
}

/// Which side of a finished session an e-mail is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionParty {
    Requester,
    Translator,
}

impl SessionParty {
    fn context(&self) -> &'static str {
        match self {
            SessionParty::Requester => "invoice",
            SessionParty::Translator => "payout",
        }
    }
}

impl Messages {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }

    pub fn clock(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%H:%M").to_string()
    }

    pub fn due(&self, job: &Job) -> String {
        format!("{} {}", self.date(job.due), self.clock(job.due))
    }

    fn location(&self, job: &Job) -> String {
        if job.physical {
            match job.town.as_deref() {
                Some(town) => format!("on site in {town}"),
                None => "on site".to_string(),
            }
        } else {
            "by phone".to_string()
        }
    }

    /// Job fields shipped with every push about it.
    pub fn job_payload(&self, job: &Job, language: &str) -> Value {
        json!({
            "job_id": job.id,
            "from_language_id": job.from_language_id,
            "language": language,
            "immediate": job.immediate,
            "duration": job.duration,
            "status": job.status,
            "gender": job.gender,
            "certified": job.certification,
            "due": self.due(job),
            "due_date": self.date(job.due),
            "due_time": self.clock(job.due),
            "job_type": job.job_type,
            "phone": job.phone,
            "physical": job.physical,
            "town": job.town,
            "job_for": job.job_for(),
        })
    }

    fn push(
        &self,
        job: &Job,
        language: &str,
        notification_type: NotificationType,
        text: String,
    ) -> PushMessage {
        let mut data = self.job_payload(job, language);
        data["notification_type"] = json!(notification_type.as_str());
        PushMessage {
            job_id: job.id,
            notification_type,
            text,
            data,
            sound: PushSound::Default,
        }
    }

    pub fn new_booking(&self, job: &Job, language: &str) -> PushMessage {
        let (text, sound) = if job.immediate {
            (
                format!(
                    "New emergency booking for a {language} interpreter, {} min",
                    job.duration
                ),
                PushSound::EmergencyBooking,
            )
        } else {
            (
                format!(
                    "New booking for a {language} interpreter, {} min, {}",
                    job.duration,
                    self.due(job)
                ),
                PushSound::NormalBooking,
            )
        };
        PushMessage {
            sound,
            ..self.push(job, language, NotificationType::SuitableJob, text)
        }
    }

    pub fn job_accepted(&self, job: &Job, language: &str) -> PushMessage {
        let text = format!(
            "Your booking for a {language} interpreter, {} min, {} has been accepted by an interpreter.",
            job.duration,
            self.due(job)
        );
        self.push(job, language, NotificationType::JobAccepted, text)
    }

    /// To the translator when the requester withdraws.
    pub fn job_cancelled(&self, job: &Job, language: &str) -> PushMessage {
        let text = format!(
            "The customer has cancelled the {language} interpretation, {} min, {}.",
            job.duration,
            self.due(job)
        );
        self.push(job, language, NotificationType::JobCancelled, text)
    }

    /// To the requester when the translator hands the job back.
    pub fn translator_withdrew(&self, job: &Job, language: &str) -> PushMessage {
        let text = format!(
            "Your interpreter cancelled the {language} interpretation, {} min, {}. We are now looking for a new interpreter.",
            job.duration,
            self.due(job)
        );
        self.push(job, language, NotificationType::JobCancelled, text)
    }

    pub fn job_expired(&self, job: &Job, language: &str) -> PushMessage {
        let text = format!(
            "Unfortunately no interpreter accepted your booking ({language}, {} min, {}). Please try booking another time.",
            job.duration,
            self.due(job)
        );
        self.push(job, language, NotificationType::JobExpired, text)
    }

    pub fn session_reminder(&self, job: &Job, language: &str) -> PushMessage {
        let text = format!(
            "Reminder: you have a {language} interpretation ({}) at {} on {} lasting {} min. Good luck, and remember to leave feedback afterwards!",
            self.location(job),
            self.clock(job.due),
            self.date(job.due),
            job.duration
        );
        self.push(job, language, NotificationType::SessionStartRemind, text)
    }

    /// Broadcast SMS; physical-only jobs name the town, everything else is
    /// offered as a phone job.
    pub fn sms(&self, job: &Job) -> String {
        let duration = duration_label(job.duration);
        if job.physical_only() {
            format!(
                "New on-site interpretation in {} on {} at {}, {}. Job #{}. Reply in the app to accept.",
                job.town.as_deref().unwrap_or("-"),
                self.date(job.due),
                self.clock(job.due),
                duration,
                job.id
            )
        } else {
            format!(
                "New phone interpretation on {} at {}, {}. Job #{}. Reply in the app to accept.",
                self.date(job.due),
                self.clock(job.due),
                duration,
                job.id
            )
        }
    }

    fn email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        subject: String,
        template: EmailTemplate,
        data: Value,
    ) -> EmailMessage {
        EmailMessage {
            job_id: job.id,
            to: to.to_string(),
            name: name.to_string(),
            subject,
            template,
            data,
        }
    }

    fn email_data(&self, job: &Job, name: &str) -> Value {
        json!({
            "user": name,
            "job_id": job.id,
            "due": self.due(job),
            "duration": job.duration,
            "reference": job.reference,
        })
    }

    pub fn job_created_email(&self, job: &Job, to: &str, name: &str) -> EmailMessage {
        let subject = if job.by_admin {
            format!("Interpretation booking #{} registered on your behalf", job.id)
        } else {
            format!("Thank you for your booking #{}", job.id)
        };
        self.email(
            job,
            to,
            name,
            subject,
            EmailTemplate::JobCreated,
            self.email_data(job, name),
        )
    }

    pub fn job_accepted_email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        translator: &UserProfile,
    ) -> EmailMessage {
        let mut data = self.email_data(job, name);
        data["translator"] = json!(translator.name);
        self.email(
            job,
            to,
            name,
            format!("Confirmation: interpreter booked for #{}", job.id),
            EmailTemplate::JobAccepted,
            data,
        )
    }

    pub fn job_cancelled_email(&self, job: &Job, to: &str, name: &str) -> EmailMessage {
        self.email(
            job,
            to,
            name,
            format!("Booking #{} has been cancelled", job.id),
            EmailTemplate::JobCancelled,
            self.email_data(job, name),
        )
    }

    pub fn job_reopened_email(&self, job: &Job, to: &str, name: &str) -> EmailMessage {
        self.email(
            job,
            to,
            name,
            format!("Booking #{} is open again", job.id),
            EmailTemplate::JobReopened,
            self.email_data(job, name),
        )
    }

    pub fn session_ended_email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        party: SessionParty,
    ) -> EmailMessage {
        let session_time = job.session_time.as_deref().unwrap_or("0:0:0");
        let mut data = self.email_data(job, name);
        data["session_time"] = json!(session_time_label(session_time));
        data["for_text"] = json!(party.context());
        self.email(
            job,
            to,
            name,
            format!("Information about completed interpretation for #{}", job.id),
            EmailTemplate::SessionEnded,
            data,
        )
    }

    pub fn changed_date_email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        old_due: DateTime<Utc>,
    ) -> EmailMessage {
        let mut data = self.email_data(job, name);
        data["old_time"] = json!(format!("{} {}", self.date(old_due), self.clock(old_due)));
        self.email(
            job,
            to,
            name,
            format!("Your booking #{} has changed", job.id),
            EmailTemplate::JobChangedDate,
            data,
        )
    }

    pub fn changed_language_email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        old_language: &str,
    ) -> EmailMessage {
        let mut data = self.email_data(job, name);
        data["old_lang"] = json!(old_language);
        self.email(
            job,
            to,
            name,
            format!("Your booking #{} has changed", job.id),
            EmailTemplate::JobChangedLanguage,
            data,
        )
    }

    pub fn changed_translator_email(
        &self,
        job: &Job,
        to: &str,
        name: &str,
        template: EmailTemplate,
    ) -> EmailMessage {
        self.email(
            job,
            to,
            name,
            format!("Interpreter assignment changed for #{}", job.id),
            template,
            self.email_data(job, name),
        )
    }
}
