use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    DispatchError, EmailMessage, NotificationGateway, NotificationPolicy, PushMessage, Recipient,
};
use crate::domain::UserProfile;
use crate::time::Clock;

/// How many recipients went into each push bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent_now: usize,
    pub delayed: usize,
}

/// Applies the policy to recipients and hands batches to the gateway.
///
/// Delivery failures are logged and swallowed; callers have already
/// committed the state change the notification is about.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn NotificationGateway>,
    policy: NotificationPolicy,
    clock: Arc<dyn Clock>,
}

fn recipient_ids(recipients: &[Recipient]) -> Vec<Uuid> {
    recipients.iter().map(|recipient| recipient.user_id).collect()
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        policy: NotificationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            policy,
            clock,
        }
    }

    /// Splits `users` into send-now and send-delayed buckets and sends each
    /// bucket with one gateway call, both concurrently.
    pub async fn push(
        &self,
        users: &[UserProfile],
        message: &PushMessage,
        immediate: bool,
    ) -> DispatchReport {
        let now = self.clock.now();
        let mut send_now = Vec::new();
        let mut send_later = Vec::new();
        for user in users {
            if !self.policy.should_notify(user, immediate) {
                continue;
            }
            if self.policy.should_delay(user, now) {
                send_later.push(Recipient::from(user));
            } else {
                send_now.push(Recipient::from(user));
            }
        }

        let report = DispatchReport {
            sent_now: send_now.len(),
            delayed: send_later.len(),
        };
        let send_after = self.policy.delivery_window(now);

        let (now_result, later_result) = join(
            self.send_bucket(&send_now, message, None),
            self.send_bucket(&send_later, message, Some(send_after)),
        )
        .await;
        self.log_push_failure(now_result, &send_now, message);
        self.log_push_failure(later_result, &send_later, message);

        debug!(
            job_id = %message.job_id,
            notification_type = message.notification_type.as_str(),
            sent_now = report.sent_now,
            delayed = report.delayed,
            "push dispatched"
        );
        report
    }

    pub async fn push_one(&self, user: &UserProfile, message: &PushMessage) -> DispatchReport {
        self.push(std::slice::from_ref(user), message, false).await
    }

    async fn send_bucket(
        &self,
        recipients: &[Recipient],
        message: &PushMessage,
        send_after: Option<DateTime<Utc>>,
    ) -> Result<(), DispatchError> {
        if recipients.is_empty() {
            return Ok(());
        }
        self.gateway.send_push(recipients, message, send_after).await
    }

    fn log_push_failure(
        &self,
        result: Result<(), DispatchError>,
        recipients: &[Recipient],
        message: &PushMessage,
    ) {
        if let Err(err) = result {
            warn!(
                job_id = %message.job_id,
                recipients = ?recipient_ids(recipients),
                error = %err,
                "push dispatch failed"
            );
        }
    }

    pub async fn email(&self, message: EmailMessage) {
        if let Err(err) = self.gateway.send_email(&message).await {
            warn!(
                job_id = %message.job_id,
                to = %message.to,
                template = message.template.as_str(),
                error = %err,
                "email dispatch failed"
            );
        }
    }

    /// Texts every user with a mobile number; returns how many were tried.
    pub async fn sms(&self, job_id: Uuid, users: &[UserProfile], text: &str) -> usize {
        let mut attempted = 0;
        for user in users {
            let Some(mobile) = user.mobile.as_deref() else {
                debug!(user_id = %user.id, "no mobile number, skipping sms");
                continue;
            };
            attempted += 1;
            if let Err(err) = self.gateway.send_sms(mobile, text).await {
                warn!(
                    job_id = %job_id,
                    user_id = %user.id,
                    error = %err,
                    "sms dispatch failed"
                );
            }
        }
        attempted
    }
}
