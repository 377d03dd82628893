use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::info;

use super::{DispatchError, EmailMessage, NotificationGateway, PushMessage, Recipient};
use crate::config::{AppConfig, EmailConfig, PushConfig, SmsConfig};

const PUSH_TITLE: &str = "DigitalTolk";

/// Talks to the push, SMS and e-mail providers over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    push: PushConfig,
    sms: SmsConfig,
    email: EmailConfig,
}

impl HttpGateway {
    pub fn from_config(config: &AppConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.notify_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            push: config.push.clone(),
            sms: config.sms.clone(),
            email: config.email.clone(),
        })
    }
}

/// Provider filter matching any of the recipients by e-mail tag.
fn recipient_filters(recipients: &[Recipient]) -> Vec<Value> {
    let mut filters = Vec::with_capacity(recipients.len() * 2);
    for (index, recipient) in recipients.iter().enumerate() {
        if index > 0 {
            filters.push(json!({ "operator": "OR" }));
        }
        filters.push(json!({
            "field": "tag",
            "key": "email",
            "relation": "=",
            "value": recipient.email,
        }));
    }
    filters
}

fn push_body(
    app_id: &str,
    recipients: &[Recipient],
    message: &PushMessage,
    send_after: Option<DateTime<Utc>>,
) -> Value {
    let mut data = message.data.clone();
    data["job_id"] = json!(message.job_id);

    let mut body = json!({
        "app_id": app_id,
        "filters": recipient_filters(recipients),
        "data": data,
        "headings": { "en": PUSH_TITLE },
        "contents": { "en": message.text },
        "ios_badgeType": "Increase",
        "ios_badgeCount": 1,
        "android_sound": message.sound.android(),
        "ios_sound": message.sound.ios(),
    });
    if let Some(at) = send_after {
        body["send_after"] = json!(at.format("%Y-%m-%d %H:%M:%S GMT+0000").to_string());
    }
    body
}

async fn check(channel: &'static str, response: Response) -> Result<(), DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl NotificationGateway for HttpGateway {
    async fn send_push(
        &self,
        recipients: &[Recipient],
        message: &PushMessage,
        send_after: Option<DateTime<Utc>>,
    ) -> Result<(), DispatchError> {
        let (Some(app_id), Some(api_key)) = (&self.push.app_id, &self.push.api_key) else {
            return Err(DispatchError::NotConfigured { channel: "push" });
        };

        let body = push_body(app_id, recipients, message, send_after);
        let response = self
            .client
            .post(&self.push.api_url)
            .header("authorization", format!("Basic {api_key}"))
            .json(&body)
            .send()
            .await?;
        check("push", response).await?;
        info!(
            job_id = %message.job_id,
            recipients = recipients.len(),
            delayed = send_after.is_some(),
            "push sent"
        );
        Ok(())
    }

    async fn send_sms(&self, to: &str, text: &str) -> Result<(), DispatchError> {
        let Some(url) = &self.sms.api_url else {
            return Err(DispatchError::NotConfigured { channel: "sms" });
        };

        let mut request = self.client.post(url).form(&[
            ("from", self.sms.sender.as_str()),
            ("to", to),
            ("message", text),
        ]);
        if let Some(username) = &self.sms.username {
            request = request.basic_auth(username, self.sms.password.as_deref());
        }
        let response = request.send().await?;
        check("sms", response).await
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        let Some(url) = &self.email.api_url else {
            return Err(DispatchError::NotConfigured { channel: "email" });
        };

        let body = json!({
            "from": self.email.sender,
            "to": { "email": message.to, "name": message.name },
            "subject": message.subject,
            "template": message.template.as_str(),
            "data": message.data,
        });
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.email.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        check("email", response).await
    }
}
