use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_PUSH_API_URL: &str = "https://onesignal.com/api/v1/notifications";
pub const DEFAULT_SUPPORT_PHONE: &str = "+46 73 75 86 865";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub push: PushConfig,
    pub sms: SmsConfig,
    pub email: EmailConfig,
    pub schedule: ScheduleConfig,
    pub support_phone: String,
    pub sweep_interval_secs: u64,
    /// Per-request deadline for push, SMS and e-mail provider calls.
    pub notify_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub api_url: String,
    pub app_id: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SmsConfig {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
}

/// Local-time hours that drive the night window and delayed delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub business_start_hour: u32,
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            night_start_hour: 22,
            night_end_hour: 6,
            business_start_hour: 8,
            utc_offset_minutes: 60,
        }
    }
}

impl ScheduleConfig {
    /// Falls back to UTC when the offset is out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

fn parsed_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} has an invalid value")),
        Err(_) => Ok(default),
    }
}

fn hour(name: &str, default: u32) -> Result<u32> {
    let value = parsed_or(name, default)?;
    anyhow::ensure!(value < 24, "{name} must be an hour between 0 and 23");
    Ok(value)
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();

        let push = PushConfig {
            api_url: env::var("PUSH_API_URL").unwrap_or_else(|_| DEFAULT_PUSH_API_URL.to_string()),
            app_id: env::var("PUSH_APP_ID").ok(),
            api_key: env::var("PUSH_API_KEY").ok(),
        };
        let sms = SmsConfig {
            api_url: env::var("SMS_API_URL").ok(),
            username: env::var("SMS_USERNAME").ok(),
            password: env::var("SMS_PASSWORD").ok(),
            sender: env::var("SMS_SENDER").unwrap_or_else(|_| "DigitalTolk".to_string()),
        };
        let email = EmailConfig {
            api_url: env::var("EMAIL_API_URL").ok(),
            api_key: env::var("EMAIL_API_KEY").ok(),
            sender: env::var("EMAIL_SENDER").unwrap_or_else(|_| "noreply@localhost".to_string()),
        };

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            night_start_hour: hour("NIGHT_START_HOUR", defaults.night_start_hour)?,
            night_end_hour: hour("NIGHT_END_HOUR", defaults.night_end_hour)?,
            business_start_hour: hour("BUSINESS_START_HOUR", defaults.business_start_hour)?,
            utc_offset_minutes: parsed_or(
                "LOCAL_UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
            )?,
        };
        anyhow::ensure!(
            schedule.utc_offset_minutes.abs() < 24 * 60,
            "LOCAL_UTC_OFFSET_MINUTES must be within one day"
        );

        let support_phone =
            env::var("SUPPORT_PHONE").unwrap_or_else(|_| DEFAULT_SUPPORT_PHONE.to_string());
        let sweep_interval_secs = parsed_or("SWEEP_INTERVAL_SECS", 60u64)?;
        let notify_timeout_secs = parsed_or("NOTIFY_TIMEOUT_SECS", 10u64)?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            push,
            sms,
            email,
            schedule,
            support_phone,
            sweep_interval_secs,
            notify_timeout_secs,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
