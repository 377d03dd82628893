use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Timelike, Utc, Weekday};

use crate::config::ScheduleConfig;
use crate::domain::UserProfile;

/// Pure decisions on who gets told and when.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationPolicy {
    schedule: ScheduleConfig,
}

impl NotificationPolicy {
    pub fn new(schedule: ScheduleConfig) -> Self {
        Self { schedule }
    }

    /// `immediate` marks emergency bookings, which also honour the
    /// no-emergency opt-out.
    pub fn should_notify(&self, user: &UserProfile, immediate: bool) -> bool {
        let opt_outs = &user.preferences.opt_outs;
        if opt_outs.no_notification {
            return false;
        }
        !(immediate && opt_outs.no_emergency)
    }

    pub fn is_night(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.schedule.offset()).hour();
        let start = self.schedule.night_start_hour;
        let end = self.schedule.night_end_hour;
        if start > end {
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }

    /// Held until the next delivery window unless the user accepts night
    /// notifications.
    pub fn should_delay(&self, user: &UserProfile, now: DateTime<Utc>) -> bool {
        self.is_night(now) && !user.preferences.opt_outs.accept_night_notifications
    }

    /// Next weekday at the business start hour, strictly after `now`.
    pub fn delivery_window(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = self.schedule.offset();
        let local = now.with_timezone(&offset);
        let opening = NaiveTime::from_hms_opt(self.schedule.business_start_hour, 0, 0)
            .unwrap_or(NaiveTime::MIN);

        let mut day = local.date_naive();
        if local.time() >= opening {
            day = day.checked_add_days(Days::new(1)).unwrap_or(day);
        }
        while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            day = day.checked_add_days(Days::new(1)).unwrap_or(day);
        }

        offset
            .from_local_datetime(&day.and_time(opening))
            .single()
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or(now)
    }
}
