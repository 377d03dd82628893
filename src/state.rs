use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    config::AppConfig,
    lifecycle::BookingService,
    notify::{HttpGateway, NotificationGateway},
    store::{JobStore, PgStore, PreferenceStore},
    time::{Clock, SystemClock},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<BookingService>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        service: BookingService,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            preferences,
        }
    }

    /// Production wiring: Postgres stores, HTTP gateway, wall clock.
    pub fn from_store(config: AppConfig, store: PgStore) -> Result<Self> {
        let store = Arc::new(store);
        let jobs: Arc<dyn JobStore> = store.clone();
        let preferences: Arc<dyn PreferenceStore> = store;
        let gateway: Arc<dyn NotificationGateway> = Arc::new(
            HttpGateway::from_config(&config).context("failed to build notification client")?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let service = BookingService::new(
            jobs,
            preferences.clone(),
            gateway,
            clock,
            config.schedule,
            config.support_phone.clone(),
        );
        Ok(Self::new(config, service, preferences))
    }
}
