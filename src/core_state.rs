//! Shared application state.
//!
//! `CoreState` owns the negotiation engine, the notification hub that
//! feeds push subscribers, and the calendar defaults. Wrapped in `Arc` at
//! startup and handed to every axum handler through `ApiContext`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Weekday;
use chrono_tz::Tz;
use tokio::sync::broadcast;

use crate::calendar::MonthOptions;
use crate::config::{ConfigError, ServiceConfig};
use crate::db::{self, RequestRepository, SqliteRequestRepository};
use crate::negotiation::{EngineSettings, NegotiationEngine};
use crate::notification::{NotificationEvent, NotificationHub};

pub struct CoreState {
    engine: NegotiationEngine,
    hub: Arc<NotificationHub>,
    /// Viewer defaults applied when a month request leaves them out.
    pub time_zone: Tz,
    pub week_start: Weekday,
    started_at: Instant,
}

impl CoreState {
    /// Open (and migrate) the configured database.
    pub fn open(config: &ServiceConfig) -> Result<Self, CoreError> {
        let repo = SqliteRequestRepository::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "Database opened");
        Ok(Self::with_repository(Arc::new(repo), config))
    }

    /// Throwaway in-memory state with default settings.
    pub fn in_memory() -> Result<Self, CoreError> {
        let repo = SqliteRequestRepository::in_memory()?;
        Ok(Self::with_repository(Arc::new(repo), &ServiceConfig::default()))
    }

    pub fn with_repository(repo: Arc<dyn RequestRepository>, config: &ServiceConfig) -> Self {
        let hub = Arc::new(NotificationHub::default());
        let settings = EngineSettings {
            appointment_duration: config.appointment_duration,
            ..EngineSettings::default()
        };
        Self {
            engine: NegotiationEngine::new(repo, hub.clone(), settings),
            hub,
            time_zone: config.time_zone,
            week_start: config.week_start,
            started_at: Instant::now(),
        }
    }

    pub fn engine(&self) -> &NegotiationEngine {
        &self.engine
    }

    /// New push subscriber; sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.hub.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Month options with the configured defaults filled in.
    pub fn month_options(
        &self,
        time_zone: Option<Tz>,
        week_start: Option<Weekday>,
        include_holidays: bool,
    ) -> MonthOptions {
        MonthOptions {
            week_start: week_start.unwrap_or(self.week_start),
            time_zone: time_zone.unwrap_or(self.time_zone),
            include_holidays,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}
