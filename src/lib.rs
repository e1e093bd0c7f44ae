pub mod accounts;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod projection;
pub mod sync;
pub mod teams;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::{LegacySessionStore, SessionResolver, SharedClock};
use crate::sync::OrganisationSync;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub clock: SharedClock,
    pub resolver: SessionResolver,
    pub legacy: LegacySessionStore,
    pub sync: OrganisationSync,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, clock: SharedClock) -> Self {
        let resolver = SessionResolver::standard(
            db.clone(),
            config.auth.external_session_ttl(),
            clock.clone(),
        );
        let legacy = LegacySessionStore::new(db.clone());
        let sync = OrganisationSync::new(db.clone(), config.sync.clone(), clock.clone());

        Self {
            config,
            db,
            clock,
            resolver,
            legacy,
            sync,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
