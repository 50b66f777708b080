use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::catalog::SqliteCatalog;
use crate::services::clock::Clock;
use crate::services::identity::{IdentityProvider, SqliteIdentity};
use crate::services::jobs::JobRunner;
use crate::services::messaging::NotificationDispatcher;
use crate::services::scheduling::{BookingScheduler, SchedulingPolicy};

pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub jobs: Arc<JobRunner>,
    pub scheduler: BookingScheduler,
}

impl AppState {
    /// Wires the SQLite-backed catalog and identity collaborators around `conn`.
    /// The job runner is created but not started.
    pub fn new(
        config: &AppConfig,
        conn: Connection,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let db = Arc::new(Mutex::new(conn));
        let identity: Arc<dyn IdentityProvider> = Arc::new(SqliteIdentity::new(db.clone()));
        let jobs = JobRunner::new(clock.clone());

        let scheduler = BookingScheduler::new(
            db.clone(),
            Arc::new(SqliteCatalog::new(db.clone())),
            identity.clone(),
            dispatcher,
            jobs.clone(),
            clock,
            SchedulingPolicy::from(config),
        );

        Arc::new(Self {
            identity,
            jobs,
            scheduler,
        })
    }
}
