use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::Service;

/// Read-only view of the service catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn get_service(&self, id: i64) -> anyhow::Result<Option<Service>>;
}

pub struct SqliteCatalog {
    db: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogProvider for SqliteCatalog {
    async fn get_service(&self, id: i64) -> anyhow::Result<Option<Service>> {
        let db = self.db.lock().unwrap();
        Ok(queries::get_service(&db, id)?)
    }
}
