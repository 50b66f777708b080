use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Role, User};

/// User directory: customer emails, staff lookups and roles.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>>;

    async fn list_staff(&self) -> anyhow::Result<Vec<User>>;
}

pub struct SqliteIdentity {
    db: Arc<Mutex<Connection>>,
}

impl SqliteIdentity {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentity {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let db = self.db.lock().unwrap();
        Ok(queries::get_user(&db, id)?)
    }

    async fn list_staff(&self) -> anyhow::Result<Vec<User>> {
        let db = self.db.lock().unwrap();
        Ok(queries::list_users_by_role(&db, Role::Staff)?)
    }
}
