//! User read side: nickname lookup (spec §6).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::{PgPool, Row};

use notifyhub_core::UserId;

use super::ReadModelError;

pub trait UserLookup: Send + Sync {
    /// `SELECT nickname FROM users WHERE id=$1`.
    fn nickname_of(&self, user_id: &UserId) -> Result<Option<String>, ReadModelError>;
}

pub struct PostgresUserLookup {
    pool: Arc<PgPool>,
    runtime: tokio::runtime::Handle,
}

impl PostgresUserLookup {
    /// Must be called from within a tokio runtime: captures a
    /// [`tokio::runtime::Handle`] up front for the same reason as
    /// `PostgresCursorStore::new`.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime: tokio::runtime::Handle::current(),
        }
    }
}

impl UserLookup for PostgresUserLookup {
    fn nickname_of(&self, user_id: &UserId) -> Result<Option<String>, ReadModelError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let id = user_id.as_str().to_string();

        handle.block_on(async move {
            let row = sqlx::query("SELECT nickname FROM users WHERE id = $1")
                .bind(&id)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| ReadModelError::Transient(format!("nickname_of: {e}")))?;
            Ok(row.map(|r| r.get::<String, _>("nickname")))
        })
    }
}

/// In-memory user read model for tests.
#[derive(Default)]
pub struct InMemoryUserLookup {
    nicknames: RwLock<HashMap<String, String>>,
}

impl InMemoryUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, nickname: impl Into<String>) {
        self.nicknames
            .write()
            .expect("user lookup mutex poisoned")
            .insert(user_id.as_str().to_string(), nickname.into());
    }
}

impl UserLookup for InMemoryUserLookup {
    fn nickname_of(&self, user_id: &UserId) -> Result<Option<String>, ReadModelError> {
        Ok(self
            .nicknames
            .read()
            .expect("user lookup mutex poisoned")
            .get(user_id.as_str())
            .cloned())
    }
}
