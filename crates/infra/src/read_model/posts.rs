//! Post read side: `owned_by` and `snippet` lookups (spec §6).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::{PgPool, Row};

use notifyhub_core::{PostId, UserId};

use super::ReadModelError;

pub trait PostLookup: Send + Sync {
    /// `SELECT owned_by FROM posts WHERE id=$1`. `Ok(None)` means the post
    /// has been deleted (spec §4.5.1).
    fn owner_of(&self, post_id: &PostId) -> Result<Option<UserId>, ReadModelError>;

    /// `SELECT snippet FROM posts WHERE id=$1`, already rendered to
    /// plaintext by [`super::render_snippet`].
    fn snippet_of(&self, post_id: &PostId) -> Result<Option<String>, ReadModelError>;
}

pub struct PostgresPostLookup {
    pool: Arc<PgPool>,
    runtime: tokio::runtime::Handle,
}

impl PostgresPostLookup {
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

impl PostLookup for PostgresPostLookup {
    fn owner_of(&self, post_id: &PostId) -> Result<Option<UserId>, ReadModelError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let id = post_id.as_str().to_string();

        handle.block_on(async move {
            let row = sqlx::query("SELECT owned_by FROM posts WHERE id = $1")
                .bind(&id)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| ReadModelError::Transient(format!("owner_of: {e}")))?;
            Ok(row.map(|r| UserId::new(r.get::<String, _>("owned_by"))))
        })
    }

    fn snippet_of(&self, post_id: &PostId) -> Result<Option<String>, ReadModelError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let id = post_id.as_str().to_string();

        handle.block_on(async move {
            let row = sqlx::query("SELECT snippet FROM posts WHERE id = $1")
                .bind(&id)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| ReadModelError::Transient(format!("snippet_of: {e}")))?;
            Ok(row.map(|r| super::render_snippet(&r.get::<String, _>("snippet"))))
        })
    }
}

/// In-memory post read model for tests.
#[derive(Default)]
pub struct InMemoryPostLookup {
    posts: RwLock<HashMap<String, (UserId, String)>>,
}

impl InMemoryPostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, post_id: PostId, owner: UserId, snippet_source: impl Into<String>) {
        self.posts
            .write()
            .expect("post lookup mutex poisoned")
            .insert(post_id.as_str().to_string(), (owner, snippet_source.into()));
    }

    pub fn remove(&self, post_id: &PostId) {
        self.posts
            .write()
            .expect("post lookup mutex poisoned")
            .remove(post_id.as_str());
    }
}

impl PostLookup for InMemoryPostLookup {
    fn owner_of(&self, post_id: &PostId) -> Result<Option<UserId>, ReadModelError> {
        Ok(self
            .posts
            .read()
            .expect("post lookup mutex poisoned")
            .get(post_id.as_str())
            .map(|(owner, _)| owner.clone()))
    }

    fn snippet_of(&self, post_id: &PostId) -> Result<Option<String>, ReadModelError> {
        Ok(self
            .posts
            .read()
            .expect("post lookup mutex poisoned")
            .get(post_id.as_str())
            .map(|(_, source)| super::render_snippet(source)))
    }
}
