//! The post/user read side (spec §6): consumed only, never written by this
//! pipeline.

mod posts;
mod snippet;
mod users;

pub use posts::{InMemoryPostLookup, PostLookup, PostgresPostLookup};
pub use snippet::render_snippet;
pub use users::{InMemoryUserLookup, PostgresUserLookup, UserLookup};

#[derive(Debug, thiserror::Error)]
pub enum ReadModelError {
    #[error("transient read model error: {0}")]
    Transient(String),
}
