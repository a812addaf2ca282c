// src/memory/mod.rs — Persistence for users and chat turns

pub mod schema;
pub mod store;
pub mod store_server;

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;

use crate::infra::errors::JieyouError;
use crate::provider::Role;
pub use store::{ChatTurn, UserRow};
pub use store_server::{spawn_store_server, StoreHandle};

/// Storage capabilities the relay core depends on.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The assistant turn persisted under `(user_id, msg_id)`, if any.
    async fn find_completed_turn(
        &self,
        user_id: i64,
        msg_id: &str,
    ) -> Result<Option<ChatTurn>, JieyouError>;

    async fn append_turn(
        &self,
        user_id: i64,
        msg_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, JieyouError>;

    /// Up to `limit` most recent turns, oldest first.
    async fn load_recent_turns(&self, user_id: i64, limit: u32)
        -> Result<Vec<ChatTurn>, JieyouError>;

    async fn get_or_create_user(&self, openid: &str, nickname: &str)
        -> Result<UserRow, JieyouError>;

    async fn find_user(&self, openid: &str) -> Result<Option<UserRow>, JieyouError>;

    async fn count_user_turns_since(&self, user_id: i64, since: &str)
        -> Result<usize, JieyouError>;

    async fn list_turns(&self, user_id: i64) -> Result<Vec<ChatTurn>, JieyouError>;
}

/// Open (or create) the database at `path` and run migrations.
pub fn open_store(path: &Path) -> anyhow::Result<store::Store> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(store::Store::new(conn))
}

/// In-memory database with the schema applied (tests, dry runs).
pub fn in_memory_store() -> anyhow::Result<store::Store> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(store::Store::new(conn))
}
