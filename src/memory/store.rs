// src/memory/store.rs — SQLite operations

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::provider::Role;

/// Timestamp format used for every `created_at` column. Fixed-width UTC so
/// string comparison orders correctly.
pub fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

/// Start of the current UTC day, in `timestamp` format.
pub fn start_of_day() -> String {
    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now);
    timestamp(midnight)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub openid: String,
    pub nickname: String,
    pub created_at: String,
}

/// One persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub id: i64,
    pub user_id: i64,
    pub msg_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl ChatTurn {
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

const TURN_COLUMNS: &str = "id, user_id, msg_id, role, content, created_at";

fn turn_from_row(row: &Row<'_>) -> rusqlite::Result<ChatTurn> {
    let role_str: String = row.get(3)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown role '{role_str}'").into(),
        )
    })?;
    Ok(ChatTurn {
        id: row.get(0)?,
        user_id: row.get(1)?,
        msg_id: row.get(2)?,
        role,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        openid: row.get(1)?,
        nickname: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Low-level SQLite operations for users and chat turns.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -- Users --

    pub fn find_user(&self, openid: &str) -> anyhow::Result<Option<UserRow>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, openid, nickname, created_at FROM users WHERE openid = ?1",
                params![openid],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_or_create_user(&self, openid: &str, nickname: &str) -> anyhow::Result<UserRow> {
        self.conn.execute(
            "INSERT INTO users (openid, nickname, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(openid) DO NOTHING",
            params![openid, nickname, now()],
        )?;
        self.find_user(openid)?
            .ok_or_else(|| anyhow::anyhow!("user '{openid}' vanished after insert"))
    }

    // -- Chat turns --

    /// Insert a turn. A second insert for the same (user, msg_id, role) is a
    /// no-op that returns the existing row id.
    pub fn append_turn(
        &self,
        user_id: i64,
        msg_id: &str,
        role: Role,
        content: &str,
    ) -> anyhow::Result<i64> {
        if role == Role::System {
            anyhow::bail!("system turns are never persisted");
        }
        self.conn.execute(
            "INSERT INTO chat_turns (user_id, msg_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, msg_id, role) DO NOTHING",
            params![user_id, msg_id, role.as_str(), content, now()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM chat_turns WHERE user_id = ?1 AND msg_id = ?2 AND role = ?3",
            params![user_id, msg_id, role.as_str()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn find_turn(
        &self,
        user_id: i64,
        msg_id: &str,
        role: Role,
    ) -> anyhow::Result<Option<ChatTurn>> {
        let turn = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TURN_COLUMNS} FROM chat_turns
                     WHERE user_id = ?1 AND msg_id = ?2 AND role = ?3"
                ),
                params![user_id, msg_id, role.as_str()],
                turn_from_row,
            )
            .optional()?;
        Ok(turn)
    }

    /// The most recent `limit` turns of a user, oldest first.
    pub fn recent_turns(&self, user_id: i64, limit: u32) -> anyhow::Result<Vec<ChatTurn>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TURN_COLUMNS} FROM (
                SELECT {TURN_COLUMNS} FROM chat_turns WHERE user_id = ?1
                ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit], turn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Full history of a user, oldest first.
    pub fn list_turns(&self, user_id: i64) -> anyhow::Result<Vec<ChatTurn>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TURN_COLUMNS} FROM chat_turns WHERE user_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], turn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_user_turns_since(&self, user_id: i64, since: &str) -> anyhow::Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chat_turns
             WHERE user_id = ?1 AND role = 'user' AND created_at >= ?2",
            params![user_id, since],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}
