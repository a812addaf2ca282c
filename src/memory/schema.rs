// src/memory/schema.rs — Schema + migrations

use rusqlite::{params, Connection};
use tracing::info;

/// A database migration with version, name, and SQL statements.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        up: include_str!("migrations/001_initial_schema.up.sql"),
        down: include_str!("migrations/001_initial_schema.down.sql"),
    },
    Migration {
        version: 2,
        name: "turn_dedup",
        up: include_str!("migrations/002_turn_dedup.up.sql"),
        down: include_str!("migrations/002_turn_dedup.down.sql"),
    },
];

fn ensure_migrations_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    Ok(())
}

pub fn current_version(conn: &Connection) -> anyhow::Result<u32> {
    ensure_migrations_table(conn)?;
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Run all pending migrations. Returns how many were applied.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<usize> {
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            "Applying migration {}: {}",
            migration.version, migration.name
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}

/// Roll back the most recent migration. Returns its version, if any.
pub fn rollback_last(conn: &Connection) -> anyhow::Result<Option<u32>> {
    let current = current_version(conn)?;
    let Some(migration) = MIGRATIONS.iter().find(|m| m.version == current) else {
        return Ok(None);
    };

    info!(
        "Rolling back migration {}: {}",
        migration.version, migration.name
    );
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.down)?;
    tx.execute(
        "DELETE FROM _migrations WHERE version = ?1",
        params![migration.version],
    )?;
    tx.commit()?;
    Ok(Some(migration.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_rollback_last() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(rollback_last(&conn).unwrap(), Some(2));
        assert_eq!(current_version(&conn).unwrap(), 1);
        // Re-applying brings the dedup index back.
        assert_eq!(run_migrations(&conn).unwrap(), 1);
    }

    #[test]
    fn test_rollback_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(rollback_last(&conn).unwrap(), None);
    }
}
