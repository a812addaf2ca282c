// src/cli/migrate.rs — Database migration command
//
// Migrations also run automatically when the server starts; this command
// shows where the schema stands and can undo the latest step.

use std::path::Path;

use crate::memory::schema;

/// Show migration status, roll back, or run pending migrations.
pub fn run_migrate(db_path: &Path, status_only: bool, rollback: bool) -> anyhow::Result<()> {
    if !db_path.exists() && (status_only || rollback) {
        println!("No database found at: {}", db_path.display());
        println!("Run `jieyou migrate` to create it.");
        return Ok(());
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = rusqlite::Connection::open(db_path)?;

    if status_only {
        return show_migration_status(&conn, db_path);
    }

    if rollback {
        match schema::rollback_last(&conn)? {
            Some(version) => println!("Rolled back migration v{version}."),
            None => println!("No migrations to roll back."),
        }
        return show_migration_status(&conn, db_path);
    }

    println!("Running database migrations...");
    let applied = schema::run_migrations(&conn)?;
    println!("Migrations complete ({applied} applied).");
    show_migration_status(&conn, db_path)
}

fn show_migration_status(conn: &rusqlite::Connection, db_path: &Path) -> anyhow::Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='_migrations'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        println!("No migrations have been run yet.");
        return Ok(());
    }

    let current = schema::current_version(conn)?;
    println!("Database: {}", db_path.display());
    println!("Current schema version: {}", current);
    println!();

    let mut stmt =
        conn.prepare("SELECT version, name, applied_at FROM _migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    println!("Applied migrations:");
    for row in rows {
        let (version, name, applied_at) = row?;
        println!("  v{}: {} (applied {})", version, name, applied_at);
    }

    let pending: Vec<_> = schema::MIGRATIONS
        .iter()
        .filter(|m| m.version > current)
        .collect();
    if !pending.is_empty() {
        println!("Pending:");
        for m in pending {
            println!("  v{}: {}", m.version, m.name);
        }
    }

    Ok(())
}
