//! Database opening and embedded schema migrations.
//!
//! Migrations are tracked through SQLite's `user_version` pragma and
//! embedded at compile time via `include_str!`.

use std::path::Path;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StoreError;

/// All schema migrations, applied in order.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!(
        "migrations/001_initial_schema.sql"
    ))])
}

/// Open (or create) the snippet database at `path`.
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let mut conn = Connection::open(path)?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Open an in-memory database (for tests).
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let mut conn = Connection::open_in_memory()?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

fn configure_and_migrate(conn: &mut Connection) -> Result<(), StoreError> {
    // WAL keeps readers cheap while every mutation stays a single-writer
    // transaction; NORMAL synchronous is durable enough under WAL.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    Ok(())
}
