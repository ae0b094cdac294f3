//! SQLite connection tuning shared by every store connection

use rusqlite::Connection;
use std::time::Duration;

/// Pages between automatic WAL checkpoints.
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// Apply WAL journaling and write-path PRAGMAs.
///
/// Safe to call on every open; all settings are idempotent. In-memory
/// databases keep their `memory` journal mode.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode and wal_autocheckpoint echo their new value as a row
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    let _: i64 = conn.pragma_update_and_check(
        None,
        "wal_autocheckpoint",
        WAL_AUTOCHECKPOINT_PAGES,
        |row| row.get(0),
    )?;

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    log::debug!("Applied SQLite pragmas (journal_mode={}, synchronous=NORMAL)", journal_mode);
    Ok(())
}
