use rusqlite::{params, Connection, OptionalExtension};

// ── Cache entries ──────────────────────────────────────────────────

pub fn get_cache_entry(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM cache_entries WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_cache_entry(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO cache_entries (key, value, cached_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value=excluded.value, cached_at=excluded.cached_at",
        params![key, value],
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn delete_cache_entry(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

/// Remove every entry whose key starts with `prefix`. Returns the count removed.
pub fn delete_cache_prefix(conn: &Connection, prefix: &str) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
    )
}

/// Entry counts grouped by key prefix (the part before the first `-`).
pub fn cache_entry_counts(conn: &Connection) -> Result<Vec<(String, i64)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN instr(key, '-') > 0 THEN substr(key, 1, instr(key, '-') - 1) ELSE key END AS prefix,
                COUNT(*)
         FROM cache_entries
         GROUP BY prefix
         ORDER BY prefix",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn last_cached_at(conn: &Connection) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row("SELECT MAX(cached_at) FROM cache_entries", [], |row| row.get(0))
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
