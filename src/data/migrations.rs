use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS ocr_index (
    file_path   TEXT PRIMARY KEY,
    folder_path TEXT NOT NULL,
    file_name   TEXT NOT NULL,
    file_mtime  REAL NOT NULL,
    file_size   INTEGER NOT NULL,
    ocr_text    TEXT NOT NULL,
    search_text TEXT NOT NULL DEFAULT '',
    ocr_error   TEXT,
    indexed_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ocr_folder ON ocr_index(folder_path);
CREATE INDEX IF NOT EXISTS idx_ocr_filename ON ocr_index(file_name);
";

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA_V1)?;
    ensure_search_text_column(conn)?;
    Ok(())
}

// Stores created before search_text existed gain the column in place,
// keeping every indexed row.
fn ensure_search_text_column(conn: &Connection) -> Result<(), AppError> {
    let mut stmt = conn.prepare("PRAGMA table_info(ocr_index)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();

    if !columns.iter().any(|name| name == "search_text") {
        conn.execute_batch(
            "ALTER TABLE ocr_index ADD COLUMN search_text TEXT NOT NULL DEFAULT ''",
        )?;
    }

    Ok(())
}
