use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::models::ImageRecord;

/// Stored metadata snapshot used by change detection.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub file_mtime: f64,
    pub file_size: i64,
    pub search_text: String,
    pub ocr_text: String,
}

pub fn upsert_record(conn: &Connection, record: &ImageRecord) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO ocr_index (
            file_path, folder_path, file_name, file_mtime, file_size, ocr_text, search_text, ocr_error, indexed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(file_path) DO UPDATE SET
            folder_path = excluded.folder_path,
            file_name   = excluded.file_name,
            file_mtime  = excluded.file_mtime,
            file_size   = excluded.file_size,
            ocr_text    = excluded.ocr_text,
            search_text = excluded.search_text,
            ocr_error   = excluded.ocr_error,
            indexed_at  = excluded.indexed_at",
        params![
            record.file_path,
            record.folder_path,
            record.file_name,
            record.file_mtime,
            record.file_size,
            record.ocr_text,
            record.search_text,
            record.ocr_error,
            record.indexed_at,
        ],
    )?;
    Ok(())
}

pub fn records_for_folder(
    conn: &Connection,
    folder_path: &str,
) -> Result<HashMap<String, StoredSnapshot>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT file_path, file_mtime, file_size, search_text, ocr_text
         FROM ocr_index WHERE folder_path = ?1",
    )?;

    let snapshots = stmt
        .query_map(params![folder_path], |row| {
            Ok((
                row.get::<_, String>(0)?,
                StoredSnapshot {
                    file_mtime: row.get(1)?,
                    file_size: row.get(2)?,
                    search_text: row.get(3)?,
                    ocr_text: row.get(4)?,
                },
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(snapshots)
}

pub fn get_record(conn: &Connection, file_path: &str) -> Result<Option<ImageRecord>, AppError> {
    let record = conn
        .prepare(
            "SELECT file_path, folder_path, file_name, file_mtime, file_size, ocr_text, search_text, ocr_error, indexed_at
             FROM ocr_index WHERE file_path = ?1",
        )?
        .query_row(params![file_path], |row| {
            Ok(ImageRecord {
                file_path: row.get(0)?,
                folder_path: row.get(1)?,
                file_name: row.get(2)?,
                file_mtime: row.get(3)?,
                file_size: row.get(4)?,
                ocr_text: row.get(5)?,
                search_text: row.get(6)?,
                ocr_error: row.get(7)?,
                indexed_at: row.get(8)?,
            })
        })
        .optional()?;

    Ok(record)
}

pub fn update_search_text(
    conn: &Connection,
    file_path: &str,
    search_text: &str,
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE ocr_index SET search_text = ?1 WHERE file_path = ?2",
        params![search_text, file_path],
    )?;
    Ok(count)
}

pub fn search_paths(
    conn: &Connection,
    folder_path: &str,
    raw_query: &str,
    normalized_query: &str,
    limit: usize,
) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT file_path
         FROM ocr_index
         WHERE folder_path = ?1
           AND (
                 ocr_text LIKE ?2
                 OR file_name LIKE ?2
                 OR (?3 <> '' AND search_text LIKE ?4)
               )
         ORDER BY file_name
         LIMIT ?5",
    )?;

    let paths = stmt
        .query_map(
            params![
                folder_path,
                format!("%{raw_query}%"),
                normalized_query,
                format!("%{normalized_query}%"),
                limit as i64,
            ],
            |row| row.get(0),
        )?
        .filter_map(|r| r.ok())
        .collect();

    Ok(paths)
}

pub fn list_paths(
    conn: &Connection,
    folder_path: &str,
    limit: usize,
) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT file_path
         FROM ocr_index
         WHERE folder_path = ?1
         ORDER BY file_name
         LIMIT ?2",
    )?;

    let paths = stmt
        .query_map(params![folder_path, limit as i64], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample_record() -> ImageRecord {
        ImageRecord {
            file_path: "/inv/part_001.jpg".to_string(),
            folder_path: "/inv".to_string(),
            file_name: "part_001.jpg".to_string(),
            file_mtime: 1700000000.25,
            file_size: 2048,
            ocr_text: "A-100-X".to_string(),
            search_text: "PART001JPG A100X".to_string(),
            ocr_error: None,
            indexed_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let conn = setup_db();
        let mut record = sample_record();

        upsert_record(&conn, &record).unwrap();
        record.ocr_text = "B-200-Y".to_string();
        record.ocr_error = Some("engine hiccup".to_string());
        upsert_record(&conn, &record).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ocr_index", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let fetched = get_record(&conn, &record.file_path).unwrap().unwrap();
        assert_eq!(fetched.ocr_text, "B-200-Y");
        assert_eq!(fetched.ocr_error.as_deref(), Some("engine hiccup"));
    }

    #[test]
    fn test_mtime_round_trips_exactly() {
        let conn = setup_db();
        let record = sample_record();
        upsert_record(&conn, &record).unwrap();

        let fetched = get_record(&conn, &record.file_path).unwrap().unwrap();
        assert_eq!(fetched.file_mtime, 1700000000.25);
        assert_eq!(fetched.file_size, 2048);
    }

    #[test]
    fn test_records_for_folder_filters_by_folder() {
        let conn = setup_db();
        upsert_record(&conn, &sample_record()).unwrap();

        let mut other = sample_record();
        other.file_path = "/other/part_002.jpg".to_string();
        other.folder_path = "/other".to_string();
        upsert_record(&conn, &other).unwrap();

        let snapshots = records_for_folder(&conn, "/inv").unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.contains_key("/inv/part_001.jpg"));

        let snapshot = &snapshots["/inv/part_001.jpg"];
        assert_eq!(snapshot.file_size, 2048);
        assert_eq!(snapshot.ocr_text, "A-100-X");
    }

    #[test]
    fn test_update_search_text_targets_one_row() {
        let conn = setup_db();
        upsert_record(&conn, &sample_record()).unwrap();

        let updated = update_search_text(&conn, "/inv/part_001.jpg", "NEWKEY").unwrap();
        assert_eq!(updated, 1);

        let fetched = get_record(&conn, "/inv/part_001.jpg").unwrap().unwrap();
        assert_eq!(fetched.search_text, "NEWKEY");
        assert_eq!(fetched.ocr_text, "A-100-X");

        let missing = update_search_text(&conn, "/inv/nope.jpg", "X").unwrap();
        assert_eq!(missing, 0);
    }

    #[test]
    fn test_get_record_missing_is_none() {
        let conn = setup_db();
        assert!(get_record(&conn, "/inv/ghost.jpg").unwrap().is_none());
    }
}
