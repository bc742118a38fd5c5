use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub file_path: String,
    pub folder_path: String,
    pub file_name: String,
    pub file_mtime: f64,
    pub file_size: i64,
    pub ocr_text: String,
    pub search_text: String,
    pub ocr_error: Option<String>,
    pub indexed_at: String,
}
