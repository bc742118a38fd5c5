/// Canonicalizes text for product-code matching: uppercase, then keep only
/// ASCII letters and digits. Spacing, dashes, and OCR punctuation noise in
/// either the stored text or the query cancel out under this form.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Match key persisted alongside each record: the normalized file name and
/// normalized OCR text joined by a single space, dropping empty halves.
pub fn build_search_text(file_name: &str, ocr_text: &str) -> String {
    let parts = [normalize(file_name), normalize(ocr_text)];
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}
