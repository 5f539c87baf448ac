//! PDF documents

use crate::error::{KbgateError, Result};
use std::path::Path;

/// Extract the text layer of a PDF, with layout whitespace tidied
///
/// Image-only PDFs have no text layer and fail with `Parse`.
pub fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;

    let raw = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| KbgateError::Parse(format!("cannot extract text from {:?}: {}", path, e)))?;

    let text = normalize_layout(&raw);
    if text.is_empty() {
        return Err(KbgateError::Parse(format!("{:?} has no text layer", path)));
    }
    Ok(text)
}

/// Strip trailing spaces and form feeds, and collapse runs of blank lines to one
fn normalize_layout(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.lines() {
        let line = line.trim_end_matches(|c: char| c.is_whitespace() || c == '\u{c}');
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
