//! Plain text documents

use crate::error::Result;
use std::path::Path;

/// Read a text file as UTF-8, falling back to Latin-1 for legacy encodings
pub fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("{:?} is not valid UTF-8, decoding as Latin-1", path);
            decode_latin1(e.as_bytes())
        }
    })
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
