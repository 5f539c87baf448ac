//! Knowledge base ingestion
//!
//! Turns a directory of heterogeneous documents into the single text blob
//! that gets embedded in the system prompt. Plain text and PDF are supported;
//! anything else in the directory is ignored.

mod pdf;
mod text;

use crate::error::{KbgateError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use pdf::extract_pdf_text;
pub use text::read_text_file;

/// Kind of document recognised by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
}

impl DocumentKind {
    /// Classify a path by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("txt") {
            Some(Self::Text)
        } else if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// A single ingested document
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    /// File name, used as the section heading
    pub name: String,

    /// Trimmed extracted text
    pub content: String,

    pub kind: DocumentKind,
}

impl KnowledgeDocument {
    /// Render as a titled section of the knowledge blob
    pub fn to_section(&self) -> String {
        format!("=== {} ===\n{}\n", self.name, self.content)
    }
}

/// Read every supported document directly inside `dir`
///
/// Files are visited in name order. Unreadable documents are logged and skipped.
pub fn load_documents(dir: &Path) -> Result<Vec<KnowledgeDocument>> {
    if !dir.is_dir() {
        return Err(KbgateError::InvalidInput(format!(
            "Knowledge directory not found: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(kind) = DocumentKind::from_path(path) else {
            tracing::debug!("Skipping unsupported file {:?}", path);
            continue;
        };

        let extracted = match kind {
            DocumentKind::Text => read_text_file(path),
            DocumentKind::Pdf => extract_pdf_text(path),
        };

        match extracted {
            Ok(content) => {
                let content = content.trim();
                if content.is_empty() {
                    continue;
                }
                documents.push(KnowledgeDocument {
                    name: entry.file_name().to_string_lossy().to_string(),
                    content: content.to_string(),
                    kind,
                });
            }
            Err(e) => {
                tracing::warn!("Skipping knowledge document {:?}: {}", path, e);
            }
        }
    }

    Ok(documents)
}

/// Produce the knowledge blob for `dir`
pub fn load_knowledge_base(dir: &Path) -> Result<String> {
    let documents = load_documents(dir)?;
    tracing::info!(
        "Loaded {} knowledge documents from {}",
        documents.len(),
        dir.display()
    );

    Ok(render_knowledge_base(&documents))
}

/// Join documents into the knowledge blob, in the given order
pub fn render_knowledge_base(documents: &[KnowledgeDocument]) -> String {
    documents
        .iter()
        .map(KnowledgeDocument::to_section)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Loader bound to a configured directory
#[derive(Debug, Clone)]
pub struct KnowledgeLoader {
    dir: PathBuf,
}

impl KnowledgeLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self) -> Result<String> {
        load_knowledge_base(&self.dir)
    }
}
