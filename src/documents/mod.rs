// Document loading
// Turns .docx and markdown/text files into markdown ready for heading-based chunking

pub mod docx;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use tracing::debug;

pub use docx::docx_to_markdown;

/// A loaded document, converted to markdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name up to its first `.`, used as the chunk id prefix
    pub name: String,
    /// The path as given by the caller, stored as chunk metadata
    pub source: String,
    pub markdown: String,
}

/// File extensions `load_document` understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["docx", "md", "markdown", "txt"];

/// Load a document from disk, converting Word files to markdown
#[inline]
pub fn load_document(path: &Path) -> Result<SourceDocument> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let markdown = match extension.as_str() {
        "docx" => {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read document: {}", path.display()))?;
            docx_to_markdown(&bytes)
                .with_context(|| format!("Failed to parse Word document: {}", path.display()))?
        }
        "md" | "markdown" | "txt" => fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?,
        other => bail!(
            "Unsupported document type {:?} for {} (expected one of {:?})",
            other,
            path.display(),
            SUPPORTED_EXTENSIONS
        ),
    };

    let source = path.to_string_lossy().into_owned();
    let name = document_name(&source);

    debug!(
        "Loaded document '{}' from {} ({} chars of markdown)",
        name,
        source,
        markdown.len()
    );

    Ok(SourceDocument {
        name,
        source,
        markdown,
    })
}

/// Whether `path` has an extension `load_document` accepts
#[inline]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}

/// Last path component, cut at its first `.`
///
/// `data/report.v2.docx` becomes `report`.
#[inline]
pub fn document_name(source: &str) -> String {
    let file_name = source.rsplit(['/', '\\']).next().unwrap_or(source);
    file_name.split('.').next().unwrap_or(file_name).to_string()
}
