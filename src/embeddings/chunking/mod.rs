
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::SourceDocument;

/// A chunk of a document ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// `{document_name}_{chunk_index}`
    pub id: String,
    /// Ancestor headings followed by the section body
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the file the chunk came from, as given at ingestion
    pub source: String,
    pub document_name: String,
    /// Active headings, outermost first
    pub headings: Vec<String>,
    pub chunk_index: u32,
    /// Set once the chunk has been stored
    pub created_at: Option<String>,
}

/// Configuration for heading-based splitting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Deepest heading level that starts a new section; deeper headings stay in the body
    pub max_heading_depth: u8,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_heading_depth: 4,
        }
    }
}

/// Markdown body under a stack of active headings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSection {
    pub headings: Vec<String>,
    pub body: String,
}

impl HeaderSection {
    /// Body prefixed by every active heading, one per line
    #[inline]
    pub fn contextual_content(&self) -> String {
        if self.headings.is_empty() {
            return self.body.clone();
        }
        format!("{}\n{}", self.headings.join("\n"), self.body)
    }
}

/// Split markdown into sections at `#` headings up to `max_heading_depth`.
///
/// Sections are not size-limited and never overlap. A section whose body is
/// empty (a heading directly followed by another heading) is dropped.
#[inline]
pub fn split_markdown(markdown: &str, config: &ChunkingConfig) -> Vec<HeaderSection> {
    let mut sections = Vec::new();
    let mut heading_stack: Vec<(u8, String)> = Vec::new();
    let mut current_heading: Option<(u8, String)> = None;
    let mut body_start = 0;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                let level = heading_level_to_u8(level);
                // Setext underlines (`---`, `===`) are body text
                let is_atx = markdown[range.clone()].trim_start().starts_with('#');
                if is_atx && level <= config.max_heading_depth {
                    push_section(
                        &mut sections,
                        &heading_stack,
                        &markdown[body_start..range.start],
                    );
                    current_heading = Some((level, String::new()));
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = current_heading.take() {
                    let text = text.trim();
                    if !text.is_empty() {
                        update_heading_stack(&mut heading_stack, level, text.to_string());
                    }
                    body_start = range.end;
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, heading_text)) = current_heading.as_mut() {
                    heading_text.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, heading_text)) = current_heading.as_mut() {
                    heading_text.push(' ');
                }
            }
            _ => {}
        }
    }

    push_section(&mut sections, &heading_stack, &markdown[body_start..]);

    debug!("Split markdown into {} sections", sections.len());
    sections
}

/// Split a loaded document and assign `{document_name}_{index}` ids.
///
/// Ids are only unique within one call; ingesting the same document twice
/// produces the same ids again.
#[inline]
pub fn chunk_document(document: &SourceDocument, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    split_markdown(&document.markdown, config)
        .into_iter()
        .enumerate()
        .map(|(index, section)| DocumentChunk {
            id: format!("{}_{}", document.name, index),
            content: section.contextual_content(),
            metadata: ChunkMetadata {
                source: document.source.clone(),
                document_name: document.name.clone(),
                headings: section.headings,
                chunk_index: u32::try_from(index).unwrap_or(u32::MAX),
                created_at: None,
            },
        })
        .collect()
}

fn push_section(sections: &mut Vec<HeaderSection>, stack: &[(u8, String)], raw_body: &str) {
    let body = raw_body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if body.is_empty() {
        return;
    }

    sections.push(HeaderSection {
        headings: stack.iter().map(|(_, text)| text.clone()).collect(),
        body,
    });
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn update_heading_stack(stack: &mut Vec<(u8, String)>, level: u8, text: String) {
    // Remove headings at the same or deeper level
    stack.retain(|(l, _)| *l < level);
    stack.push((level, text));
}
