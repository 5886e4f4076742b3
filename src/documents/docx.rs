// Word document conversion
// Reads word/document.xml out of the .docx archive and renders paragraphs as markdown lines

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";

/// Level used for heading styles that carry no number
const UNNUMBERED_HEADING_LEVEL: u8 = 4;

#[derive(Debug, Default)]
struct Paragraph {
    style_id: Option<String>,
    text: String,
}

/// Convert the bytes of a .docx file to markdown.
///
/// Paragraphs styled "Heading N" become `#`-prefixed lines, a heading style
/// without a number maps to level 4, and every other non-empty paragraph is
/// emitted as a plain line.
#[inline]
pub fn docx_to_markdown(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("Not a valid .docx archive")?;

    let style_names = match read_part(&mut archive, STYLES_PART)? {
        Some(xml) => parse_style_names(&xml)?,
        None => HashMap::new(),
    };

    let document = read_part(&mut archive, DOCUMENT_PART)?
        .with_context(|| format!("Archive has no {DOCUMENT_PART}"))?;

    let paragraphs = parse_paragraphs(&document)?;
    debug!(
        "Parsed {} paragraphs and {} styles from docx",
        paragraphs.len(),
        style_names.len()
    );

    let lines: Vec<String> = paragraphs
        .into_iter()
        .filter_map(|paragraph| {
            let text = paragraph.text.trim();
            if text.is_empty() {
                return None;
            }

            let level = paragraph.style_id.as_deref().and_then(|id| {
                let name = style_names.get(id).map_or(id, String::as_str);
                heading_level(name)
            });

            Some(match level {
                Some(level) => format!("{} {}", "#".repeat(usize::from(level)), text),
                None => text.to_string(),
            })
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Markdown heading level for a paragraph style name, if it is a heading style
pub(crate) fn heading_level(style_name: &str) -> Option<u8> {
    let lower = style_name.trim().to_ascii_lowercase();
    let rest = lower.strip_prefix("heading")?.trim();

    if rest.is_empty() {
        return Some(UNNUMBERED_HEADING_LEVEL);
    }

    rest.parse::<u8>()
        .ok()
        .map(|level| level.clamp(1, 6))
        .or(Some(UNNUMBERED_HEADING_LEVEL))
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {name}")),
    };

    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {name}"))?;
    Ok(Some(xml))
}

fn val_attribute(element: &BytesStart<'_>) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.context("Malformed XML attribute")?;
        if attribute.key.local_name().as_ref() == b"val" {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn style_id_attribute(element: &BytesStart<'_>) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.context("Malformed XML attribute")?;
        if attribute.key.local_name().as_ref() == b"styleId" {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Map of paragraph style id to display name from word/styles.xml
fn parse_style_names(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut names = HashMap::new();
    let mut current_id: Option<String> = None;

    loop {
        match reader.read_event().context("Malformed styles.xml")? {
            Event::Start(e) if e.local_name().as_ref() == b"style" => {
                current_id = style_id_attribute(&e)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"name" => {
                if let Some(id) = current_id.as_ref() {
                    if let Some(name) = val_attribute(&e)? {
                        names.insert(id.clone(), name);
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"style" => current_id = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(names)
}

fn parse_paragraphs(xml: &str) -> Result<Vec<Paragraph>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<Paragraph> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().context("Malformed document.xml")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(Paragraph::default()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                let Some(paragraph) = current.as_mut() else {
                    continue;
                };
                match e.local_name().as_ref() {
                    b"pStyle" => paragraph.style_id = val_attribute(&e)?,
                    b"tab" => paragraph.text.push('\t'),
                    b"br" | b"cr" => paragraph.text.push('\n'),
                    _ => {}
                }
            }
            Event::Text(t) if in_text => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.text.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(paragraph) = current.take() {
                        paragraphs.push(paragraph);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}
