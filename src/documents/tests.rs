use super::*;
use std::io::Write;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="2"><w:name w:val="heading 2"/></w:style>
  <w:style w:type="paragraph" w:styleId="Body"><w:name w:val="Body Text"/></w:style>
</w:styles>"#;

fn paragraph(style: Option<&str>, runs: &str) -> String {
    let properties = style
        .map(|id| format!(r#"<w:pPr><w:pStyle w:val="{id}"/></w:pPr>"#))
        .unwrap_or_default();
    format!("<w:p>{properties}{runs}</w:p>")
}

fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

fn document_xml(paragraphs: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        paragraphs.concat()
    )
}

fn build_docx(document: &str, styles: Option<&str>) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer
        .start_file("word/document.xml", options)
        .expect("should start document part");
    writer
        .write_all(document.as_bytes())
        .expect("should write document part");

    if let Some(styles) = styles {
        writer
            .start_file("word/styles.xml", options)
            .expect("should start styles part");
        writer
            .write_all(styles.as_bytes())
            .expect("should write styles part");
    }

    writer.finish().expect("should finish archive").into_inner()
}

#[test]
fn headings_resolved_through_style_names() {
    let xml = document_xml(&[
        paragraph(Some("1"), &run("Daily Operations")),
        paragraph(Some("2"), &run("Traffic")),
        paragraph(Some("Body"), &run("Congestion index 1.6")),
        paragraph(None, &run("Ring road clear")),
    ]);
    let markdown = docx_to_markdown(&build_docx(&xml, Some(STYLES_XML))).expect("should convert");

    assert_eq!(
        markdown,
        "# Daily Operations\n## Traffic\nCongestion index 1.6\nRing road clear"
    );
}

#[test]
fn style_ids_used_when_styles_part_missing() {
    let xml = document_xml(&[
        paragraph(Some("Heading3"), &run("Utilities")),
        paragraph(Some("Heading"), &run("Untitled level")),
        paragraph(None, &run("Water pressure normal")),
    ]);
    let markdown = docx_to_markdown(&build_docx(&xml, None)).expect("should convert");

    assert_eq!(
        markdown,
        "### Utilities\n#### Untitled level\nWater pressure normal"
    );
}

#[test]
fn runs_are_concatenated_and_empty_paragraphs_skipped() {
    let runs = format!("{}{}<w:r><w:tab/></w:r>{}", run("Fire "), run("alarms"), run("3"));
    let xml = document_xml(&[
        paragraph(None, &runs),
        paragraph(None, ""),
        paragraph(None, &run("   ")),
        paragraph(None, &run("Tom &amp; Jerry")),
    ]);
    let markdown = docx_to_markdown(&build_docx(&xml, None)).expect("should convert");

    assert_eq!(markdown, "Fire alarms\t3\nTom & Jerry");
}

#[test]
fn invalid_archive_is_rejected() {
    let result = docx_to_markdown(b"definitely not a zip file");
    assert!(result.is_err());
}

#[test]
fn archive_without_document_part_is_rejected() {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("other.txt", SimpleFileOptions::default())
        .expect("should start file");
    writer.write_all(b"hello").expect("should write");
    let bytes = writer.finish().expect("should finish").into_inner();

    let error = docx_to_markdown(&bytes).expect_err("should fail");
    assert!(error.to_string().contains("word/document.xml"));
}

#[test]
fn heading_level_parsing() {
    assert_eq!(docx::heading_level("heading 1"), Some(1));
    assert_eq!(docx::heading_level("Heading 2"), Some(2));
    assert_eq!(docx::heading_level("Heading9"), Some(6));
    assert_eq!(docx::heading_level("Heading"), Some(4));
    assert_eq!(docx::heading_level("Heading Custom"), Some(4));
    assert_eq!(docx::heading_level("Title"), None);
    assert_eq!(docx::heading_level("Body Text"), None);
}

#[test]
fn document_name_strips_directories_and_extensions() {
    assert_eq!(document_name("./data/ops_log_20250615.docx"), "ops_log_20250615");
    assert_eq!(document_name("report.v2.docx"), "report");
    assert_eq!(document_name(r"C:\docs\weekly.md"), "weekly");
    assert_eq!(document_name("README"), "README");
}

#[test]
fn load_markdown_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("notes.md");
    std::fs::write(&path, "# Notes\nbody").expect("should write");

    let document = load_document(&path).expect("should load");
    assert_eq!(document.name, "notes");
    assert_eq!(document.source, path.to_string_lossy());
    assert_eq!(document.markdown, "# Notes\nbody");
}

#[test]
fn load_docx_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("ops_log_20250615.docx");
    let xml = document_xml(&[
        paragraph(Some("1"), &run("Summary")),
        paragraph(None, &run("All districts normal")),
    ]);
    std::fs::write(&path, build_docx(&xml, Some(STYLES_XML))).expect("should write");

    let document = load_document(&path).expect("should load");
    assert_eq!(document.name, "ops_log_20250615");
    assert_eq!(document.markdown, "# Summary\nAll districts normal");
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("table.xlsx");
    std::fs::write(&path, b"binary").expect("should write");

    let error = load_document(&path).expect_err("should fail");
    assert!(error.to_string().contains("Unsupported document type"));
    assert!(!is_supported(&path));
    assert!(is_supported(std::path::Path::new("a/b/REPORT.DOCX")));
}
