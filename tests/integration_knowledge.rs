#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end knowledge base tests: docx and markdown ingestion, search and
//! deletion against an on-disk LanceDB collection and a stubbed embedding server.

mod common;

use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::MockServer;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use cityops::indexer::{Indexer, collect_documents};
use common::{init_test_tracing, mount_embeddings, test_config};

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="2"><w:name w:val="heading 2"/></w:style>
</w:styles>"#;

fn write_ops_log(path: &Path, sections: &[(&str, &str)]) {
    let mut body = String::from(
        r#"<w:p><w:pPr><w:pStyle w:val="1"/></w:pPr><w:r><w:t>City Operations Daily Log</w:t></w:r></w:p>"#,
    );
    for (heading, text) in sections {
        body.push_str(&format!(
            r#"<w:p><w:pPr><w:pStyle w:val="2"/></w:pPr><w:r><w:t>{heading}</w:t></w:r></w:p><w:p><w:r><w:t>{text}</w:t></w:r></w:p>"#
        ));
    }
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let file = std::fs::File::create(path).expect("should create docx");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer
        .start_file("word/document.xml", options)
        .expect("should start document part");
    writer
        .write_all(document.as_bytes())
        .expect("should write document part");
    writer
        .start_file("word/styles.xml", options)
        .expect("should start styles part");
    writer
        .write_all(STYLES_XML.as_bytes())
        .expect("should write styles part");
    writer.finish().expect("should finish docx");
}

#[tokio::test]
async fn ingest_directory_then_search_and_delete() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let logs = temp_dir.path().join("logs");
    std::fs::create_dir_all(&logs).expect("should create logs dir");

    write_ops_log(
        &logs.join("ops_log_20250615.docx"),
        &[
            ("Fire Service", "Two fire alarms in the north district."),
            ("Water Supply", "Water main burst on 5th Avenue, repaired by 18:00."),
        ],
    );
    write_ops_log(
        &logs.join("ops_log_20250616.docx"),
        &[("Traffic", "Traffic signal outage at Central Square.")],
    );
    std::fs::write(
        logs.join("power_notes.md"),
        "# Grid\nPower restored to 1200 homes after the storm.",
    )
    .expect("should write markdown");
    std::fs::write(logs.join("~$ops_log_20250615.docx"), b"lock").expect("should write lock file");

    let config = test_config(&server, temp_dir.path());
    let mut indexer = Indexer::new(&config).await.expect("should create indexer");

    let documents = collect_documents(&[logs]).expect("should collect documents");
    assert_eq!(documents.len(), 3);

    let mut total = 0;
    for document in &documents {
        let report = indexer.add_document(document).await.expect("should ingest");
        total += report.chunks_added;
        assert_eq!(report.total_chunks, total);
    }
    assert_eq!(total, 4);

    let results = indexer
        .search("Where did the water main burst?", 2)
        .await
        .expect("should search");
    assert_eq!(results.len(), 2);
    let best = &results[0].chunk;
    assert_eq!(best.id, "ops_log_20250615_1");
    assert_eq!(
        best.content,
        "City Operations Daily Log\nWater Supply\nWater main burst on 5th Avenue, repaired by 18:00."
    );
    assert_eq!(
        best.metadata.headings,
        vec!["City Operations Daily Log", "Water Supply"]
    );
    assert!(results[0].distance <= results[1].distance);

    let mut removed = indexer
        .delete("ops_log_2025061")
        .await
        .expect("should delete");
    removed.sort();
    assert_eq!(
        removed,
        vec!["ops_log_20250615_0", "ops_log_20250615_1", "ops_log_20250616_0"]
    );

    let remaining = indexer.list().await.expect("should list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].metadata.document_name, "power_notes");
}

#[tokio::test]
async fn collection_persists_across_indexers() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("weekly.md");
    std::fs::write(&path, "# Summary\nNo traffic incidents this week.").expect("should write");

    let config = test_config(&server, temp_dir.path());
    {
        let mut indexer = Indexer::new(&config).await.expect("should create indexer");
        indexer.add_document(&path).await.expect("should ingest");
    }

    let indexer = Indexer::new(&config).await.expect("should reopen indexer");
    assert_eq!(indexer.count().await.expect("should count"), 1);

    let results = indexer.search("traffic", 5).await.expect("should search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.metadata.source, path.to_string_lossy());
}

#[tokio::test]
async fn reingesting_a_file_duplicates_its_chunks() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("incident.md");
    std::fs::write(&path, "# Fire\nWarehouse fire contained.\n# Power\nSubstation offline.")
        .expect("should write");

    let config = test_config(&server, temp_dir.path());
    let mut indexer = Indexer::new(&config).await.expect("should create indexer");
    indexer.add_document(&path).await.expect("first ingest");
    indexer.add_document(&path).await.expect("second ingest");

    let chunks = indexer.list().await.expect("should list");
    assert_eq!(chunks.len(), 4);
    let first: Vec<_> = chunks.iter().filter(|c| c.id == "incident_0").collect();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].content, first[1].content);
}
