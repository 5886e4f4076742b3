// Shared fixtures for integration tests

use cityops::config::{Config, ModelConfig};
use serde_json::{Value, json};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const KEYWORDS: [&str; 4] = ["fire", "water", "traffic", "power"];

/// Embedding server stand-in: one dimension per keyword, set when the text mentions it
pub struct KeywordEmbedder;

impl Respond for KeywordEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("request should be JSON");
        let data: Vec<Value> = body["input"]
            .as_array()
            .expect("input should be an array")
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let text = text.as_str().unwrap_or_default().to_lowercase();
                let vector: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|keyword| if text.contains(keyword) { 1.0 } else { 0.0 })
                    .collect();
                json!({ "index": index, "embedding": vector })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

pub async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbedder)
        .mount(server)
        .await;
}

pub fn test_config(server: &MockServer, base_dir: &Path) -> Config {
    let address = server.address();
    Config {
        model: ModelConfig {
            host: address.ip().to_string(),
            port: address.port(),
            embedding_dimension: u32::try_from(KEYWORDS.len()).expect("few keywords"),
            ..ModelConfig::default()
        },
        base_dir: base_dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
