#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local MySQL server
// Run with: cargo test --test integration_mysql -- --ignored
//
// Connection settings come from MYSQL_HOST, MYSQL_PORT, MYSQL_USER,
// MYSQL_PASSWORD and MYSQL_DATABASE, defaulting to root@localhost:3306/test.

use serde_json::json;
use std::env;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cityops::config::{DatabaseConfig, ModelConfig, PromptConfig};
use cityops::database::Database;
use cityops::llm::ChatClient;
use cityops::sql::SqlBridge;

const TEST_TABLE: &str = "cityops_test_events";

fn database_config() -> DatabaseConfig {
    let defaults = DatabaseConfig::default();
    DatabaseConfig {
        host: env::var("MYSQL_HOST").unwrap_or(defaults.host),
        port: env::var("MYSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port),
        user: env::var("MYSQL_USER").unwrap_or(defaults.user),
        password: env::var("MYSQL_PASSWORD").unwrap_or(defaults.password),
        database: env::var("MYSQL_DATABASE").unwrap_or(defaults.database),
        charset: "utf8mb4".to_string(),
        table_name: TEST_TABLE.to_string(),
    }
}

async fn seeded_database() -> Database {
    let database = Database::connect(&database_config())
        .await
        .expect("MySQL should be reachable");

    sqlx::raw_sql(&format!(
        "DROP TABLE IF EXISTS `{TEST_TABLE}`;
         CREATE TABLE `{TEST_TABLE}` (
             `id` int NOT NULL AUTO_INCREMENT,
             `dt` date NOT NULL,
             `district` varchar(32) NOT NULL,
             `event_type` varchar(32) NOT NULL,
             `severity` decimal(3,1) DEFAULT NULL,
             PRIMARY KEY (`id`)
         );
         INSERT INTO `{TEST_TABLE}` (`dt`, `district`, `event_type`, `severity`) VALUES
             ('2025-06-15', 'North', 'fire', 2.5),
             ('2025-06-15', 'North', 'traffic', NULL),
             ('2025-06-16', 'Harbour', 'water', 4.0);"
    ))
    .execute(database.pool())
    .await
    .expect("should seed test table");

    database
}

#[tokio::test]
#[ignore = "requires a local MySQL server"]
async fn show_create_table_returns_ddl() {
    let database = seeded_database().await;

    let ddl = database
        .show_create_table(TEST_TABLE)
        .await
        .expect("should describe table");

    assert!(ddl.starts_with(&format!("CREATE TABLE `{TEST_TABLE}`")));
    assert!(ddl.contains("`district`"));
    database.close().await;
}

#[tokio::test]
#[ignore = "requires a local MySQL server"]
async fn fetch_rows_keeps_column_order_and_types() {
    let database = seeded_database().await;

    let rows = database
        .fetch_rows(&format!(
            "SELECT district, COUNT(*) AS events, MAX(severity) AS worst, MIN(dt) AS first_day \
             FROM `{TEST_TABLE}` GROUP BY district ORDER BY district"
        ))
        .await
        .expect("should run query");

    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].columns().collect::<Vec<_>>(),
        vec!["district", "events", "worst", "first_day"]
    );
    assert_eq!(rows[0].get("district"), Some(&json!("Harbour")));
    assert_eq!(rows[0].get("events"), Some(&json!(1)));
    assert_eq!(rows[1].get("first_day"), Some(&json!("2025-06-15")));
    database.close().await;
}

#[tokio::test]
#[ignore = "requires a local MySQL server"]
async fn bridge_answers_against_live_table() {
    let database = seeded_database().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": format!(
                "```sql\nSELECT COUNT(*) AS fires FROM `{TEST_TABLE}` WHERE event_type = 'fire'\n```"
            ) } }]
        })))
        .mount(&server)
        .await;

    let address = server.address();
    let model = ModelConfig {
        host: address.ip().to_string(),
        port: address.port(),
        ..ModelConfig::default()
    };
    let chat = ChatClient::new(&model, &model.sql_model).expect("chat client");
    let bridge = SqlBridge::new(
        Arc::new(database.clone()),
        chat,
        TEST_TABLE,
        &PromptConfig::default().sql_template,
    );

    assert!(bridge.table_info().await.contains("`event_type`"));

    let rows = bridge
        .answer("How many fires were reported?")
        .await
        .expect("should answer");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("fires"), Some(&json!(1)));

    assert!(bridge.execute("SELECT * FROM missing_table_xyz").await.is_empty());
    database.close().await;
}
