use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            model: ModelConfig {
                protocol: "https".to_string(),
                host: "test-host".to_string(),
                port: 8080,
                chat_model: "test-chat".to_string(),
                ..ModelConfig::default()
            },
            database: DatabaseConfig {
                user: "reporter".to_string(),
                password: "secret".to_string(),
                ..DatabaseConfig::default()
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [model
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_rejected() {
        let invalid_toml = r#"
            [database]
            port = "three thousand"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn url_generation_with_different_hosts() {
        let cases = vec![
            ("http", "localhost", 9997, "http://localhost:9997/v1/"),
            ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/v1/"),
            ("https", "models.example.com", 443, "https://models.example.com/v1/"),
        ];

        for (protocol, host, port, expected_url) in cases {
            let config = Config {
                model: ModelConfig {
                    protocol: protocol.to_string(),
                    host: host.to_string(),
                    port,
                    ..ModelConfig::default()
                },
                ..Config::default()
            };

            let url = config.api_base_url().expect("api_base_url is ok");
            assert_eq!(url.as_str(), expected_url);
        }
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidTableName("a b".to_string()),
            ConfigError::MissingPlaceholder("{question}"),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }
}
