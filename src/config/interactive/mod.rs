
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

use super::{Config, ConfigError, DatabaseConfig, ModelConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 cityops Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Model Server").bold().yellow());
    eprintln!("Configure the OpenAI-compatible server used for chat, SQL and embeddings.");
    eprintln!();

    configure_model(&mut config.model)?;

    eprintln!();
    eprintln!("{}", style("Testing model server...").yellow());

    if test_model_connection(&config.model) {
        eprintln!("{}", style("✓ Model server reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the model server").yellow()
        );
        eprintln!("You can continue, but make sure it is running before ingesting or asking.");
    }

    eprintln!();
    eprintln!("{}", style("Event Database").bold().yellow());
    configure_database(&mut config.database)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Model Server:").bold().yellow());
    match config.api_base_url() {
        Ok(url) => eprintln!("  API base: {}", style(url).cyan()),
        Err(e) => eprintln!("  API base: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Chat model: {}", style(&config.model.chat_model).cyan());
    eprintln!("  SQL model: {}", style(&config.model.sql_model).cyan());
    eprintln!(
        "  Embedding model: {}",
        style(&config.model.embedding_model).cyan()
    );
    eprintln!("  Batch size: {}", style(config.model.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Knowledge Base:").bold().yellow());
    eprintln!(
        "  Collection: {}",
        style(&config.vector_store.collection_name).cyan()
    );
    eprintln!(
        "  Heading depth: {}",
        style(config.chunking.max_heading_depth).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Event Database:").bold().yellow());
    eprintln!(
        "  Server: {}",
        style(format!(
            "{}@{}:{}/{}",
            config.database.user,
            config.database.host,
            config.database.port,
            config.database.database
        ))
        .cyan()
    );
    eprintln!("  Table: {}", style(&config.database.table_name).cyan());

    eprintln!();
    eprintln!("  Agent max steps: {}", style(config.agent.max_steps).cyan());
    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_model(model: &mut ModelConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == model.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Model server protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;
    model.set_protocol(protocols[protocol_index].to_string())?;

    let host: String = Input::new()
        .with_prompt("Model server host")
        .default(model.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ModelConfig {
                host: input.clone(),
                ..model.clone()
            };
            temp_config.api_base_url().map(|_| ())
        })
        .interact_text()?;
    model.set_host(host)?;

    let port: u16 = Input::new()
        .with_prompt("Model server port")
        .default(model.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    model.set_port(port)?;

    model.api_path = Input::new()
        .with_prompt("API path")
        .default(model.api_path.clone())
        .allow_empty(true)
        .interact_text()?;

    model.chat_model = prompt_model_name("Agent chat model", &model.chat_model)?;
    model.sql_model = prompt_model_name("Text-to-SQL model", &model.sql_model)?;
    model.embedding_model = prompt_model_name("Embedding model", &model.embedding_model)?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(model.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    model.set_batch_size(batch_size)?;

    Ok(())
}

fn prompt_model_name(prompt: &str, current: &str) -> Result<String> {
    let name: String = Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(name.trim().to_string())
}

fn configure_database(database: &mut DatabaseConfig) -> Result<()> {
    database.host = Input::new()
        .with_prompt("Database host")
        .default(database.host.clone())
        .interact_text()?;

    database.port = Input::new()
        .with_prompt("Database port")
        .default(database.port)
        .interact_text()?;

    database.user = Input::new()
        .with_prompt("Database user")
        .default(database.user.clone())
        .interact_text()?;

    let password = Password::new()
        .with_prompt("Database password (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;
    if !password.is_empty() {
        database.password = password;
    }

    database.database = Input::new()
        .with_prompt("Database name")
        .default(database.database.clone())
        .interact_text()?;

    database.table_name = Input::new()
        .with_prompt("Event table")
        .default(database.table_name.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            if super::settings::is_valid_table_name(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidTableName(input.clone()))
            }
        })
        .interact_text()?;

    database.validate()?;
    Ok(())
}

/// Any HTTP answer from `GET {api_base}models` counts as reachable
fn test_model_connection(model: &ModelConfig) -> bool {
    let Ok(url) = model.api_base_url().and_then(|base| {
        base.join("models")
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
