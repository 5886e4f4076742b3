// Configuration management module
// TOML settings, prompt templates and the interactive setup wizard

pub mod interactive;
pub mod prompts;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use prompts::PromptConfig;
pub use settings::{
    AgentConfig, Config, ConfigError, DatabaseConfig, MAX_AGENT_STEPS, ModelConfig,
    VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
