use anyhow::Context;
use clap::{Parser, Subcommand};
use cityops::Result;
use cityops::agent::tools::DEFAULT_SEARCH_K;
use cityops::commands::{
    ask, delete_documents, ingest_documents, list_chunks, search_documents, text_to_sql,
};
use cityops::config::{
    Config, MAX_AGENT_STEPS, get_config_dir, run_interactive_config, show_config,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cityops")]
#[command(about = "Question answering over city operations logs and event data")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, prompts.toml and the vector store (default ~/.cityops)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model server and event database
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load, chunk and embed documents into the knowledge base
    Ingest {
        /// Files or directories (.docx, .md, .markdown, .txt)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List stored chunks
    List,
    /// Search the knowledge base
    Search {
        query: String,
        /// Number of chunks to return
        #[arg(short, default_value_t = DEFAULT_SEARCH_K)]
        k: usize,
    },
    /// Delete chunks whose source path contains FILE_NAME
    Delete { file_name: String },
    /// Translate a question into SQL over the event table
    Sql {
        question: String,
        /// Run the generated SQL and print the rows
        #[arg(long)]
        execute: bool,
    },
    /// Answer a question with the tool agent
    Ask {
        question: String,
        /// Override the configured step limit (1-100)
        #[arg(long, value_parser = parse_max_steps)]
        max_steps: Option<usize>,
    },
}

fn parse_max_steps(value: &str) -> std::result::Result<usize, String> {
    let steps: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if (1..=MAX_AGENT_STEPS).contains(&steps) {
        Ok(steps)
    } else {
        Err(format!("must be between 1 and {MAX_AGENT_STEPS}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to locate configuration directory")?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest { paths } => {
            ingest_documents(&config, &paths).await?;
        }
        Commands::List => {
            list_chunks(&config).await?;
        }
        Commands::Search { query, k } => {
            search_documents(&config, &query, k).await?;
        }
        Commands::Delete { file_name } => {
            delete_documents(&config, &file_name).await?;
        }
        Commands::Sql { question, execute } => {
            text_to_sql(&config, &question, execute).await?;
        }
        Commands::Ask {
            question,
            max_steps,
        } => {
            ask(&config, &question, max_steps).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["cityops", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn ingest_requires_paths() {
        let cli = Cli::try_parse_from(["cityops", "ingest"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["cityops", "ingest", "logs/", "extra.md"]);
        if let Ok(parsed) = cli {
            if let Commands::Ingest { paths } = parsed.command {
                assert_eq!(paths, vec![PathBuf::from("logs/"), PathBuf::from("extra.md")]);
            } else {
                panic!("expected ingest");
            }
        } else {
            panic!("ingest should parse");
        }
    }

    #[test]
    fn search_defaults_k() {
        let cli = Cli::try_parse_from(["cityops", "search", "water outage"]);
        if let Ok(Cli {
            command: Commands::Search { query, k },
            ..
        }) = cli
        {
            assert_eq!(query, "water outage");
            assert_eq!(k, DEFAULT_SEARCH_K);
        } else {
            panic!("search should parse");
        }

        let cli = Cli::try_parse_from(["cityops", "search", "fire", "-k", "7"]);
        if let Ok(Cli {
            command: Commands::Search { k, .. },
            ..
        }) = cli
        {
            assert_eq!(k, 7);
        } else {
            panic!("search with k should parse");
        }
    }

    #[test]
    fn sql_execute_flag() {
        let cli = Cli::try_parse_from(["cityops", "sql", "How many events?", "--execute"]);
        if let Ok(Cli {
            command: Commands::Sql { question, execute },
            ..
        }) = cli
        {
            assert_eq!(question, "How many events?");
            assert!(execute);
        } else {
            panic!("sql should parse");
        }
    }

    #[test]
    fn ask_with_max_steps_and_config_dir() {
        let cli = Cli::try_parse_from([
            "cityops",
            "ask",
            "What happened yesterday?",
            "--max-steps",
            "4",
            "--config-dir",
            "/tmp/cityops",
        ]);
        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/cityops")));
            if let Commands::Ask {
                question,
                max_steps,
            } = parsed.command
            {
                assert_eq!(question, "What happened yesterday?");
                assert_eq!(max_steps, Some(4));
            } else {
                panic!("expected ask");
            }
        } else {
            panic!("ask should parse");
        }
    }

    #[test]
    fn ask_rejects_out_of_range_max_steps() {
        for steps in ["0", "101", "many"] {
            let cli = Cli::try_parse_from(["cityops", "ask", "Any fires?", "--max-steps", steps]);
            assert!(cli.is_err());

            if let Err(err) = cli {
                assert_eq!(err.kind(), ErrorKind::ValueValidation);
            }
        }

        let cli = Cli::try_parse_from(["cityops", "ask", "Any fires?", "--max-steps", "100"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["cityops", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["cityops", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["cityops", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
