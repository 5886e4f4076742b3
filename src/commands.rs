use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::agent::{
    Agent, AgentStep, DocSearchTool, DocumentSearch, FinalAnswerTool, QueryTool, StopReason,
    TextToSqlTool, TimeTool, ToolRegistry,
};
use crate::config::{Config, ConfigError, MAX_AGENT_STEPS};
use crate::database::Database;
use crate::database::mysql::render_rows;
use crate::indexer::{Indexer, collect_documents};
use crate::sql::SqlBridge;

/// Longest chunk preview printed by `list` and `search`
const PREVIEW_CHARS: usize = 120;

/// Ingest every supported file under `paths`
#[inline]
pub async fn ingest_documents(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let documents = collect_documents(paths)?;
    if documents.is_empty() {
        println!("No supported documents found (.docx, .md, .markdown, .txt).");
        return Ok(());
    }

    let mut indexer = Indexer::new(config).await?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(documents.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let mut ingested = 0;
    let mut failed = 0;
    let mut chunks_added = 0;

    for path in &documents {
        bar.set_message(path.display().to_string());
        match indexer.add_document(path).await {
            Ok(report) => {
                ingested += 1;
                chunks_added += report.chunks_added;
                bar.println(format!(
                    "{} {} ({} chunks)",
                    style("✓").green(),
                    report.source,
                    report.chunks_added
                ));
            }
            Err(e) => {
                failed += 1;
                error!("Failed to ingest {}: {:#}", path.display(), e);
                bar.println(format!("{} {}: {:#}", style("✗").red(), path.display(), e));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let total = indexer.count().await?;
    println!("Ingestion complete:");
    println!("  Documents ingested: {}", ingested);
    println!("  Documents failed: {}", failed);
    println!("  Chunks added: {}", chunks_added);
    println!("  Chunks in collection: {}", total);

    if failed > 0 && ingested == 0 {
        anyhow::bail!("No documents could be ingested");
    }
    Ok(())
}

/// Print every stored chunk grouped by source file
#[inline]
pub async fn list_chunks(config: &Config) -> Result<()> {
    let indexer = Indexer::new(config).await?;
    let chunks = indexer.list().await?;

    if chunks.is_empty() {
        println!(
            "Collection '{}' is empty.",
            indexer.vector_store().collection_name()
        );
        println!("Use 'cityops ingest <paths>' to add documents.");
        return Ok(());
    }

    println!(
        "Collection '{}' ({} chunks):",
        indexer.vector_store().collection_name(),
        chunks.len()
    );
    println!();

    let by_source = chunks
        .iter()
        .sorted_by(|a, b| {
            a.metadata
                .source
                .cmp(&b.metadata.source)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        })
        .chunk_by(|chunk| chunk.metadata.source.as_str());

    for (source, group) in &by_source {
        println!("📄 {}", style(source).bold());
        for chunk in group {
            println!(
                "   {}  {}",
                style(&chunk.id).cyan(),
                preview(&chunk.content)
            );
        }
        println!();
    }

    Ok(())
}

/// Print the `k` chunks closest to `query`
#[inline]
pub async fn search_documents(config: &Config, query: &str, k: usize) -> Result<()> {
    let indexer = Indexer::new(config).await?;
    let results = indexer.search(query, k).await?;

    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} {} (distance {:.4})",
            rank + 1,
            style(&result.chunk.id).cyan(),
            style(&result.chunk.metadata.source).dim(),
            result.distance
        );
        println!("{}", result.chunk.content);
        println!();
    }

    Ok(())
}

/// Remove chunks whose source contains `file_name`
#[inline]
pub async fn delete_documents(config: &Config, file_name: &str) -> Result<()> {
    let indexer = Indexer::new(config).await?;
    let removed = indexer.delete(file_name).await?;

    if removed.is_empty() {
        println!("No chunks matched '{}'.", file_name);
    } else {
        println!("Deleted {} chunks:", removed.len());
        for id in &removed {
            println!("  {}", id);
        }
    }

    Ok(())
}

/// Translate `question` into SQL, optionally running it
#[inline]
pub async fn text_to_sql(config: &Config, question: &str, execute: bool) -> Result<()> {
    let database = Database::connect_lazy(&config.database);
    let bridge = SqlBridge::from_config(config, database.clone())?;

    let sql = bridge.generate_sql(question).await?;
    println!("{}", sql);

    if execute {
        let rows = bridge.execute(&sql).await;
        eprintln!("{}", style(format!("{} rows", rows.len())).dim());
        if !rows.is_empty() {
            println!("{}", render_rows(&rows));
        }
    }

    database.close().await;
    Ok(())
}

/// Answer `question` with the tool agent, streaming each step to stderr
#[inline]
pub async fn ask(config: &Config, question: &str, max_steps: Option<usize>) -> Result<()> {
    if let Some(steps) = max_steps {
        if !(1..=MAX_AGENT_STEPS).contains(&steps) {
            return Err(ConfigError::InvalidMaxSteps(steps).into());
        }
    }

    let database = Database::connect_lazy(&config.database);
    let bridge = Arc::new(SqlBridge::from_config(config, database.clone())?);
    let indexer: Arc<dyn DocumentSearch> = Arc::new(Indexer::new(config).await?);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(TimeTool));
    registry.register(Arc::new(TextToSqlTool::new(Arc::clone(&bridge))));
    registry.register(Arc::new(QueryTool::new(bridge)));
    registry.register(Arc::new(DocSearchTool::new(indexer)));
    registry.register(Arc::new(FinalAnswerTool));

    let mut agent = Agent::from_config(config, registry)?;
    if let Some(max_steps) = max_steps {
        agent = agent.with_max_steps(max_steps);
    }
    info!("Agent tools: {}", agent.registry().names().join(", "));

    let run = agent.run_with_observer(question, print_step).await?;
    database.close().await;

    if run.stop_reason == StopReason::StepLimit {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Step limit of {} reached, answer summarised from gathered information",
                agent.max_steps()
            ))
            .yellow()
        );
    }

    println!("{}", run.answer);
    Ok(())
}

fn print_step(step: &AgentStep) {
    eprintln!("{}", style(format!("━━ Step {} ━━", step.number)).bold().cyan());

    if let Some(output) = &step.model_output {
        eprintln!("{}", style(output).dim());
    }

    for invocation in &step.invocations {
        eprintln!(
            "{} {}({})",
            style("→").yellow(),
            style(&invocation.tool).bold(),
            invocation.arguments
        );
        if invocation.is_error {
            eprintln!("  {}", style(&invocation.observation).red());
        } else {
            eprintln!("  {}", preview(&invocation.observation));
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_whitespace() {
        assert_eq!(preview("Fire\n  alarm\tat  noon"), "Fire alarm at noon");
    }

    #[tokio::test]
    async fn ask_rejects_out_of_range_step_limit() {
        let config = Config::default();

        for steps in [0, MAX_AGENT_STEPS + 1] {
            let error = ask(&config, "What happened today?", Some(steps))
                .await
                .expect_err("step limit should be rejected");
            assert!(error.to_string().contains("Invalid max steps"));
        }
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "a".repeat(PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
