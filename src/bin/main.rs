use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use analysis_runner::db::{AnalysisCreate, ChatCreate, Message};
use analysis_runner::{
    ActiveTurn, AnalysisId, DatabaseConfig, ProjectId, QueryBuilder, RunOutcome, RunnerConfig,
    ScriptExecutor, create_connection, ensure_schema, run_analysis,
};

#[derive(Parser)]
#[command(name = "analysis-runner")]
#[command(about = "Run an analysis script and record its artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis and write its results into the project's conversation
    Run {
        /// Directory holding python/script.py
        #[arg(long)]
        working_dir: PathBuf,
        #[arg(long)]
        analysis_id: AnalysisId,
        /// Conversation message that receives the results
        #[arg(long, default_value_t = 0)]
        turn: usize,
        #[arg(long, env = "ANALYSIS_DB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Run the script and collect artifacts without touching the store
    Execute {
        #[arg(long)]
        working_dir: PathBuf,
        /// Defaults to a fresh random id
        #[arg(long)]
        analysis_id: Option<AnalysisId>,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "ANALYSIS_DB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create an analysis and a conversation for local trials
    Seed {
        #[arg(long)]
        project: String,
        /// Request text of the opening message
        #[arg(long, default_value = "")]
        request: String,
        #[arg(long, env = "ANALYSIS_DB_URL", default_value = "memory")]
        db_url: String,
    },
}

fn db_config(url: String) -> DatabaseConfig {
    DatabaseConfig {
        url,
        ..Default::default()
    }
}

fn print_outcome(outcome: &RunOutcome) -> Result<()> {
    for error in outcome.errors() {
        warn!("{}", error.private.description.trim_end());
    }
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

/// Default directives, overridden by anything `RUST_LOG` sets for the same target.
fn log_filter(rust_log: &str) -> EnvFilter {
    let mut directives = String::from("analysis_runner=info,surrealdb=warn");
    if !rust_log.trim().is_empty() {
        directives.push(',');
        directives.push_str(rust_log);
    }
    EnvFilter::builder().parse_lossy(directives)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON envelope.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&std::env::var("RUST_LOG").unwrap_or_default()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            working_dir,
            analysis_id,
            turn,
            db_url,
        } => {
            let runner_config = RunnerConfig::load()?;
            info!("Running analysis {} in {}", analysis_id, working_dir.display());

            let outcome = run_analysis(
                db_config(db_url),
                runner_config,
                &working_dir,
                analysis_id,
                ActiveTurn::new(turn),
            )
            .await
            .with_context(|| format!("analysis {analysis_id} failed"))?;
            print_outcome(&outcome)?;
        }
        Commands::Execute {
            working_dir,
            analysis_id,
        } => {
            let executor = ScriptExecutor::new(RunnerConfig::load()?);
            let analysis_id = analysis_id.unwrap_or_else(AnalysisId::random);
            info!("Executing script for {} in {}", analysis_id, working_dir.display());

            let outcome = executor.execute(&working_dir, analysis_id).await?;
            print_outcome(&outcome)?;
        }
        Commands::Init { db_url } => {
            info!("Initializing database at {}", db_url);
            let db = create_connection(db_config(db_url)).await?;
            ensure_schema(&db).await?;
            info!("Database schema ready");
        }
        Commands::Seed {
            project,
            request,
            db_url,
        } => {
            let db = create_connection(db_config(db_url)).await?;
            ensure_schema(&db).await?;

            let analysis_id = AnalysisId::random();
            let config = serde_json::json!({ "python": { "project": project } });
            let config = config
                .as_object()
                .cloned()
                .context("seed config is not an object")?;
            QueryBuilder::create_analysis(&db, analysis_id, &AnalysisCreate { config }).await?;

            let chat = QueryBuilder::create_chat(
                &db,
                &ChatCreate {
                    project: ProjectId::new(project),
                    messages: vec![Message::with_request(request)],
                },
            )
            .await?;

            info!("Seeded chat {}", chat.id);
            println!("{analysis_id}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter("").max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_log_filter_honours_rust_log() {
        assert_eq!(
            log_filter("analysis_runner=debug").max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(log_filter("trace").max_level_hint(), Some(LevelFilter::TRACE));
    }
}
