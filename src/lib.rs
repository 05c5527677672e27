// Core modules
mod artifacts;
mod config;
mod error;
mod executor;
mod model;
mod output;
mod types;
mod workspace;

pub mod db;
mod orchestrator;

// Re-export key types and functions
pub use artifacts::{ArtifactKind, RESERVED_DATA_FILE};
pub use config::RunnerConfig;
pub use db::{DatabaseConfig, QueryBuilder, create_connection, ensure_schema};
pub use error::{RunError, RunResult};
pub use executor::{SCRIPT_FAILED_MESSAGE, ScriptExecutor};
pub use model::{AnalysisError, AnalysisInfo, AnalysisStatus, ErrorContent, ErrorType, RunArtifacts, RunOutcome, Timing};
pub use orchestrator::RunCoordinator;
pub use output::generate_output;
pub use types::{ActiveTurn, AnalysisId, ImageRef, ProjectId};

use std::path::Path;

/// Convenience function to run one analysis end to end.
///
/// Connects to the store, runs the script found in `working_dir` and writes
/// the results into `turn` of the project's conversation.
pub async fn run_analysis(
    db_config: DatabaseConfig,
    runner_config: RunnerConfig,
    working_dir: &Path,
    analysis_id: AnalysisId,
    turn: ActiveTurn,
) -> anyhow::Result<RunOutcome> {
    let coordinator = RunCoordinator::connect(db_config, ScriptExecutor::new(runner_config)).await?;
    let outcome = coordinator.start(working_dir, analysis_id, turn).await?;
    Ok(outcome)
}
