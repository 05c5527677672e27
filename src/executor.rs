use std::path::Path;
use std::process::Stdio;

use chrono::Utc;
use tokio::process::Command;
use tracing::{info, warn};

use crate::artifacts::ArtifactCollector;
use crate::config::RunnerConfig;
use crate::error::RunResult;
use crate::model::{AnalysisError, AnalysisStatus, RunOutcome};
use crate::output::generate_output;
use crate::types::AnalysisId;
use crate::workspace::Workspace;

/// User-facing description attached to a failed script invocation.
pub const SCRIPT_FAILED_MESSAGE: &str = "the script failed to execute";

/// Runs the external analysis script and gathers what it produces.
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    config: RunnerConfig,
}

impl ScriptExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Execute the script found in `working_dir` on behalf of `analysis_id`.
    ///
    /// A missing script or a failed invocation is reported through the
    /// returned outcome with status `Failure`. Errors are reserved for
    /// filesystem failures and malformed script output.
    pub async fn execute(&self, working_dir: &Path, analysis_id: AnalysisId) -> RunResult<RunOutcome> {
        let start = Utc::now();
        let workspace = Workspace::new(working_dir, &self.config);

        if !workspace.has_script().await? {
            info!(
                "No script at {}; nothing to run for analysis {}",
                workspace.script_path().display(),
                analysis_id
            );
            return Ok(generate_output(
                start,
                None,
                None,
                String::new(),
                AnalysisStatus::Failure,
                Vec::new(),
            ));
        }

        workspace.ensure_dirs().await?;

        if let Err(diagnostics) = self.invoke(&workspace).await {
            warn!("Script for analysis {} failed: {}", analysis_id, diagnostics.trim_end());
            return Ok(generate_output(
                start,
                None,
                None,
                String::new(),
                AnalysisStatus::Failure,
                vec![AnalysisError::generic(diagnostics, SCRIPT_FAILED_MESSAGE)],
            ));
        }

        let collected = ArtifactCollector::new(workspace.output_dir(), workspace.data_dir(), analysis_id)
            .collect()
            .await?;

        Ok(generate_output(
            start,
            collected.image,
            collected.data,
            collected.text,
            AnalysisStatus::Success,
            Vec::new(),
        ))
    }

    /// Launch the interpreter and wait for it to exit.
    ///
    /// On failure returns the combined stdout/stderr of the process, or the
    /// launch error when it never started.
    async fn invoke(&self, workspace: &Workspace) -> Result<(), String> {
        let args = workspace.script_args();
        info!(
            "Running `{} {}`",
            self.config.interpreter,
            args.iter()
                .map(|a| a.display().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.config.interpreter)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to launch `{}`: {e}", self.config.interpreter))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let combined = String::from_utf8_lossy(&combined).into_owned();

        if output.status.success() {
            info!("Script exited successfully");
            Ok(())
        } else {
            warn!("Script exited with {}", output.status);
            Err(combined)
        }
    }
}
