//! Run coordinator: resolves the analysis context, runs the script and
//! writes the outcome back into the project's conversation.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::db::{
    ChatRecord, DatabaseConfig, Db, Message, MessageStatus, QueryBuilder, create_connection,
    ensure_schema,
};
use crate::error::{RunError, RunResult};
use crate::executor::ScriptExecutor;
use crate::model::{AnalysisStatus, RunOutcome};
use crate::types::{ActiveTurn, AnalysisId};
use crate::workspace::WorkspaceLocks;

/// Drives one analysis run end to end against the durable store.
pub struct RunCoordinator {
    db: Db,
    executor: ScriptExecutor,
    locks: WorkspaceLocks,
}

impl RunCoordinator {
    pub fn new(db: Db, executor: ScriptExecutor) -> Self {
        Self {
            db,
            executor,
            locks: WorkspaceLocks::new(),
        }
    }

    /// Connect to the store described by `config` and make sure the schema exists.
    pub async fn connect(config: DatabaseConfig, executor: ScriptExecutor) -> anyhow::Result<Self> {
        let db = create_connection(config).await?;
        ensure_schema(&db).await?;
        Ok(Self::new(db, executor))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Run the analysis in `working_dir` and record its results into `turn`
    /// of the project's conversation.
    ///
    /// A missing conversation is not an error; the outcome is still returned.
    pub async fn start(
        &self,
        working_dir: &Path,
        analysis_id: AnalysisId,
        turn: ActiveTurn,
    ) -> RunResult<RunOutcome> {
        let analysis = QueryBuilder::find_analysis(&self.db, analysis_id)
            .await?
            .ok_or(RunError::AnalysisNotFound(analysis_id))?;
        let project = analysis.project_id()?;
        info!("Analysis {} belongs to project {}", analysis_id, project);

        let mut chat = QueryBuilder::find_chat_by_project(&self.db, &project).await?;
        match &mut chat {
            Some(chat) => {
                mark_running(chat, turn)?;
                QueryBuilder::save_chat_messages(&self.db, chat).await?;
                debug!("Marked turn {} of chat {} as running", turn, chat.id);
            }
            None => warn!("No conversation for project {}; results will not be written back", project),
        }

        let executed = {
            let _guard = self.locks.acquire(working_dir).await;
            self.executor.execute(working_dir, analysis_id).await
        };
        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(chat) = &mut chat {
                    record_fatal(chat, turn, &err)?;
                    if let Err(save_err) = QueryBuilder::save_chat_messages(&self.db, chat).await {
                        warn!("Failed to record failure of analysis {}: {}", analysis_id, save_err);
                    }
                }
                return Err(err);
            }
        };

        if let Some(chat) = &mut chat {
            record_outcome(chat, turn, &outcome)?;
            QueryBuilder::save_chat_messages(&self.db, chat).await?;
            info!(
                "Wrote {} result of analysis {} to chat {}",
                outcome.status().as_str(),
                analysis_id,
                chat.id
            );
        }

        Ok(outcome)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn turn_mut(chat: &mut ChatRecord, turn: ActiveTurn) -> RunResult<&mut Message> {
    let len = chat.messages.len();
    chat.messages
        .get_mut(turn.index())
        .ok_or(RunError::TurnOutOfRange { turn, len })
}

fn mark_running(chat: &mut ChatRecord, turn: ActiveTurn) -> RunResult<()> {
    let message = turn_mut(chat, turn)?;
    message.status = MessageStatus::Running.as_str().to_string();
    message.timestamp = now_timestamp();
    Ok(())
}

/// Settle a running turn when the run aborted with a fatal error.
fn record_fatal(chat: &mut ChatRecord, turn: ActiveTurn, err: &RunError) -> RunResult<()> {
    let message = turn_mut(chat, turn)?;
    message.status = MessageStatus::Failure.as_str().to_string();
    message.error = err.to_string();
    message.timestamp = now_timestamp();
    Ok(())
}

fn record_outcome(chat: &mut ChatRecord, turn: ActiveTurn, outcome: &RunOutcome) -> RunResult<()> {
    let message = turn_mut(chat, turn)?;
    message.image = outcome.result.image.clone();
    message.text = outcome.result.text.clone();
    message.json = outcome.result.data.clone();
    message.status = match outcome.status() {
        AnalysisStatus::Success => MessageStatus::Success,
        AnalysisStatus::Failure => MessageStatus::Failure,
    }
    .as_str()
    .to_string();
    message.error = outcome
        .errors()
        .first()
        .map(|e| e.public.description.clone())
        .unwrap_or_default();
    message.timestamp = now_timestamp();
    Ok(())
}
