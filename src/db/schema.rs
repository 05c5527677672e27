use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb::RecordId;

use crate::error::{RunError, RunResult};
use crate::types::{AnalysisId, ProjectId};

/// Persisted analysis configuration (table: `analysis`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// `analysis:<uuid>`.
    pub id: RecordId,
    /// Free-form configuration; must contain `python.project`.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl AnalysisRecord {
    pub fn record_id(analysis_id: AnalysisId) -> RecordId {
        RecordId::from(("analysis", analysis_id.to_string()))
    }

    /// Project reference from the `python` section of the config.
    pub fn project_id(&self) -> RunResult<ProjectId> {
        let python = self
            .config
            .get("python")
            .and_then(Value::as_object)
            .ok_or_else(|| RunError::MalformedConfig("missing `python` section".to_string()))?;

        python
            .get("project")
            .and_then(Value::as_str)
            .map(ProjectId::from)
            .ok_or_else(|| RunError::MalformedConfig("`python.project` is not a string".to_string()))
    }
}

/// Payload used when seeding an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCreate {
    pub config: Map<String, Value>,
}

/// Lifecycle of a conversation message with respect to its analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One entry in a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub request: String,
    pub code: String,
    pub followup: Vec<String>,
    pub text: String,
    /// Structured payload produced by the analysis.
    pub json: Option<Map<String, Value>>,
    /// Image reference produced by the analysis.
    pub image: String,
    pub agent: String,
    pub error: String,
    pub status: String,
    pub timestamp: String,
}

impl Message {
    pub fn with_request(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            status: MessageStatus::Pending.as_str().to_string(),
            ..Default::default()
        }
    }
}

/// Persisted conversation (table: `chat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: RecordId,
    pub project: ProjectId,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Payload used when seeding a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCreate {
    pub project: ProjectId,
    pub messages: Vec<Message>,
}
