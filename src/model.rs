use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Failure,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Classification attached to each side of an [`AnalysisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    GenericError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub description: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
}

/// A reported (non-fatal) failure.
///
/// `private` carries diagnostics meant for logs, `public` is safe to show
/// to an end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisError {
    pub private: ErrorContent,
    pub public: ErrorContent,
}

impl AnalysisError {
    pub fn generic(private_description: impl Into<String>, public_description: impl Into<String>) -> Self {
        Self {
            private: ErrorContent {
                description: private_description.into(),
                error_type: ErrorType::GenericError,
            },
            public: ErrorContent {
                description: public_description.into(),
                error_type: ErrorType::GenericError,
            },
        }
    }
}

/// Artifacts captured from the external script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    /// Image reference (the analysis id), empty when no image was produced.
    pub image: String,
    /// Decoded structured output, if any.
    pub data: Option<Map<String, Value>>,
    /// Text report, each line newline-terminated.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// RFC 3339 start timestamp.
    pub start: String,
    /// RFC 3339 end timestamp, never earlier than `start`.
    pub end: String,
    #[serde(rename = "deltaSeconds")]
    pub delta_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub errors: Vec<AnalysisError>,
    pub time: Timing,
    pub status: AnalysisStatus,
}

/// Normalized result record of one run.
///
/// Every file it references has already been moved into durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub result: RunArtifacts,
    #[serde(rename = "analysisInfo")]
    pub analysis_info: AnalysisInfo,
}

impl RunOutcome {
    pub fn status(&self) -> AnalysisStatus {
        self.analysis_info.status
    }

    pub fn is_success(&self) -> bool {
        self.analysis_info.status == AnalysisStatus::Success
    }

    pub fn errors(&self) -> &[AnalysisError] {
        &self.analysis_info.errors
    }
}
