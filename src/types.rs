//! NewType wrappers for the identifiers that flow through a run.
//!
//! These keep an analysis id, a project reference and a message index from
//! being swapped for one another at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Macro to generate a NewType wrapper around `String` with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Project reference stored under `config.python.project` of an analysis.
    ///
    /// Conversation records are keyed by this value.
    ProjectId
);

newtype_string!(
    /// Reference to a relocated image artifact.
    ///
    /// By convention this is the analysis id itself; the file lives at
    /// `<data_dir>/<analysis_id>.png`.
    ImageRef
);

/// Opaque unique token naming one invocation of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(Uuid);

impl AnalysisId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// File name for an artifact of this analysis with the given extension.
    pub fn artifact_file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl From<Uuid> for AnalysisId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for AnalysisId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of the conversation message a run writes its results into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveTurn(usize);

impl ActiveTurn {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// The opening message of a conversation.
    pub fn first() -> Self {
        Self(0)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ActiveTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
