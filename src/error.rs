use std::fmt;

use crate::{content::ContentKind, ledger::Partition, outcome::TaskOutcome};

/// A content item that shares its name with at least one other item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub project: String,
    pub name: String,
    pub id: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} (id: {})", self.project, self.name, self.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("to pause or unpause a {kind}, provide its name or its id")]
    InvalidInput { kind: ContentKind },

    #[error("no {kind} with {field} `{value}` was found")]
    NotFound {
        kind: ContentKind,
        field: &'static str,
        value: String,
    },

    #[error(
        "multiple {kind}s match the name `{name}`, use the id instead:\n{}",
        list_candidates(.candidates)
    )]
    AmbiguousName {
        kind: ContentKind,
        name: String,
        candidates: Vec<Candidate>,
    },

    #[error("unexpected response from the server ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error(
        "{} of {} {partition} tasks for `{content_id}` failed to unpause; ledger left unchanged",
        count_unsettled(.outcomes),
        .outcomes.len()
    )]
    PartialUnpause {
        partition: Partition,
        content_id: String,
        outcomes: Vec<TaskOutcome>,
    },

    #[error("no paused {partition} tasks have been recorded yet")]
    LedgerMissing { partition: Partition },

    #[error("session is not signed in")]
    NotSignedIn,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<toml::de::Error> for RefreshError {
    fn from(err: toml::de::Error) -> Self {
        RefreshError::Config(err.to_string())
    }
}

fn list_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("  {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn count_unsettled(outcomes: &[TaskOutcome]) -> usize {
    outcomes.iter().filter(|o| !o.is_completed()).count()
}

pub type Result<T> = std::result::Result<T, RefreshError>;
