use serde::Serialize;

use crate::{error::Result, ledger::PausedTaskRecord, session::ServerResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The server answered with the expected success code.
    Completed { response: ServerResponse },
    /// The server answered with any other code.
    Rejected { response: ServerResponse },
    /// The call never produced a response.
    Failed { message: String },
}

/// What happened to one row of a delete or create batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub record: PausedTaskRecord,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl TaskOutcome {
    pub fn from_call(
        record: PausedTaskRecord,
        call: Result<ServerResponse>,
        success_status: u16,
    ) -> Self {
        let status = match call {
            Ok(response) if response.status == success_status => {
                OutcomeStatus::Completed { response }
            }
            Ok(response) => OutcomeStatus::Rejected { response },
            Err(err) => OutcomeStatus::Failed {
                message: err.to_string(),
            },
        };
        Self { record, status }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, OutcomeStatus::Rejected { .. })
    }

    pub fn status_label(&self) -> String {
        match &self.status {
            OutcomeStatus::Completed { response } => format!("ok ({})", response.status),
            OutcomeStatus::Rejected { response } => format!("rejected ({})", response.status),
            OutcomeStatus::Failed { message } => format!("failed: {message}"),
        }
    }
}

/// Records the server explicitly refused to act on.
pub fn rejected_records(outcomes: &[TaskOutcome]) -> Vec<PausedTaskRecord> {
    outcomes
        .iter()
        .filter(|o| o.is_rejected())
        .map(|o| o.record.clone())
        .collect()
}
