use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const TASK_CREATED_STATUS: u16 = 200;
pub const TASK_DELETED_STATUS: u16 = 204;
pub const METADATA_SUCCESS_STATUS: u16 = 200;
pub const SCHEDULE_UPDATED_STATUS: u16 = 200;

/// Status code and raw body of a server call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerResponse {
    pub status: u16,
    pub body: String,
}

impl ServerResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One extract refresh task as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskListing {
    pub id: String,
    pub schedule: ScheduleRef,
    #[serde(default)]
    pub workbook: Option<IdRef>,
    #[serde(default)]
    pub datasource: Option<IdRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectRef {
    #[serde(default)]
    pub name: String,
}

/// A workbook or datasource as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentListing {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project: Option<ProjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleListing {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub schedule_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Active,
    Suspended,
}

impl ScheduleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleState::Active => "Active",
            ScheduleState::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated handle on the analytics server.
///
/// Mutating calls hand back the raw response; callers decide whether the
/// status code counts as success. Only transport problems are errors.
#[async_trait]
pub trait Session: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<TaskListing>>;

    async fn list_workbooks(&self) -> Result<Vec<ContentListing>>;

    async fn list_datasources(&self) -> Result<Vec<ContentListing>>;

    async fn list_schedules(&self) -> Result<Vec<ScheduleListing>>;

    async fn delete_task(&self, task_id: &str) -> Result<ServerResponse>;

    async fn create_workbook_task(
        &self,
        workbook_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse>;

    async fn create_datasource_task(
        &self,
        datasource_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse>;

    async fn update_schedule_state(
        &self,
        schedule_id: &str,
        state: ScheduleState,
    ) -> Result<ServerResponse>;

    async fn run_metadata_query(&self, query: &str) -> Result<ServerResponse>;
}
