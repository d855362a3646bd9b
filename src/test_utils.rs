use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    content::ContentKind,
    error::{RefreshError, Result},
    session::{
        ContentListing, IdRef, ProjectRef, ScheduleListing, ScheduleRef, ScheduleState,
        ServerResponse, Session, TASK_CREATED_STATUS, TASK_DELETED_STATUS, TaskListing,
    },
};

#[derive(Default)]
struct State {
    workbooks: Vec<ContentListing>,
    datasources: Vec<ContentListing>,
    schedules: Vec<ScheduleListing>,
    tasks: Vec<TaskListing>,
    metadata: Option<ServerResponse>,
    delete_overrides: HashMap<String, u16>,
    create_overrides: HashMap<(String, String), u16>,
    unreachable_deletes: HashSet<String>,
    unreachable_creates: HashSet<(String, String)>,
    listing_calls: usize,
    task_listing_calls: usize,
    deleted: Vec<String>,
    created: Vec<(ContentKind, String, String)>,
    schedule_updates: Vec<(String, ScheduleState)>,
    next_task: usize,
}

/// In-memory server: deleting a task removes it, creating one adds a task
/// with a fresh id. Single calls can be scripted to answer with another status
/// or to fail before reaching the server.
#[derive(Default)]
pub struct FakeSession {
    state: Mutex<State>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake session state")
    }

    pub fn add_workbook(&self, id: &str, name: &str, project: &str) {
        self.state().workbooks.push(content(id, name, project));
    }

    pub fn add_datasource(&self, id: &str, name: &str, project: &str) {
        self.state().datasources.push(content(id, name, project));
    }

    pub fn add_schedule(&self, id: &str, name: &str, schedule_type: &str) {
        self.state().schedules.push(ScheduleListing {
            id: id.to_string(),
            name: name.to_string(),
            schedule_type: schedule_type.to_string(),
        });
    }

    pub fn add_workbook_task(
        &self,
        task_id: &str,
        workbook_id: &str,
        schedule_id: &str,
        schedule_name: &str,
    ) {
        let mut task = task(task_id, schedule_id, schedule_name);
        task.workbook = Some(id_ref(workbook_id));
        self.state().tasks.push(task);
    }

    pub fn add_datasource_task(
        &self,
        task_id: &str,
        datasource_id: &str,
        schedule_id: &str,
        schedule_name: &str,
    ) {
        let mut task = task(task_id, schedule_id, schedule_name);
        task.datasource = Some(id_ref(datasource_id));
        self.state().tasks.push(task);
    }

    /// A task bound to neither a workbook nor a datasource.
    pub fn add_orphan_task(&self, task_id: &str, schedule_id: &str) {
        self.state().tasks.push(task(task_id, schedule_id, ""));
    }

    pub fn set_metadata_response(&self, response: ServerResponse) {
        self.state().metadata = Some(response);
    }

    /// Scripts the metadata service with `(workbook_id, datasource_id, has_extracts)` links.
    pub fn set_upstream(&self, links: &[(&str, &str, bool)]) {
        let mut workbooks: Vec<(String, Vec<serde_json::Value>)> = Vec::new();
        for (workbook_id, datasource_id, has_extracts) in links {
            let entry = json!({
                "datasource_name": datasource_id,
                "datasource_id": datasource_id,
                "has_extracts": has_extracts,
            });
            match workbooks.iter_mut().find(|(id, _)| id == workbook_id) {
                Some((_, datasources)) => datasources.push(entry),
                None => workbooks.push((workbook_id.to_string(), vec![entry])),
            }
        }

        let body = json!({
            "data": {
                "workbooks": workbooks
                    .into_iter()
                    .map(|(id, datasources)| json!({
                        "workbook_name": id,
                        "workbook_id": id,
                        "upstreamDatasources": datasources,
                    }))
                    .collect::<Vec<_>>()
            }
        });
        self.set_metadata_response(ServerResponse::new(200, body.to_string()));
    }

    pub fn fail_delete(&self, task_id: &str, status: u16) {
        self.state()
            .delete_overrides
            .insert(task_id.to_string(), status);
    }

    pub fn fail_create(&self, content_id: &str, schedule_id: &str, status: u16) {
        self.state()
            .create_overrides
            .insert((content_id.to_string(), schedule_id.to_string()), status);
    }

    /// The delete call errors out without a response; the task stays live.
    pub fn drop_delete(&self, task_id: &str) {
        self.state()
            .unreachable_deletes
            .insert(task_id.to_string());
    }

    pub fn drop_create(&self, content_id: &str, schedule_id: &str) {
        self.state()
            .unreachable_creates
            .insert((content_id.to_string(), schedule_id.to_string()));
    }

    pub fn listing_calls(&self) -> usize {
        self.state().listing_calls
    }

    pub fn task_listing_calls(&self) -> usize {
        self.state().task_listing_calls
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn created(&self) -> Vec<(ContentKind, String, String)> {
        self.state().created.clone()
    }

    pub fn schedule_updates(&self) -> Vec<(String, ScheduleState)> {
        self.state().schedule_updates.clone()
    }

    /// Sorted `(content_id, schedule_id)` pairs of every live task.
    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut bindings: Vec<(String, String)> = self
            .state()
            .tasks
            .iter()
            .filter_map(|task| {
                let content = task.workbook.as_ref().or(task.datasource.as_ref())?;
                Some((content.id.clone(), task.schedule.id.clone()))
            })
            .collect();
        bindings.sort();
        bindings
    }

    fn create(
        &self,
        kind: ContentKind,
        content_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse> {
        let mut state = self.state();
        state
            .created
            .push((kind, content_id.to_string(), schedule_id.to_string()));

        let key = (content_id.to_string(), schedule_id.to_string());
        if state.unreachable_creates.contains(&key) {
            return Err(connection_reset());
        }
        if let Some(&status) = state.create_overrides.get(&key) {
            return Ok(ServerResponse::new(status, "scripted failure"));
        }

        state.next_task += 1;
        let task_id = format!("new-{}", state.next_task);
        let mut task = task(&task_id, schedule_id, "");
        match kind {
            ContentKind::Workbook => task.workbook = Some(id_ref(content_id)),
            _ => task.datasource = Some(id_ref(content_id)),
        }
        state.tasks.push(task);
        Ok(ServerResponse::new(
            TASK_CREATED_STATUS,
            json!({"task": {"id": task_id}}).to_string(),
        ))
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn list_tasks(&self) -> Result<Vec<TaskListing>> {
        let mut state = self.state();
        state.task_listing_calls += 1;
        Ok(state.tasks.clone())
    }

    async fn list_workbooks(&self) -> Result<Vec<ContentListing>> {
        let mut state = self.state();
        state.listing_calls += 1;
        Ok(state.workbooks.clone())
    }

    async fn list_datasources(&self) -> Result<Vec<ContentListing>> {
        let mut state = self.state();
        state.listing_calls += 1;
        Ok(state.datasources.clone())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleListing>> {
        let mut state = self.state();
        state.listing_calls += 1;
        Ok(state.schedules.clone())
    }

    async fn delete_task(&self, task_id: &str) -> Result<ServerResponse> {
        let mut state = self.state();
        state.deleted.push(task_id.to_string());

        if state.unreachable_deletes.contains(task_id) {
            return Err(connection_reset());
        }
        if let Some(&status) = state.delete_overrides.get(task_id) {
            return Ok(ServerResponse::new(status, "scripted failure"));
        }

        let before = state.tasks.len();
        state.tasks.retain(|task| task.id != task_id);
        if state.tasks.len() == before {
            return Ok(ServerResponse::new(404, "task not found"));
        }
        Ok(ServerResponse::new(TASK_DELETED_STATUS, ""))
    }

    async fn create_workbook_task(
        &self,
        workbook_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse> {
        self.create(ContentKind::Workbook, workbook_id, schedule_id)
    }

    async fn create_datasource_task(
        &self,
        datasource_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse> {
        self.create(ContentKind::Datasource, datasource_id, schedule_id)
    }

    async fn update_schedule_state(
        &self,
        schedule_id: &str,
        state: ScheduleState,
    ) -> Result<ServerResponse> {
        let mut guard = self.state();
        guard
            .schedule_updates
            .push((schedule_id.to_string(), state));
        if guard.schedules.iter().any(|s| s.id == schedule_id) {
            Ok(ServerResponse::new(200, ""))
        } else {
            Ok(ServerResponse::new(404, "schedule not found"))
        }
    }

    async fn run_metadata_query(&self, _query: &str) -> Result<ServerResponse> {
        Ok(self.state().metadata.clone().unwrap_or_else(|| {
            ServerResponse::new(200, json!({"data": {"workbooks": []}}).to_string())
        }))
    }
}

fn connection_reset() -> RefreshError {
    RefreshError::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

fn content(id: &str, name: &str, project: &str) -> ContentListing {
    ContentListing {
        id: id.to_string(),
        name: name.to_string(),
        project: Some(ProjectRef {
            name: project.to_string(),
        }),
    }
}

fn task(task_id: &str, schedule_id: &str, schedule_name: &str) -> TaskListing {
    TaskListing {
        id: task_id.to_string(),
        schedule: ScheduleRef {
            id: schedule_id.to_string(),
            name: schedule_name.to_string(),
        },
        workbook: None,
        datasource: None,
    }
}

fn id_ref(id: &str) -> IdRef {
    IdRef { id: id.to_string() }
}
