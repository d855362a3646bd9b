use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    content::{ContentDirectory, ContentKind, Target},
    error::{RefreshError, Result},
    inventory::TaskInventory,
    ledger::{Ledger, Partition, PausedTaskRecord},
    outcome::{TaskOutcome, rejected_records},
    session::{
        SCHEDULE_UPDATED_STATUS, ScheduleState, ServerResponse, Session, TASK_CREATED_STATUS,
        TASK_DELETED_STATUS,
    },
    upstream::UpstreamResolver,
};

/// Per-row outcomes of one pause or unpause.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    /// Tasks of the targeted workbook or datasource.
    pub content: Vec<TaskOutcome>,
    /// Tasks of datasources upstream of the targeted workbook.
    pub upstream: Vec<TaskOutcome>,
}

pub struct RefreshManager<S> {
    session: S,
    directory: ContentDirectory,
    inventory: TaskInventory,
    upstream: UpstreamResolver,
    ledger: Ledger,
}

impl<S: Session> RefreshManager<S> {
    pub fn new(session: S, ledger: Ledger) -> Self {
        Self {
            session,
            directory: ContentDirectory::new(),
            inventory: TaskInventory::new(),
            upstream: UpstreamResolver::new(),
            ledger,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Drops the cached content and task listings.
    ///
    /// Without a refresh every lookup sees the snapshot taken on first use.
    #[cfg(test)]
    pub fn refresh(&mut self) {
        self.directory.refresh();
        self.inventory.refresh();
    }

    pub async fn pause_workbook(
        &mut self,
        target: &Target,
        include_upstream: bool,
    ) -> Result<BatchReport> {
        let workbook_id = self
            .directory
            .resolve_target(&self.session, ContentKind::Workbook, target)
            .await?;
        let rows = self.own_tasks(ContentKind::Workbook, &workbook_id).await?;

        let upstream = if include_upstream {
            let upstream_rows = self.upstream_tasks(&workbook_id).await?;
            self.pause_rows(Partition::UpstreamDatasource, upstream_rows)
                .await?
        } else {
            Vec::new()
        };
        let content = self.pause_rows(Partition::Workbook, rows).await?;

        Ok(BatchReport { content, upstream })
    }

    pub async fn unpause_workbook(
        &mut self,
        target: &Target,
        include_upstream: bool,
    ) -> Result<BatchReport> {
        let workbook_id = self
            .directory
            .resolve_target(&self.session, ContentKind::Workbook, target)
            .await?;

        let rows = self.paused_rows(Partition::Workbook, |row| row.content_id == workbook_id)?;
        let content = self.create_rows(ContentKind::Workbook, rows).await;

        let upstream = if include_upstream {
            let rows = self.paused_rows(Partition::UpstreamDatasource, |row| {
                row.workbook_id.as_deref() == Some(workbook_id.as_str())
            })?;
            self.create_rows(ContentKind::Datasource, rows).await
        } else {
            Vec::new()
        };

        let content_settled = self.settle_unpause(Partition::Workbook, &workbook_id, &content);
        let upstream_settled =
            self.settle_unpause(Partition::UpstreamDatasource, &workbook_id, &upstream);
        content_settled?;
        upstream_settled?;

        Ok(BatchReport { content, upstream })
    }

    pub async fn pause_datasource(&mut self, target: &Target) -> Result<BatchReport> {
        let datasource_id = self
            .directory
            .resolve_target(&self.session, ContentKind::Datasource, target)
            .await?;
        let rows = self
            .own_tasks(ContentKind::Datasource, &datasource_id)
            .await?;
        let content = self.pause_rows(Partition::Datasource, rows).await?;

        Ok(BatchReport {
            content,
            upstream: Vec::new(),
        })
    }

    pub async fn unpause_datasource(&mut self, target: &Target) -> Result<BatchReport> {
        let datasource_id = self
            .directory
            .resolve_target(&self.session, ContentKind::Datasource, target)
            .await?;

        let rows = self.paused_rows(Partition::Datasource, |row| {
            row.content_id == datasource_id
        })?;
        let content = self.create_rows(ContentKind::Datasource, rows).await;
        self.settle_unpause(Partition::Datasource, &datasource_id, &content)?;

        Ok(BatchReport {
            content,
            upstream: Vec::new(),
        })
    }

    /// Suspends a whole extract schedule. Its tasks keep their ids.
    pub async fn pause_schedule(&mut self, target: &Target) -> Result<ServerResponse> {
        self.set_schedule_state(target, ScheduleState::Suspended)
            .await
    }

    pub async fn unpause_schedule(&mut self, target: &Target) -> Result<ServerResponse> {
        self.set_schedule_state(target, ScheduleState::Active).await
    }

    async fn set_schedule_state(
        &mut self,
        target: &Target,
        state: ScheduleState,
    ) -> Result<ServerResponse> {
        let schedule_id = self
            .directory
            .resolve_target(&self.session, ContentKind::Schedule, target)
            .await?;

        info!("setting schedule {} to {}", schedule_id, state);
        let response = self
            .session
            .update_schedule_state(&schedule_id, state)
            .await?;
        if response.status != SCHEDULE_UPDATED_STATUS {
            return Err(RefreshError::Remote {
                status: response.status,
                body: response.body,
            });
        }

        Ok(response)
    }

    /// Joins the content item with its live refresh tasks.
    async fn own_tasks(
        &mut self,
        kind: ContentKind,
        content_id: &str,
    ) -> Result<Vec<PausedTaskRecord>> {
        let item = self.directory.find(&self.session, kind, content_id).await?;
        let tasks = self
            .inventory
            .tasks_for_content(&self.session, kind, content_id)
            .await?;

        Ok(tasks
            .iter()
            .map(|task| PausedTaskRecord::from_task(task, &item))
            .collect())
    }

    async fn upstream_tasks(&mut self, workbook_id: &str) -> Result<Vec<PausedTaskRecord>> {
        let links = self
            .upstream
            .upstream_with_extracts(&self.session, workbook_id)
            .await?;

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for link in links {
            if !seen.insert(link.datasource_id.clone()) {
                continue;
            }

            match self
                .own_tasks(ContentKind::Datasource, &link.datasource_id)
                .await
            {
                Ok(tasks) => rows.extend(
                    tasks
                        .into_iter()
                        .map(|row| row.with_workbook(workbook_id)),
                ),
                Err(RefreshError::NotFound { .. }) => {
                    warn!(
                        "upstream datasource {} of workbook {} is not listed on the site, skipping",
                        link.datasource_id, workbook_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(rows)
    }

    /// Records the rows, then deletes their tasks one by one.
    ///
    /// Rows the server refused to delete are retracted from the ledger since
    /// their tasks are still live.
    async fn pause_rows(
        &self,
        partition: Partition,
        rows: Vec<PausedTaskRecord>,
    ) -> Result<Vec<TaskOutcome>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        self.ledger.append(partition, &rows)?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            info!(
                "deleting {} task {} ({} on schedule {})",
                partition, row.id, row.name, row.schedule_name
            );
            let call = self.session.delete_task(&row.id).await;
            let outcome = TaskOutcome::from_call(row, call, TASK_DELETED_STATUS);
            if !outcome.is_completed() {
                warn!(
                    "task {} was not deleted: {}",
                    outcome.record.id,
                    outcome.status_label()
                );
            }
            outcomes.push(outcome);
        }

        let still_live = rejected_records(&outcomes);
        if !still_live.is_empty() {
            self.ledger.retract(partition, &still_live)?;
        }

        Ok(outcomes)
    }

    fn paused_rows<F>(&self, partition: Partition, filter: F) -> Result<Vec<PausedTaskRecord>>
    where
        F: Fn(&PausedTaskRecord) -> bool,
    {
        let mut rows = self.ledger.read_or_empty(partition)?;
        rows.retain(|row| filter(row));
        Ok(rows)
    }

    /// Issues one create call per row; never stops early.
    async fn create_rows(&self, kind: ContentKind, rows: Vec<PausedTaskRecord>) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            info!(
                "recreating {} task for {} on schedule {}",
                kind, row.name, row.schedule_name
            );
            let call = match kind {
                ContentKind::Workbook => {
                    self.session
                        .create_workbook_task(&row.content_id, &row.schedule_id)
                        .await
                }
                _ => {
                    self.session
                        .create_datasource_task(&row.content_id, &row.schedule_id)
                        .await
                }
            };
            let outcome = TaskOutcome::from_call(row, call, TASK_CREATED_STATUS);
            if !outcome.is_completed() {
                warn!(
                    "task for {} on schedule {} was not recreated: {}",
                    outcome.record.content_id,
                    outcome.record.schedule_id,
                    outcome.status_label()
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Prunes a fully recreated batch from its partition; any other batch
    /// leaves the partition untouched.
    fn settle_unpause(
        &self,
        partition: Partition,
        content_id: &str,
        outcomes: &[TaskOutcome],
    ) -> Result<()> {
        if outcomes.is_empty() {
            return Ok(());
        }

        if outcomes.iter().all(TaskOutcome::is_completed) {
            let records: Vec<PausedTaskRecord> =
                outcomes.iter().map(|o| o.record.clone()).collect();
            self.ledger.remove(partition, &records)?;
            return Ok(());
        }

        Err(RefreshError::PartialUnpause {
            partition,
            content_id: content_id.to_string(),
            outcomes: outcomes.to_vec(),
        })
    }
}
