use serde::Serialize;
use tracing::debug;

use crate::{
    content::ContentKind,
    error::Result,
    session::{Session, TaskListing},
};

/// A refresh task bound to one workbook or datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshTask {
    pub task_id: String,
    pub schedule_id: String,
    pub schedule_name: String,
    pub content_kind: ContentKind,
    pub content_id: String,
}

/// Snapshot of the site's refresh tasks.
///
/// The first lookup fetches the listing; later lookups reuse it until
/// [`TaskInventory::refresh`] is called, so tasks deleted or created in the
/// meantime are not reflected.
#[derive(Debug, Default)]
pub struct TaskInventory {
    snapshot: Option<Vec<RefreshTask>>,
}

impl TaskInventory {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn refresh(&mut self) {
        self.snapshot = None;
    }

    pub async fn tasks_for<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
    ) -> Result<Vec<RefreshTask>> {
        if self.snapshot.is_none() {
            let listings = session.list_tasks().await?;
            let tasks: Vec<RefreshTask> = listings.into_iter().filter_map(flatten).collect();
            debug!("cached {} extract refresh tasks", tasks.len());
            self.snapshot = Some(tasks);
        }

        Ok(self
            .snapshot
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|task| task.content_kind == kind)
            .cloned()
            .collect())
    }

    pub async fn tasks_for_content<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
        content_id: &str,
    ) -> Result<Vec<RefreshTask>> {
        let mut tasks = self.tasks_for(session, kind).await?;
        tasks.retain(|task| task.content_id == content_id);
        Ok(tasks)
    }
}

fn flatten(listing: TaskListing) -> Option<RefreshTask> {
    let (content_kind, content) = match (listing.workbook, listing.datasource) {
        (Some(workbook), _) => (ContentKind::Workbook, workbook),
        (None, Some(datasource)) => (ContentKind::Datasource, datasource),
        (None, None) => return None,
    };

    Some(RefreshTask {
        task_id: listing.id,
        schedule_id: listing.schedule.id,
        schedule_name: listing.schedule.name,
        content_kind,
        content_id: content.id,
    })
}
