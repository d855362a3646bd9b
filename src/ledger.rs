//! Persisted record of paused refresh tasks.
//!
//! One CSV file per partition under the data directory, readable and editable
//! by hand. There is no locking: a single operator is expected to drive one
//! pause or unpause at a time.

use std::{
    collections::HashSet,
    fmt,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    content::ContentItem,
    error::{RefreshError, Result},
    inventory::RefreshTask,
};

pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Workbook,
    Datasource,
    UpstreamDatasource,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Workbook => "workbook",
            Partition::Datasource => "datasource",
            Partition::UpstreamDatasource => "upstream_datasource",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refresh task that was deleted by a pause and must be recreated later.
///
/// `id` is the task id at the time of the pause and is never reused: a
/// recreated task gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedTaskRecord {
    pub id: String,
    pub content_id: String,
    pub schedule_id: String,
    pub schedule_name: String,
    pub name: String,
    pub project: String,
    pub workbook_id: Option<String>,
}

impl PausedTaskRecord {
    pub const COLUMNS: [&'static str; 7] = [
        "id",
        "content_id",
        "schedule_id",
        "schedule_name",
        "name",
        "project",
        "workbook_id",
    ];

    pub fn from_task(task: &RefreshTask, item: &ContentItem) -> Self {
        Self {
            id: task.task_id.clone(),
            content_id: task.content_id.clone(),
            schedule_id: task.schedule_id.clone(),
            schedule_name: task.schedule_name.clone(),
            name: item.name.clone(),
            project: item.project_name().to_string(),
            workbook_id: None,
        }
    }

    pub fn with_workbook(mut self, workbook_id: impl Into<String>) -> Self {
        self.workbook_id = Some(workbook_id.into());
        self
    }

    /// The (content, schedule) binding this record stands for.
    pub fn binding(&self) -> (&str, &str) {
        (&self.content_id, &self.schedule_id)
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    data_dir: PathBuf,
}

impl Ledger {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self, partition: Partition) -> PathBuf {
        self.data_dir
            .join(format!("paused_{partition}_extract_refresh_tasks.csv"))
    }

    /// Appends rows, creating the partition file when needed.
    ///
    /// Rows are never deduplicated.
    pub fn append(&self, partition: Partition, rows: &[PausedTaskRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.data_dir)?;
        let path = self.path(partition);
        let needs_header = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(PausedTaskRecord::COLUMNS)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        debug!("appended {} rows to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn read(&self, partition: Partition) -> Result<Vec<PausedTaskRecord>> {
        let path = self.path(partition);
        if !path.exists() {
            return Err(RefreshError::LedgerMissing { partition });
        }

        read_rows(&path)
    }

    /// Like [`Ledger::read`], but an absent partition reads as empty.
    pub fn read_or_empty(&self, partition: Partition) -> Result<Vec<PausedTaskRecord>> {
        match self.read(partition) {
            Err(RefreshError::LedgerMissing { .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Rewrites the partition without every row whose binding appears in
    /// `matched`. Returns how many rows were dropped.
    pub fn remove(&self, partition: Partition, matched: &[PausedTaskRecord]) -> Result<usize> {
        let existing = self.read(partition)?;
        let bindings: HashSet<(&str, &str)> = matched.iter().map(|r| r.binding()).collect();

        let (dropped, kept): (Vec<_>, Vec<_>) = existing
            .into_iter()
            .partition(|row| bindings.contains(&row.binding()));

        let path = self.path(partition);
        write_rows(&path, &kept)?;

        debug!("removed {} rows from {}", dropped.len(), path.display());
        Ok(dropped.len())
    }

    /// Takes back rows appended by the current pause, matching whole rows
    /// (task id included) and dropping only the most recent copy of each.
    pub fn retract(&self, partition: Partition, appended: &[PausedTaskRecord]) -> Result<usize> {
        let mut rows = self.read(partition)?;
        let mut retracted = 0;
        for row in appended {
            if let Some(pos) = rows.iter().rposition(|existing| existing == row) {
                rows.remove(pos);
                retracted += 1;
            }
        }

        let path = self.path(partition);
        write_rows(&path, &rows)?;

        debug!("retracted {} rows from {}", retracted, path.display());
        Ok(retracted)
    }
}

fn read_rows(path: &Path) -> Result<Vec<PausedTaskRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[PausedTaskRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(PausedTaskRecord::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
