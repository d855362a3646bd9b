use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    manager::BatchReport,
    outcome::TaskOutcome,
    session::ServerResponse,
};

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One line per task with its schedule and result.
    #[default]
    Table,
    /// The full per-task outcomes as JSON.
    Json,
}

#[derive(Serialize)]
struct ScheduleReport<'a> {
    schedule: &'a str,
    status: u16,
    body: &'a str,
}

pub fn render_batch(report: &BatchReport, mode: OutputMode) -> Result<String> {
    match mode {
        OutputMode::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputMode::Table => {
            let mut lines = Vec::new();
            render_section(&mut lines, "content", &report.content);
            render_section(&mut lines, "upstream", &report.upstream);
            if lines.is_empty() {
                lines.push("No refresh tasks affected.".to_string());
            }
            Ok(lines.join("\n"))
        }
    }
}

fn render_section(lines: &mut Vec<String>, label: &str, outcomes: &[TaskOutcome]) {
    if outcomes.is_empty() {
        return;
    }

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    lines.push(format!(
        "{}: {}/{} tasks completed",
        label,
        completed,
        outcomes.len()
    ));
    for outcome in outcomes {
        let record = &outcome.record;
        lines.push(format!(
            "  {} / {} on '{}' (task {}): {}",
            record.project,
            record.name,
            record.schedule_name,
            record.id,
            outcome.status_label()
        ));
    }
}

pub fn render_schedule(schedule: &str, response: &ServerResponse, mode: OutputMode) -> Result<String> {
    match mode {
        OutputMode::Json => Ok(serde_json::to_string_pretty(&ScheduleReport {
            schedule,
            status: response.status,
            body: &response.body,
        })?),
        OutputMode::Table => Ok(format!(
            "Schedule '{}': server answered {}",
            schedule, response.status
        )),
    }
}
