// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory task registry.
//!
//! Folds task events into per-task reports and keeps the cancellation
//! token of every task that can still be killed. Terminal reports are
//! handed out once and then forgotten.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::events::TaskEvent;
use super::types::{DownloadTask, TaskReport, TaskStatus};

#[derive(Debug)]
struct TaskEntry {
    report: TaskReport,
    cancel: CancellationToken,
}

/// Reports and cancellation handles for every known task.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskEntry>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created task along with the request data it reports.
    pub fn insert(&mut self, task: &DownloadTask, data: Value) {
        self.tasks.insert(
            task.id.clone(),
            TaskEntry {
                report: TaskReport::new(task, data),
                cancel: task.cancel.clone(),
            },
        );
    }

    /// Get the current report of a task.
    pub fn get(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.get(task_id).map(|entry| &entry.report)
    }

    /// Fold an event into its task's report.
    ///
    /// Events for unknown tasks and events arriving after a terminal one
    /// are ignored.
    pub fn apply(&mut self, event: TaskEvent) {
        let Some(entry) = self.tasks.get_mut(event.task_id()) else {
            tracing::debug!("Event for unknown task {}", event.task_id());
            return;
        };
        let report = &mut entry.report;
        if report.status.is_terminal() {
            tracing::warn!("Event after terminal state for task {}", report.task_id);
            return;
        }

        match event {
            TaskEvent::Progress { percent, message, .. } => {
                report.progress = percent;
                report.message = message;
                report.update_status(TaskStatus::InProgress);
            }
            TaskEvent::Failure {
                error, cancelled, ..
            } => {
                report.message = error;
                report.update_status(if cancelled {
                    TaskStatus::Cancelled
                } else {
                    TaskStatus::Error
                });
            }
            TaskEvent::Success {
                message, result, ..
            } => {
                report.progress = 100;
                report.message = message;
                report.result = serde_json::to_value(&result).unwrap_or_default();
                report.update_status(TaskStatus::Finished);
            }
        }
    }

    /// Fire the cancellation token of a task.
    ///
    /// Returns false if the task is unknown. Killing a task that already
    /// finished is a no-op that still returns true.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.get(task_id) {
            Some(entry) => {
                if !entry.report.status.is_terminal() {
                    entry.cancel.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Fire every token of a task that is still running. Returns how many.
    pub fn cancel_all(&self) -> usize {
        self.tasks
            .values()
            .filter(|entry| !entry.report.status.is_terminal())
            .inspect(|entry| entry.cancel.cancel())
            .count()
    }

    /// Reports for `app_id`, oldest first. Terminal tasks are removed.
    pub fn drain_reports(&mut self, app_id: u64) -> Vec<TaskReport> {
        let mut reports: Vec<TaskReport> = self
            .tasks
            .values()
            .filter(|entry| entry.report.app_id == app_id)
            .map(|entry| entry.report.clone())
            .collect();
        reports.sort_by_key(|r| r.created_at);

        self.tasks
            .retain(|_, entry| entry.report.app_id != app_id || !entry.report.status.is_terminal());
        reports
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|entry| !entry.report.status.is_terminal())
            .count()
    }
}
