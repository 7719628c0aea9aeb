// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task events and the sink they are delivered to.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use super::error::DownloadError;

/// Payload of a successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    /// Every candidate path, primary first
    pub file_paths: Vec<PathBuf>,
}

/// Event emitted by a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Stage change or transfer progress. Percent never decreases per task.
    Progress {
        task_id: String,
        percent: u8,
        message: String,
    },
    /// Terminal failure
    Failure {
        task_id: String,
        error: String,
        cancelled: bool,
    },
    /// Terminal success
    Success {
        task_id: String,
        message: String,
        result: TaskResult,
    },
}

impl TaskEvent {
    pub fn progress(task_id: &str, percent: u8, message: impl Into<String>) -> Self {
        TaskEvent::Progress {
            task_id: task_id.to_string(),
            percent,
            message: message.into(),
        }
    }

    pub fn failure(task_id: &str, error: &DownloadError) -> Self {
        TaskEvent::Failure {
            task_id: task_id.to_string(),
            error: error.to_string(),
            cancelled: error.is_cancelled(),
        }
    }

    pub fn success(task_id: &str, message: impl Into<String>, file_paths: Vec<PathBuf>) -> Self {
        TaskEvent::Success {
            task_id: task_id.to_string(),
            message: message.into(),
            result: TaskResult { file_paths },
        }
    }

    /// Task this event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Progress { task_id, .. }
            | TaskEvent::Failure { task_id, .. }
            | TaskEvent::Success { task_id, .. } => task_id,
        }
    }

    /// Returns true for success and failure events.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Progress { .. })
    }
}

/// Receiver of task events.
///
/// Emission must not block: implementations hand the event off and return.
pub trait TaskEventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

impl TaskEventSink for mpsc::UnboundedSender<TaskEvent> {
    fn emit(&self, event: TaskEvent) {
        if let Err(e) = self.send(event) {
            tracing::debug!("Dropping event for {}: receiver closed", e.0.task_id());
        }
    }
}
