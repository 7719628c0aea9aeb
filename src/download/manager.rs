// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download manager: one pipeline per request, events folded into the registry.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use super::events::TaskEvent;
use super::orchestrator::Orchestrator;
use super::state::TaskRegistry;
use super::transport::AssetTransport;
use super::types::{DownloadRequest, DownloadTask, TaskReport};
use crate::locks::{resilient_read, resilient_write};

/// Runs download tasks in the background and answers status queries.
///
/// Must be created inside a tokio runtime: the event pump is spawned on
/// construction and lives as long as any running task holds the sink.
#[derive(Clone)]
pub struct DownloadManager {
    orchestrator: Orchestrator,
    registry: Arc<RwLock<TaskRegistry>>,
}

impl DownloadManager {
    /// Create a manager fetching through `transport`.
    pub fn new(transport: Arc<dyn AssetTransport>) -> Self {
        let registry = Arc::new(RwLock::new(TaskRegistry::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let pump_registry = registry.clone();
        tokio::spawn(async move {
            Self::event_pump(event_rx, pump_registry).await;
        });

        Self {
            orchestrator: Orchestrator::new(transport, Arc::new(event_tx)),
            registry,
        }
    }

    /// Start a download. Returns the new task id immediately.
    pub fn submit(&self, request: DownloadRequest) -> String {
        let mut task = DownloadTask::new(request.app_id);
        let task_id = task.id.clone();
        resilient_write(&self.registry).insert(&task, request.report_data());

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.run(&request, &mut task).await;
        });

        tracing::debug!("Submitted task {}", task_id);
        task_id
    }

    /// Request cancellation of a task. Returns false if it is unknown.
    pub fn cancel(&self, task_id: &str) -> bool {
        let found = resilient_read(&self.registry).cancel(task_id);
        if found {
            tracing::info!("Kill requested for task {}", task_id);
        }
        found
    }

    /// Cancel every running task. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        resilient_read(&self.registry).cancel_all()
    }

    /// Reports for `app_id`; terminal ones are returned once.
    pub fn reports(&self, app_id: u64) -> Vec<TaskReport> {
        resilient_write(&self.registry).drain_reports(app_id)
    }

    /// Current report of a single task, without consuming it.
    pub fn report(&self, task_id: &str) -> Option<TaskReport> {
        resilient_read(&self.registry).get(task_id).cloned()
    }

    /// Number of tasks still running.
    pub fn active_count(&self) -> usize {
        resilient_read(&self.registry).active_count()
    }

    async fn event_pump(
        mut event_rx: mpsc::UnboundedReceiver<TaskEvent>,
        registry: Arc<RwLock<TaskRegistry>>,
    ) {
        while let Some(event) = event_rx.recv().await {
            if event.is_terminal() {
                tracing::debug!("Task {} reached a terminal state", event.task_id());
            }
            resilient_write(&registry).apply(event);
        }
        tracing::debug!("Event pump stopped");
    }
}
