// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-task download pipeline.
//!
//! resolve URL -> plan paths -> reconcile -> transfer / sync / place -> report

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use super::error::DownloadError;
use super::events::{TaskEvent, TaskEventSink};
use super::paths::{extract_filename_from_url, plan_download_paths};
use super::reconcile::{purge, reconcile, sync_missing, Action};
use super::resolution::select_resolution_file;
use super::transfer::{transfer, ProgressTarget};
use super::transport::AssetTransport;
use super::types::{DownloadRequest, DownloadTask, ResolvedTransfer};
use crate::utils::mask_sensitive;

/// Message of the terminal success event.
pub const FINISHED_MESSAGE: &str = "Asset downloaded and ready";

/// Runs download tasks against injected collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn AssetTransport>,
    sink: Arc<dyn TaskEventSink>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn AssetTransport>, sink: Arc<dyn TaskEventSink>) -> Self {
        Self { transport, sink }
    }

    /// Run `request` to completion and emit exactly one terminal event.
    pub async fn run(&self, request: &DownloadRequest, task: &mut DownloadTask) {
        tracing::info!(
            task_id = %task.id,
            asset = %request.asset_data.name,
            resolution = %request.resolution,
            "Starting asset download"
        );

        match self.execute(request, task).await {
            Ok(paths) => {
                tracing::info!(task_id = %task.id, "Asset ready at {:?}", paths);
                task.set_message(FINISHED_MESSAGE);
                self.sink.emit(TaskEvent::success(&task.id, FINISHED_MESSAGE, paths));
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(task_id = %task.id, "Asset download cancelled");
                task.set_message(e.to_string());
                self.sink.emit(TaskEvent::failure(&task.id, &e));
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, "Asset download failed: {}", e);
                task.set_message(e.to_string());
                self.sink.emit(TaskEvent::failure(&task.id, &e));
            }
        }
    }

    async fn execute(
        &self,
        request: &DownloadRequest,
        task: &mut DownloadTask,
    ) -> Result<Vec<PathBuf>, DownloadError> {
        self.stage(task, "Getting download URL");
        let resolved = self.resolve_transfer(request).await?;
        tracing::debug!(
            task_id = %task.id,
            "Resolved {} to {}",
            request.resolution,
            resolved.resolution
        );

        self.stage(task, "Extracting filename");
        let filename = extract_filename_from_url(&resolved.download_url)?;

        self.stage(task, "Getting filepaths");
        let paths = plan_download_paths(request, &filename).await;
        let primary = paths
            .first()
            .cloned()
            .ok_or(DownloadError::NoDestination)?;

        self.stage(task, "Checking files on disk");
        let (action, snapshot) = reconcile(&paths).await;
        tracing::debug!(task_id = %task.id, "Reconciled {} paths: {:?}", paths.len(), action);

        match action {
            Action::Place => {}
            Action::Sync => {
                self.stage(task, "Syncing files");
                sync_missing(&paths, &snapshot).await?;
            }
            Action::PurgeThenDownload | Action::Download => {
                if action == Action::PurgeThenDownload {
                    purge(&paths).await;
                }
                self.stage(task, "Downloading");
                transfer(
                    self.transport.as_ref(),
                    &resolved.download_url,
                    &primary,
                    &task.cancel,
                    ProgressTarget::new(task.id.clone(), self.sink.clone()),
                )
                .await
                .map_err(|e| DownloadError::Transfer(Box::new(e)))?;
            }
        }

        if request.unpack_files {
            tracing::debug!(task_id = %task.id, "Unpacking is not supported, leaving file as is");
        }

        Ok(paths)
    }

    /// Pick the variant for the request and ask the service for its URL.
    ///
    /// An empty or missing `filePath` means the service refused the
    /// download; that is reported separately from transport failures.
    pub async fn resolve_transfer(
        &self,
        request: &DownloadRequest,
    ) -> Result<ResolvedTransfer, DownloadError> {
        let selection = select_resolution_file(&request.asset_data.files, &request.resolution);
        if selection.file.download_url.is_empty() {
            return Err(DownloadError::NoMatchingFile(request.resolution.clone()));
        }

        tracing::debug!(
            "Requesting {} with key {}",
            selection.file.file_type,
            mask_sensitive(&request.api_key, 4)
        );
        let response = self
            .transport
            .get_metadata(&selection.file.download_url, &request.scene_id, &request.api_key)
            .await?;
        if response.status != 200 {
            return Err(DownloadError::Status(response.status));
        }

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| DownloadError::Metadata(e.to_string()))?;
        let download_url = body
            .get("filePath")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or(DownloadError::AuthorizationDenied)?
            .to_string();

        Ok(ResolvedTransfer {
            file: selection.file,
            resolution: selection.resolution,
            download_url,
        })
    }

    fn stage(&self, task: &mut DownloadTask, message: &str) {
        task.set_message(message);
        self.sink.emit(TaskEvent::progress(&task.id, 0, message));
    }
}
