// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download types for asset placement.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Resolution key requesting the original, full-quality file.
pub const ORIGINAL_RESOLUTION: &str = "ORIGINAL";

/// File type tag of the original asset file.
pub const BLEND_FILE_TYPE: &str = "blend";

/// File type tag of preview images. Never downloaded by this pipeline.
pub const THUMBNAIL_FILE_TYPE: &str = "thumbnail";

/// Task type reported for asset downloads.
pub const ASSET_DOWNLOAD_TASK: &str = "asset_download";

/// One downloadable variant of an asset, as listed by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    /// Variant tag: "blend", "thumbnail", "resolution_2K", ...
    #[serde(rename = "fileType")]
    pub file_type: String,
    /// Remote URL of the variant's metadata endpoint
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

impl AssetFile {
    /// Create a variant entry.
    pub fn new(file_type: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            file_type: file_type.into(),
            download_url: download_url.into(),
        }
    }

    /// Returns true for the zero-value file returned when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.file_type.is_empty() && self.download_url.is_empty()
    }
}

/// Asset description carried by a download request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetData {
    /// Asset identifier
    pub id: String,
    /// Human-readable asset name
    pub name: String,
    /// Available variants, in service order
    #[serde(default)]
    pub files: Vec<AssetFile>,
}

/// An inbound download job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Identifier of the add-on instance that submitted the job
    #[serde(default)]
    pub app_id: u64,
    /// API key used for the metadata call only
    #[serde(default)]
    pub api_key: String,
    /// Scene the asset is downloaded for
    #[serde(default)]
    pub scene_id: String,
    /// Requested resolution tag, or "ORIGINAL"
    pub resolution: String,
    /// Unpack the downloaded file after transfer (accepted, not implemented)
    #[serde(default)]
    pub unpack_files: bool,
    /// Destination directories, primary first
    pub download_dirs: Vec<PathBuf>,
    /// The asset being downloaded
    pub asset_data: AssetData,
}

impl DownloadRequest {
    /// The request as echoed back in task reports. The API key is left out.
    pub fn report_data(&self) -> Value {
        let mut data = serde_json::to_value(self).unwrap_or_default();
        if let Some(fields) = data.as_object_mut() {
            fields.remove("api_key");
        }
        data
    }
}

/// The variant picked for a request and where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransfer {
    /// Selected variant
    pub file: AssetFile,
    /// Resolution tag the selection resolved to
    pub resolution: String,
    /// Pre-authorized download URL returned by the service
    pub download_url: String,
}

/// Lifecycle state of a task as seen by report consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, no stage has run yet
    Created,
    /// Running one of the pipeline stages
    InProgress,
    /// Files are in place
    Finished,
    /// Failed with error
    Error,
    /// Cancelled by a kill request
    Cancelled,
}

impl TaskStatus {
    /// Returns true if the task will not emit further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error | TaskStatus::Cancelled)
    }
}

/// A running download, owned by the pipeline for its lifetime.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Globally unique task identifier
    pub id: String,
    /// Owning add-on instance
    pub app_id: u64,
    /// Cooperative cancellation, checked at chunk boundaries
    pub cancel: CancellationToken,
    /// Current human-readable status
    pub message: String,
}

impl DownloadTask {
    /// Create a task with a fresh identifier.
    pub fn new(app_id: u64) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), app_id)
    }

    /// Create a task with a known identifier.
    pub fn with_id(id: impl Into<String>, app_id: u64) -> Self {
        Self {
            id: id.into(),
            app_id,
            cancel: CancellationToken::new(),
            message: String::new(),
        }
    }

    /// Update the status message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }
}

/// Snapshot of a task handed out to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub app_id: u64,
    pub task_type: String,
    pub status: TaskStatus,
    /// Percent complete (0-100)
    pub progress: u8,
    pub message: String,
    /// Terminal payload, e.g. `{"file_paths": [...]}`
    #[serde(default)]
    pub result: Value,
    /// The request that started the task, so pollers can tell tasks apart
    #[serde(default)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskReport {
    /// Create the initial report for a task started by `data`.
    pub fn new(task: &DownloadTask, data: Value) -> Self {
        let now = Utc::now();
        Self {
            task_id: task.id.clone(),
            app_id: task.app_id,
            task_type: ASSET_DOWNLOAD_TASK.to_string(),
            status: TaskStatus::Created,
            progress: 0,
            message: task.message.clone(),
            result: Value::Null,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the status and timestamp.
    pub fn update_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = r#"{
            "app_id": 4242,
            "api_key": "key",
            "scene_id": "scene",
            "resolution": "resolution_2K",
            "download_dirs": ["/tmp/a"],
            "asset_data": {
                "id": "0992088b",
                "name": "Kitten",
                "files": [{"fileType": "blend", "downloadUrl": "https://example.com/blend"}]
            }
        }"#;
        let request: DownloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.app_id, 4242);
        assert!(!request.unpack_files);
        assert_eq!(request.asset_data.files[0].file_type, "blend");
        assert_eq!(request.download_dirs, vec![PathBuf::from("/tmp/a")]);

        let data = request.report_data();
        assert_eq!(data["asset_data"]["id"], "0992088b");
        assert_eq!(data["resolution"], "resolution_2K");
        assert!(data.get("api_key").is_none());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = DownloadTask::new(1);
        let b = DownloadTask::new(1);
        assert_ne!(a.id, b.id);
        assert!(!a.cancel.is_cancelled());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Created.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Finished.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
