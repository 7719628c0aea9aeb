// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Asset download pipeline for assetd
//!
//! This module turns a download request into files on disk:
//! - Resolution negotiation against the variants an asset offers
//! - Path planning across one or two download directories
//! - Reconciliation with whatever is already on disk
//! - Cancellable, progress-reporting streamed transfer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DownloadManager │────▶│ Orchestrator    │
//! │                 │     │ (tokio task)    │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │ TaskEvent
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ TaskRegistry    │◀────│ event pump      │
//! │ (in memory)     │     │ (mpsc)          │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use assetd::download::{ClientIdentity, DownloadManager, DownloadRequest, HttpTransport};
//!
//! # async fn example(request: DownloadRequest) -> anyhow::Result<()> {
//! let transport = HttpTransport::new(
//!     ClientIdentity::default(),
//!     Duration::from_secs(10),
//!     Duration::from_secs(30),
//! )?;
//! let manager = DownloadManager::new(Arc::new(transport));
//!
//! let task_id = manager.submit(request);
//! println!("Status: {:?}", manager.report(&task_id).map(|r| r.status));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod manager;
pub mod orchestrator;
pub mod paths;
pub mod reconcile;
pub mod resolution;
pub mod state;
pub mod transfer;
pub mod transport;
pub mod types;

// Re-export commonly used items
pub use error::DownloadError;
pub use events::{TaskEvent, TaskEventSink, TaskResult};
pub use manager::DownloadManager;
pub use orchestrator::{Orchestrator, FINISHED_MESSAGE};
pub use reconcile::Action;
pub use resolution::{select_resolution_file, Selection};
pub use state::TaskRegistry;
pub use transfer::{transfer, ProgressTarget};
pub use transport::{AssetTransport, ClientIdentity, HttpTransport};
pub use types::{AssetData, AssetFile, DownloadRequest, DownloadTask, TaskReport, TaskStatus};
