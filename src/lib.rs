// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! assetd - Asset download daemon library
//!
//! Downloads asset files for a creative-tool add-on, places them in one or
//! two download directories and reports progress while doing so.
//!
//! **Resolution** -> **Paths** -> **Disk reconciliation** -> **Transfer**
//!
//! # Core Modules
//!
//! - [`download`] - Download pipeline, task registry and manager
//! - [`server`] - Local HTTP intake for the add-on
//! - [`config`] - Daemon configuration
//! - [`errors`] - HTTP error responses with reference codes
//! - [`error`] - Terminal error formatting
//! - [`locks`] - Poison-tolerant lock helpers
//! - [`utils`] - Slugs, filenames and secret masking

pub mod config;
pub mod download;
pub mod error;
pub mod errors;
pub mod locks;
pub mod server;
pub mod utils;

// Re-export the download pipeline
pub use download::{
    AssetData, AssetFile, AssetTransport, ClientIdentity, DownloadError, DownloadManager,
    DownloadRequest, DownloadTask, HttpTransport, Orchestrator, TaskEvent, TaskEventSink,
    TaskReport, TaskStatus,
};

pub use config::{load_config, Config};
pub use server::Server;
pub use utils::{mask_sensitive, slugify};

// Re-export error utilities
pub use error::{format_error, ErrorBuilder};
pub use errors::{generate_reference_code, ApiError, ApiResult, ErrorResponse};
