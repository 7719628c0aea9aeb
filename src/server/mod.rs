// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Intake server
//!
//! Accepts download jobs from the add-on over local HTTP and answers its
//! status polls.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /download_asset` - Start a download, returns its task id
//! - `GET|POST /kill_download` - Cancel a running download
//! - `GET|POST /report` - Task reports for an add-on instance
//!
//! # Example
//!
//! ```no_run
//! use assetd::config::Config;
//! use assetd::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Server::from_config(&Config::default())?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;

use crate::config::Config;
use crate::download::{AssetTransport, DownloadManager, DownloadRequest, TaskReport};
use crate::errors::{ApiError, ApiResult};

/// Largest accepted request body.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Per-request timeout. Downloads run in the background, so requests are short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Most download directories a request may name.
const MAX_DOWNLOAD_DIRS: usize = 2;

/// Server state shared across handlers.
pub struct AppState {
    pub manager: DownloadManager,
}

/// Intake server configuration.
pub struct Server {
    port: u16,
    /// Address to bind to (defaults to 127.0.0.1)
    bind_address: String,
    manager: DownloadManager,
}

impl Server {
    /// Create a server fetching through `transport`. Needs a tokio runtime.
    pub fn new(port: u16, transport: Arc<dyn AssetTransport>) -> Self {
        Self {
            port,
            bind_address: "127.0.0.1".to_string(),
            manager: DownloadManager::new(transport),
        }
    }

    /// Create a server with the HTTP transport described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = config.transport()?;
        Ok(Self::new(config.port, Arc::new(transport)).with_bind_address(&config.bind_address))
    }

    /// Set the bind address.
    /// Use "0.0.0.0" to allow network access, "127.0.0.1" (default) for localhost only.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// Build the router with all routes.
    pub fn build_router(&self) -> Router {
        let state = Arc::new(AppState {
            manager: self.manager.clone(),
        });

        Router::new()
            .route("/health", get(health_handler))
            .route("/download_asset", post(download_asset_handler))
            .route("/kill_download", get(kill_download_handler).post(kill_download_handler))
            .route("/report", get(report_handler).post(report_handler))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .with_state(state)
    }

    /// Start the server with graceful shutdown.
    pub async fn start(&self) -> Result<()> {
        let router = self.build_router();
        let addr = format!("{}:{}", self.bind_address, self.port);

        tracing::info!("Starting server on {}", addr);

        if self.bind_address == "0.0.0.0" {
            tracing::warn!(
                "Server is binding to 0.0.0.0 which exposes the API to the network. \
                Use 127.0.0.1 (default) for local-only access."
            );
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. \
                    This usually means another assetd instance is running. \
                    Stop it or use a different port with: assetd serve --port <PORT>",
                    self.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(self.manager.clone()))
            .await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_tasks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskIdMessage {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRequest {
    pub app_id: u64,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_tasks: state.manager.active_count(),
    })
}

async fn download_asset_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<TaskIdMessage>> {
    let Json(request) = payload.map_err(rejection_to_error)?;
    validate_request(&request)?;

    let task_id = state.manager.submit(request);
    Ok(Json(TaskIdMessage { task_id }))
}

async fn kill_download_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskIdMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TaskIdMessage>)> {
    let Json(message) = payload.map_err(rejection_to_error)?;
    if !state.manager.cancel(&message.task_id) {
        return Err(ApiError::not_found("task"));
    }
    Ok((StatusCode::OK, Json(message)))
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<TaskReport>>> {
    let Json(request) = payload.map_err(rejection_to_error)?;
    Ok(Json(state.manager.reports(request.app_id)))
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(MAX_BODY_SIZE);
    }
    ApiError::invalid_request("Malformed request body", None, Some(&rejection.body_text()))
}

/// Reject requests that could never succeed before a task is started.
pub fn validate_request(request: &DownloadRequest) -> ApiResult<()> {
    let asset = &request.asset_data;
    if asset.id.trim().is_empty() {
        return Err(ApiError::invalid_request("Asset id is required", Some("asset_data.id"), None));
    }
    if asset.name.trim().is_empty() {
        return Err(ApiError::invalid_request(
            "Asset name is required",
            Some("asset_data.name"),
            None,
        ));
    }
    if asset.files.is_empty() {
        return Err(ApiError::invalid_request(
            "Asset has no files",
            Some("asset_data.files"),
            None,
        ));
    }
    if request.resolution.trim().is_empty() {
        return Err(ApiError::invalid_request("Resolution is required", Some("resolution"), None));
    }
    if request.download_dirs.is_empty() || request.download_dirs.len() > MAX_DOWNLOAD_DIRS {
        return Err(ApiError::invalid_request(
            "Between one and two download directories are required",
            Some("download_dirs"),
            Some(&format!("{} directories given", request.download_dirs.len())),
        ));
    }
    if let Some(dir) = request.download_dirs.iter().find(|d| !d.is_absolute()) {
        return Err(ApiError::invalid_request(
            "Download directories must be absolute paths",
            Some("download_dirs"),
            Some(&dir.display().to_string()),
        ));
    }
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for SIGINT/SIGTERM, then cancels every running download so partial
/// files are removed before the process exits.
async fn shutdown_signal(manager: DownloadManager) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    let cancelled = manager.cancel_all();
    if cancelled > 0 {
        tracing::info!("Cancelled {} running downloads", cancelled);
    }
    tracing::info!("Cleanup complete, shutting down server");
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{AssetData, AssetFile};
    use std::path::PathBuf;

    fn valid_request() -> DownloadRequest {
        DownloadRequest {
            app_id: 1,
            resolution: "resolution_2K".to_string(),
            download_dirs: vec![std::env::temp_dir()],
            asset_data: AssetData {
                id: "abc".to_string(),
                name: "Chair".to_string(),
                files: vec![AssetFile::new("blend", "https://api/blend")],
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_request(&valid_request()).is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut request = valid_request();
        request.download_dirs = vec![PathBuf::from("relative/dir")];
        assert!(matches!(
            validate_request(&request),
            Err(ApiError::InvalidRequest { field: Some(f), .. }) if f == "download_dirs"
        ));

        let mut request = valid_request();
        request.download_dirs = vec![std::env::temp_dir(); 3];
        assert!(validate_request(&request).is_err());

        let mut request = valid_request();
        request.download_dirs.clear();
        assert!(validate_request(&request).is_err());

        let mut request = valid_request();
        request.asset_data.files.clear();
        assert!(validate_request(&request).is_err());

        let mut request = valid_request();
        request.asset_data.name = "  ".to_string();
        assert!(validate_request(&request).is_err());

        let mut request = valid_request();
        request.resolution.clear();
        assert!(validate_request(&request).is_err());
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = Server::from_config(&Config {
            port: 3000,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(server.port(), 3000);
        assert_eq!(server.manager().active_count(), 0);
    }
}
