// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Errors raised by the download pipeline.
//!
//! Every variant is terminal for its task. Nothing here is retried.

use std::io;

use thiserror::Error;

/// Failure of a download task.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The service declined to hand out a download URL.
    #[error("user cannot download this file")]
    AuthorizationDenied,

    /// No variant could be selected for the requested resolution.
    #[error("no downloadable file for resolution {0}")]
    NoMatchingFile(String),

    #[error("no download directory configured")]
    NoDestination,

    /// Connection failure or interrupted body.
    #[error("request failed: {0}")]
    Network(String),

    /// The service answered with something other than 200.
    #[error("server returned non-OK status: {0}")]
    Status(u16),

    /// The metadata body was not the expected JSON.
    #[error("invalid metadata response: {0}")]
    Metadata(String),

    #[error("Content-Length header is missing")]
    MissingContentLength,

    #[error("invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),

    /// The download URL has no usable file name.
    #[error("cannot extract filename from URL: {0}")]
    InvalidUrl(String),

    /// Local filesystem failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The task's cancellation token fired.
    #[error("download cancelled")]
    Cancelled,

    /// Failure while streaming the file to disk.
    #[error("error downloading asset: {0}")]
    Transfer(Box<DownloadError>),

    /// An error whose partial-file cleanup also failed.
    #[error("{error}, failed to delete file: {cleanup}")]
    CleanupFailed {
        error: Box<DownloadError>,
        cleanup: io::Error,
    },
}

impl DownloadError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        DownloadError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if the task ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DownloadError::Cancelled => true,
            DownloadError::CleanupFailed { error, .. } => error.is_cancelled(),
            DownloadError::Transfer(error) => error.is_cancelled(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::Network(err.to_string())
    }
}
