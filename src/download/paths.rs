// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Destination path planning.

use std::path::PathBuf;

use reqwest::Url;

use super::error::DownloadError;
use super::types::{AssetData, DownloadRequest};
use crate::utils::{server_to_local_filename, slugify};

/// Folder an asset is stored in inside each download directory.
pub fn asset_folder_name(asset: &AssetData) -> String {
    format!("{}_{}", slugify(&asset.name), asset.id)
}

/// Last path segment of a download URL, e.g. `resolution_2K_<uuid>.blend`.
pub fn extract_filename_from_url(url: &str) -> Result<String, DownloadError> {
    let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))
}

/// Plan one file path per download directory, primary first.
///
/// The asset folder is created in every directory, whether or not a
/// transfer ends up writing there. Creation failures are logged; the
/// subsequent file operation reports them as fatal.
pub async fn plan_download_paths(request: &DownloadRequest, server_filename: &str) -> Vec<PathBuf> {
    let filename = server_to_local_filename(server_filename, &request.asset_data.name);
    let folder = asset_folder_name(&request.asset_data);

    let mut paths = Vec::with_capacity(request.download_dirs.len());
    for dir in &request.download_dirs {
        let asset_dir = dir.join(&folder);
        if let Err(e) = tokio::fs::create_dir_all(&asset_dir).await {
            tracing::warn!("Failed to create {}: {}", asset_dir.display(), e);
        }
        paths.push(asset_dir.join(&filename));
    }

    paths
}
