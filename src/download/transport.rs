// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP transport for the content service.
//!
//! The pipeline only talks to the network through [`AssetTransport`], so
//! tests can substitute canned responses and the daemon can share one
//! pooled client across tasks.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;

use super::error::DownloadError;
use crate::utils::mask_sensitive;

/// Body of a download response.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Response of the metadata (download URL) call.
#[derive(Debug, Clone)]
pub struct MetadataResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Response of the file download call. The body has not been read yet.
pub struct DownloadResponse {
    pub status: u16,
    /// Raw `Content-Length` header, if the server sent one
    pub content_length: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Remote calls made by the pipeline.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    /// GET a variant's metadata URL with `scene_uuid` and API-key headers.
    async fn get_metadata(
        &self,
        url: &str,
        scene_id: &str,
        api_key: &str,
    ) -> Result<MetadataResponse, DownloadError>;

    /// GET a pre-authorized download URL. No API key is sent.
    async fn get_download(&self, url: &str) -> Result<DownloadResponse, DownloadError>;
}

/// Who is calling: sent with every request.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub system_id: String,
    pub addon_version: String,
    pub platform_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            system_id: String::new(),
            addon_version: env!("CARGO_PKG_VERSION").to_string(),
            platform_version: std::env::consts::OS.to_string(),
        }
    }
}

/// Build request headers. The `Authorization` header is only set for a
/// non-empty API key.
pub fn build_headers(api_key: &str, identity: &ClientIdentity) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let pairs = [
        ("system-id", identity.system_id.as_str()),
        ("addon-version", identity.addon_version.as_str()),
        ("platform-version", identity.platform_version.as_str()),
    ];
    for (name, value) in pairs {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => tracing::warn!("Skipping header {} with invalid value", name),
        }
    }

    if !api_key.is_empty() {
        match HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            Ok(mut v) => {
                v.set_sensitive(true);
                headers.insert(AUTHORIZATION, v);
            }
            Err(_) => tracing::warn!(
                "API key {} contains invalid header characters",
                mask_sensitive(api_key, 4)
            ),
        }
    }

    headers
}

/// [`AssetTransport`] backed by reqwest.
///
/// Metadata calls use a client with a total timeout; downloads only bound the
/// connect phase since files can take arbitrarily long.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    api_client: Client,
    download_client: Client,
    identity: ClientIdentity,
    server: Option<String>,
}

impl HttpTransport {
    pub fn new(
        identity: ClientIdentity,
        connect_timeout: Duration,
        metadata_timeout: Duration,
    ) -> reqwest::Result<Self> {
        let api_client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(metadata_timeout)
            .build()?;
        let download_client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            api_client,
            download_client,
            identity,
            server: None,
        })
    }

    /// Resolve URLs starting with `/` against `server`.
    pub fn with_server(mut self, server: &str) -> Self {
        let server = server.trim_end_matches('/');
        self.server = (!server.is_empty()).then(|| server.to_string());
        self
    }

    fn absolute_url(&self, url: &str) -> String {
        match &self.server {
            Some(server) if url.starts_with('/') => format!("{}{}", server, url),
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl AssetTransport for HttpTransport {
    async fn get_metadata(
        &self,
        url: &str,
        scene_id: &str,
        api_key: &str,
    ) -> Result<MetadataResponse, DownloadError> {
        let url = self.absolute_url(url);
        tracing::debug!("Requesting download URL from {}", url);
        let response = self
            .api_client
            .get(&url)
            .headers(build_headers(api_key, &self.identity))
            .query(&[("scene_uuid", scene_id)])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(MetadataResponse { status, body })
    }

    async fn get_download(&self, url: &str) -> Result<DownloadResponse, DownloadError> {
        let response = self
            .download_client
            .get(self.absolute_url(url))
            .headers(build_headers("", &self.identity))
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let body = response.bytes_stream().map_err(io::Error::other).boxed();

        Ok(DownloadResponse {
            status,
            content_length,
            body,
        })
    }
}
