// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streamed file transfer with progress and cancellation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  bytes written  ┌─────────────────┐
//! │ I/O loop        │────────────────▶│ Progress        │
//! │ (read 32 KiB,   │   (mpsc, SPSC)  │ formatter task  │
//! │  write, count)  │                 │                 │
//! └────────┬────────┘                 └────────┬────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌─────────────────┐                 ┌─────────────────┐
//! │ destination     │                 │ TaskEventSink   │
//! │ file            │                 │ (Progress)      │
//! └─────────────────┘                 └─────────────────┘
//! ```
//!
//! The I/O loop never formats strings. It pushes the running byte count and
//! moves on; dropping the sender ends the formatter, which the loop then
//! awaits so that every progress event lands before the terminal event.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::error::DownloadError;
use super::events::{TaskEvent, TaskEventSink};
use super::transport::{AssetTransport, ByteStream};

/// Size of a single read from the response body.
pub const CHUNK_SIZE: usize = 32 * 1024;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Integer percent of `total` written, rounded down.
pub fn progress_percent(written: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (written as u128 * 100) / total as u128;
    percent.min(100) as u8
}

/// Progress message shown to the user.
///
/// Files under 1 MiB are shown in whole kilobytes, larger files in megabytes
/// with one decimal.
pub fn progress_message(total: u64, percent: u8) -> String {
    if total < MIB {
        format!("Downloading {}kB ({}%)", total / KIB, percent)
    } else {
        format!("Downloading {:.1}MB ({}%)", total as f64 / MIB as f64, percent)
    }
}

/// Parse the raw `Content-Length` header.
fn parse_content_length(raw: Option<&str>) -> Result<u64, DownloadError> {
    let raw = raw.ok_or(DownloadError::MissingContentLength)?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| DownloadError::InvalidContentLength(raw.to_string()))
}

/// Where progress for a transfer is reported.
#[derive(Clone)]
pub struct ProgressTarget {
    pub task_id: String,
    pub sink: Arc<dyn TaskEventSink>,
}

impl ProgressTarget {
    pub fn new(task_id: impl Into<String>, sink: Arc<dyn TaskEventSink>) -> Self {
        Self {
            task_id: task_id.into(),
            sink,
        }
    }
}

/// Download `url` into `destination`.
///
/// On any failure after the file was created, including cancellation, the
/// partial file is deleted before the error is returned.
pub async fn transfer(
    transport: &dyn AssetTransport,
    url: &str,
    destination: &Path,
    cancel: &CancellationToken,
    progress: ProgressTarget,
) -> Result<(), DownloadError> {
    let file = File::create(destination).await.map_err(|e| {
        DownloadError::io(format!("failed to create {}", destination.display()), e)
    })?;

    match stream_to_file(transport, url, file, cancel, progress).await {
        Ok(written) => {
            tracing::debug!("Wrote {} bytes to {}", written, destination.display());
            Ok(())
        }
        Err(err) => Err(remove_partial(destination, err).await),
    }
}

/// Delete a partially written file, folding a deletion failure into `err`.
async fn remove_partial(path: &Path, err: DownloadError) -> DownloadError {
    match tokio::fs::remove_file(path).await {
        Ok(()) => err,
        Err(e) if e.kind() == ErrorKind::NotFound => err,
        Err(cleanup) => DownloadError::CleanupFailed {
            error: Box::new(err),
            cleanup,
        },
    }
}

async fn stream_to_file(
    transport: &dyn AssetTransport,
    url: &str,
    mut file: File,
    cancel: &CancellationToken,
    progress: ProgressTarget,
) -> Result<u64, DownloadError> {
    let response = transport.get_download(url).await?;
    if response.status != 200 {
        return Err(DownloadError::Status(response.status));
    }
    let total = parse_content_length(response.content_length.as_deref())?;

    let (tx, rx) = mpsc::unbounded_channel();
    let formatter = spawn_progress_formatter(rx, total, progress);

    let result = copy_chunks(response.body, &mut file, &tx, cancel).await;

    // Closing the channel lets the formatter drain and exit.
    drop(tx);
    if let Err(e) = formatter.await {
        tracing::warn!("Progress formatter stopped abnormally: {}", e);
    }

    result
}

async fn copy_chunks(
    body: ByteStream,
    file: &mut File,
    written_tx: &mpsc::UnboundedSender<u64>,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut reader = StreamReader::new(body);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        // A stalled body must not delay cancellation.
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            read = reader.read(&mut buffer) => read.map_err(|e| {
                DownloadError::Network(format!("failed to read response body: {}", e))
            })?,
        };
        if n == 0 {
            break;
        }

        file.write_all(&buffer[..n])
            .await
            .map_err(|e| DownloadError::io("failed to write file", e))?;
        written += n as u64;

        // The formatter only goes away if it panicked; keep writing regardless.
        let _ = written_tx.send(written);
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::io("failed to flush file", e))?;
    Ok(written)
}

fn spawn_progress_formatter(
    mut written_rx: mpsc::UnboundedReceiver<u64>,
    total: u64,
    progress: ProgressTarget,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(written) = written_rx.recv().await {
            let percent = progress_percent(written, total);
            let message = progress_message(total, percent);
            progress
                .sink
                .emit(TaskEvent::progress(&progress.task_id, percent, message));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::transport::{DownloadResponse, MetadataResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream::{self, StreamExt};
    use tempfile::TempDir;

    /// Serves one canned response per call.
    struct CannedTransport {
        status: u16,
        content_length: Option<String>,
        chunks: Vec<std::io::Result<Bytes>>,
    }

    impl CannedTransport {
        fn ok(body: Vec<u8>) -> Self {
            Self {
                status: 200,
                content_length: Some(body.len().to_string()),
                chunks: body
                    .chunks(CHUNK_SIZE)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl AssetTransport for std::sync::Mutex<Option<CannedTransport>> {
        async fn get_metadata(
            &self,
            _url: &str,
            _scene_id: &str,
            _api_key: &str,
        ) -> Result<MetadataResponse, DownloadError> {
            unreachable!("transfer never asks for metadata")
        }

        async fn get_download(&self, _url: &str) -> Result<DownloadResponse, DownloadError> {
            let canned = self.lock().unwrap().take().expect("single request");
            Ok(DownloadResponse {
                status: canned.status,
                content_length: canned.content_length,
                body: stream::iter(canned.chunks).boxed(),
            })
        }
    }

    fn canned(t: CannedTransport) -> std::sync::Mutex<Option<CannedTransport>> {
        std::sync::Mutex::new(Some(t))
    }

    fn target() -> (ProgressTarget, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressTarget::new("task-1", Arc::new(tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<(u8, String)> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::Progress { percent, message, .. } = event {
                out.push((percent, message));
            }
        }
        out
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 200), 0);
        assert_eq!(progress_percent(199, 200), 99);
        assert_eq!(progress_percent(200, 200), 100);
        assert_eq!(progress_percent(5, 0), 100);
        assert_eq!(progress_percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_progress_message_units() {
        assert_eq!(progress_message(512 * 1024, 50), "Downloading 512kB (50%)");
        assert_eq!(progress_message(MIB - 1, 7), "Downloading 1023kB (7%)");
        assert_eq!(progress_message(MIB, 100), "Downloading 1.0MB (100%)");
        assert_eq!(progress_message(15 * MIB / 2, 3), "Downloading 7.5MB (3%)");
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length(Some("1048576")).unwrap(), 1_048_576);
        assert!(matches!(
            parse_content_length(None),
            Err(DownloadError::MissingContentLength)
        ));
        assert!(matches!(
            parse_content_length(Some("lots")),
            Err(DownloadError::InvalidContentLength(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_writes_file_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("asset.blend");
        let body: Vec<u8> = (0..(MIB as usize)).map(|i| (i % 251) as u8).collect();
        let transport = canned(CannedTransport::ok(body.clone()));
        let (progress, mut rx) = target();

        transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 32);
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(events.iter().all(|(_, m)| m.ends_with("%)") && m.contains("1.0MB")));
        assert_eq!(events.last().unwrap(), &(100, "Downloading 1.0MB (100%)".to_string()));
    }

    #[tokio::test]
    async fn test_small_file_reports_kilobytes() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("small.blend");
        let transport = canned(CannedTransport::ok(vec![7u8; 40 * 1024]));
        let (progress, mut rx) = target();

        transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.first().unwrap(), &(80, "Downloading 40kB (80%)".to_string()));
        assert_eq!(events.last().unwrap(), &(100, "Downloading 40kB (100%)".to_string()));
    }

    #[tokio::test]
    async fn test_missing_content_length_removes_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("asset.blend");
        let mut canned_response = CannedTransport::ok(vec![1u8; 10]);
        canned_response.content_length = None;
        let transport = canned(canned_response);
        let (progress, mut rx) = target();

        let err = transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::MissingContentLength));
        assert!(!dest.exists());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_non_ok_status_removes_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("asset.blend");
        let mut canned_response = CannedTransport::ok(Vec::new());
        canned_response.status = 404;
        let transport = canned(canned_response);
        let (progress, _rx) = target();

        let err = transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "server returned non-OK status: 404");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_body_error_removes_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("asset.blend");
        let transport = canned(CannedTransport {
            status: 200,
            content_length: Some("100000".to_string()),
            chunks: vec![
                Ok(Bytes::from(vec![0u8; 1000])),
                Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset by peer")),
            ],
        });
        let (progress, mut rx) = target();

        let err = transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert!(!dest.exists());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("asset.blend");
        let transport = canned(CannedTransport::ok(vec![1u8; 100]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (progress, mut rx) = target();

        let err = transfer(&transport, "https://cdn/file", &dest, &cancel, progress)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dest.exists());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing").join("asset.blend");
        let transport = canned(CannedTransport::ok(vec![1u8; 100]));
        let (progress, _rx) = target();

        let err = transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Io { .. }));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("empty.blend");
        let transport = canned(CannedTransport::ok(Vec::new()));
        let (progress, mut rx) = target();

        transfer(&transport, "https://cdn/file", &dest, &CancellationToken::new(), progress)
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
        assert!(drain(&mut rx).is_empty());
    }
}
