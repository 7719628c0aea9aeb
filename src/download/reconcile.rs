// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reconciliation of planned paths against what is already on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::error::DownloadError;

/// What a task has to do to get its files in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing on disk: transfer into the first path
    Download,
    /// Everything already in place
    Place,
    /// One of two copies exists: copy it into the missing path
    Sync,
    /// Unexpected state: delete every candidate, then download
    PurgeThenDownload,
}

/// Decide the action from how many of `path_count` candidates exist.
pub fn decide_action(existing: usize, path_count: usize) -> Action {
    match (existing, path_count) {
        (0, _) => Action::Download,
        (2, 2) => Action::Place,
        (1, 2) => Action::Sync,
        (1, 1) => Action::Place,
        _ => Action::PurgeThenDownload,
    }
}

/// Which candidate paths were found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistenceSnapshot {
    /// One entry per candidate path, in the same order
    pub exists: Vec<bool>,
}

impl ExistenceSnapshot {
    /// Number of candidate paths present.
    pub fn existing(&self) -> usize {
        self.exists.iter().filter(|e| **e).count()
    }
}

/// Check a single candidate path.
///
/// A directory sitting where the file should be is removed and reported as
/// absent. Any other probe failure is logged and reported as absent.
async fn probe_path(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            tracing::warn!("Deleting directory at file path: {}", path.display());
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                tracing::warn!("Error deleting directory {}: {}", path.display(), e);
            }
            false
        }
        Ok(_) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Error checking if {} exists: {}", path.display(), e);
            false
        }
    }
}

/// Probe every candidate path.
pub async fn probe_paths(paths: &[PathBuf]) -> ExistenceSnapshot {
    let mut exists = Vec::with_capacity(paths.len());
    for path in paths {
        exists.push(probe_path(path).await);
    }
    ExistenceSnapshot { exists }
}

/// Probe `paths` and decide what to do.
pub async fn reconcile(paths: &[PathBuf]) -> (Action, ExistenceSnapshot) {
    let snapshot = probe_paths(paths).await;
    let action = decide_action(snapshot.existing(), paths.len());
    if action == Action::PurgeThenDownload {
        tracing::warn!(
            "Unexpected number of existing files: {} of {}",
            snapshot.existing(),
            paths.len()
        );
    }
    (action, snapshot)
}

/// Delete every candidate path. Failures are logged and otherwise ignored.
pub async fn purge(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Deleted {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Error deleting file {}: {}", path.display(), e),
        }
    }
}

/// Copy the existing candidate into every missing one.
pub async fn sync_missing(paths: &[PathBuf], snapshot: &ExistenceSnapshot) -> Result<(), DownloadError> {
    let source = paths
        .iter()
        .zip(&snapshot.exists)
        .find(|(_, exists)| **exists)
        .map(|(path, _)| path)
        .ok_or_else(|| {
            DownloadError::io(
                "no existing file to sync from",
                std::io::Error::from(ErrorKind::NotFound),
            )
        })?;

    for (target, exists) in paths.iter().zip(&snapshot.exists) {
        if *exists {
            continue;
        }
        tracing::info!("Syncing {} -> {}", source.display(), target.display());
        tokio::fs::copy(source, target).await.map_err(|e| {
            DownloadError::io(
                format!("failed to copy {} to {}", source.display(), target.display()),
                e,
            )
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_decision_table() {
        assert_eq!(decide_action(0, 1), Action::Download);
        assert_eq!(decide_action(0, 2), Action::Download);
        assert_eq!(decide_action(2, 2), Action::Place);
        assert_eq!(decide_action(1, 2), Action::Sync);
        assert_eq!(decide_action(1, 1), Action::Place);
        assert_eq!(decide_action(2, 1), Action::PurgeThenDownload);
        assert_eq!(decide_action(3, 3), Action::PurgeThenDownload);
    }

    #[tokio::test]
    async fn test_reconcile_nothing_on_disk() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.blend"), dir.path().join("b.blend")];
        let (action, snapshot) = reconcile(&paths).await;
        assert_eq!(action, Action::Download);
        assert_eq!(snapshot.exists, vec![false, false]);
    }

    #[tokio::test]
    async fn test_reconcile_all_present() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.blend"), dir.path().join("b.blend")];
        for p in &paths {
            std::fs::write(p, b"data").unwrap();
        }
        let (action, _) = reconcile(&paths).await;
        assert_eq!(action, Action::Place);

        let (action, _) = reconcile(&paths[..1]).await;
        assert_eq!(action, Action::Place);
    }

    #[tokio::test]
    async fn test_reconcile_one_of_two() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.blend"), dir.path().join("b.blend")];
        std::fs::write(&paths[1], b"data").unwrap();

        let (action, snapshot) = reconcile(&paths).await;
        assert_eq!(action, Action::Sync);
        assert_eq!(snapshot.exists, vec![false, true]);
    }

    #[tokio::test]
    async fn test_directory_in_place_of_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.blend");
        std::fs::create_dir_all(path.join("junk")).unwrap();

        let (action, snapshot) = reconcile(&[path.clone()]).await;
        assert_eq!(action, Action::Download);
        assert_eq!(snapshot.existing(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sync_copies_into_missing_path() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let paths = vec![first.path().join("a.blend"), second.path().join("a.blend")];
        std::fs::write(&paths[0], b"asset bytes").unwrap();

        let snapshot = probe_paths(&paths).await;
        sync_missing(&paths, &snapshot).await.unwrap();

        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"asset bytes");
    }

    #[tokio::test]
    async fn test_sync_without_source_fails() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.blend")];
        let snapshot = ExistenceSnapshot { exists: vec![false] };
        assert!(matches!(
            sync_missing(&paths, &snapshot).await,
            Err(DownloadError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_removes_files_and_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.blend"), dir.path().join("b.blend")];
        std::fs::write(&paths[0], b"data").unwrap();

        purge(&paths).await;
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
    }
}
