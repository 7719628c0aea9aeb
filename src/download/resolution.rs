// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resolution selection.
//!
//! Picks the variant of an asset that best matches the requested texture
//! resolution. Selection never fails: when nothing better is available the
//! original full-quality file is used.

use super::types::{AssetFile, BLEND_FILE_TYPE, ORIGINAL_RESOLUTION, THUMBNAIL_FILE_TYPE};

/// Known resolution tags and their pixel size.
const RESOLUTIONS: &[(&str, u32)] = &[
    ("resolution_0_5K", 512),
    ("resolution_1K", 1024),
    ("resolution_2K", 2048),
    ("resolution_4K", 4096),
    ("resolution_8K", 8192),
];

/// Pixel size of a resolution tag, if it is one.
pub fn resolution_value(tag: &str) -> Option<u32> {
    RESOLUTIONS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, value)| *value)
}

/// The outcome of resolution selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen file. Empty when the list had neither a match nor a blend file.
    pub file: AssetFile,
    /// Tag the selection resolved to
    pub resolution: String,
}

/// Select the file for `target` from `files`.
///
/// - "thumbnail" files are ignored.
/// - "ORIGINAL" returns the first "blend" file as soon as it is seen.
/// - The first file whose resolution equals the target's is returned
///   without looking further.
/// - Otherwise the closest known resolution wins, earliest on ties.
/// - An unknown target disables closest matching and falls back to the
///   original file.
pub fn select_resolution_file(files: &[AssetFile], target: &str) -> Selection {
    let target_value = resolution_value(target);
    let mut original: Option<&AssetFile> = None;
    let mut closest: Option<(&AssetFile, u32)> = None;

    tracing::debug!("Selecting file for resolution {}", target);
    for file in files {
        if file.file_type == THUMBNAIL_FILE_TYPE {
            continue;
        }

        if file.file_type == BLEND_FILE_TYPE {
            if target == ORIGINAL_RESOLUTION {
                return Selection {
                    file: file.clone(),
                    resolution: BLEND_FILE_TYPE.to_string(),
                };
            }
            original.get_or_insert(file);
        }

        let (Some(value), Some(wanted)) = (resolution_value(&file.file_type), target_value) else {
            continue;
        };

        if value == wanted {
            return Selection {
                file: file.clone(),
                resolution: file.file_type.clone(),
            };
        }

        let distance = value.abs_diff(wanted);
        if closest.map_or(true, |(_, best)| distance < best) {
            closest = Some((file, distance));
        }
    }

    if let Some((file, _)) = closest {
        return Selection {
            file: file.clone(),
            resolution: file.file_type.clone(),
        };
    }

    Selection {
        file: original.cloned().unwrap_or_default(),
        resolution: BLEND_FILE_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(tag: &str, url: &str) -> AssetFile {
        AssetFile::new(tag, url)
    }

    fn sample() -> Vec<AssetFile> {
        vec![
            file("thumbnail", "https://cdn/thumb"),
            file("blend", "https://api/blend"),
            file("resolution_1K", "https://api/1k"),
            file("resolution_4K", "https://api/4k"),
        ]
    }

    #[test]
    fn test_resolution_values() {
        assert_eq!(resolution_value("resolution_0_5K"), Some(512));
        assert_eq!(resolution_value("resolution_8K"), Some(8192));
        assert_eq!(resolution_value("blend"), None);
        assert_eq!(resolution_value("ORIGINAL"), None);
    }

    #[test]
    fn test_exact_match_returns_first_in_order() {
        let files = vec![
            file("blend", "https://api/blend"),
            file("resolution_2K", "https://api/2k-first"),
            file("resolution_2K", "https://api/2k-second"),
        ];
        let selection = select_resolution_file(&files, "resolution_2K");
        assert_eq!(selection.file.download_url, "https://api/2k-first");
        assert_eq!(selection.resolution, "resolution_2K");
    }

    #[test]
    fn test_original_short_circuits() {
        let files = vec![
            file("blend", "https://api/blend"),
            file("resolution_2K", "https://api/2k"),
        ];
        let selection = select_resolution_file(&files, "ORIGINAL");
        assert_eq!(selection.file.download_url, "https://api/blend");
        assert_eq!(selection.resolution, "blend");
    }

    #[test]
    fn test_original_returns_first_blend() {
        let files = vec![
            file("resolution_1K", "https://api/1k"),
            file("blend", "https://api/blend-a"),
            file("blend", "https://api/blend-b"),
        ];
        let selection = select_resolution_file(&files, "ORIGINAL");
        assert_eq!(selection.file.download_url, "https://api/blend-a");
    }

    #[test]
    fn test_closest_match() {
        let selection = select_resolution_file(&sample(), "resolution_2K");
        // 1K and 4K are 1024 and 2048 away from 2K
        assert_eq!(selection.file.download_url, "https://api/1k");
        assert_eq!(selection.resolution, "resolution_1K");

        let selection = select_resolution_file(&sample(), "resolution_8K");
        assert_eq!(selection.file.download_url, "https://api/4k");
    }

    #[test]
    fn test_closest_match_ties_keep_earliest() {
        let files = vec![
            file("resolution_1K", "https://api/1k"),
            file("resolution_4K", "https://api/4k"),
        ];
        // 0.5K: 1K is 512 away; 4K is further
        let selection = select_resolution_file(&files, "resolution_0_5K");
        assert_eq!(selection.resolution, "resolution_1K");

        let files = vec![
            file("resolution_1K", "https://api/1k-a"),
            file("resolution_1K", "https://api/1k-b"),
        ];
        let selection = select_resolution_file(&files, "resolution_2K");
        assert_eq!(selection.file.download_url, "https://api/1k-a");
    }

    #[test]
    fn test_unknown_target_falls_back_to_blend() {
        let selection = select_resolution_file(&sample(), "resolution_16K");
        assert_eq!(selection.file.download_url, "https://api/blend");
        assert_eq!(selection.resolution, "blend");
    }

    #[test]
    fn test_unknown_target_without_blend_is_empty() {
        let files = vec![
            file("thumbnail", "https://cdn/thumb"),
            file("resolution_1K", "https://api/1k"),
        ];
        let selection = select_resolution_file(&files, "weird");
        assert!(selection.file.is_empty());
        assert_eq!(selection.resolution, "blend");
    }

    #[test]
    fn test_known_target_without_resolutions_uses_blend() {
        let files = vec![file("blend", "https://api/blend")];
        let selection = select_resolution_file(&files, "resolution_2K");
        assert_eq!(selection.file.download_url, "https://api/blend");
        assert_eq!(selection.resolution, "blend");
    }

    #[test]
    fn test_thumbnails_are_never_selected() {
        let files = vec![file("thumbnail", "https://cdn/thumb")];
        let selection = select_resolution_file(&files, "ORIGINAL");
        assert!(selection.file.is_empty());
    }

    #[test]
    fn test_empty_list() {
        let selection = select_resolution_file(&[], "resolution_2K");
        assert!(selection.file.is_empty());
        assert_eq!(selection.resolution, "blend");
    }
}
