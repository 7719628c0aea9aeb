// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for assetd.
//!
//! This module provides common utility functions used across the codebase.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a slug, in characters.
const MAX_SLUG_LEN: usize = 50;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Mask a sensitive string (like API keys) for logging.
///
/// Shows only the first `visible_prefix` characters and replaces the rest with "...".
/// This ensures API keys are never logged in full.
///
/// # Examples
///
/// ```
/// use assetd::utils::mask_sensitive;
///
/// let api_key = "bk-6f1d2c9e0a7b4e3f";
/// let masked = mask_sensitive(&api_key, 3);
/// assert_eq!(masked, "bk-...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        // If it's shorter than the visible prefix, still mask it to avoid leaking length
        return format!("{}...", input);
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

/// Turn an asset name into a filesystem-safe slug.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single `_`, trims separators from both ends and caps the length.
///
/// ```
/// use assetd::utils::slugify;
///
/// assert_eq!(slugify("Old Wooden Chair (v2)"), "old_wooden_chair_v2");
/// ```
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&lower, "_");
    let slug = slug.trim_matches(|c| c == '_' || c == '-');
    slug.chars().take(MAX_SLUG_LEN).collect()
}

/// Local file name for a file served as `server_filename`.
///
/// The service names files `resolution_2K_<uuid>.blend` or
/// `blend_<uuid>.blend`; locally they are prefixed with the asset slug and
/// lose the variant prefix, e.g. `kitten_2K_<uuid>.blend`.
pub fn server_to_local_filename(server_filename: &str, asset_name: &str) -> String {
    let stripped = server_filename
        .replace("blend_", "")
        .replace("resolution_", "");
    format!("{}_{}", slugify(asset_name), stripped)
}
