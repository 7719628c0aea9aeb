// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock helpers that survive poisoning.
//!
//! A task that panics while holding the registry lock must not take the
//! server down with it. The guard is recovered and the event logged; a
//! stale report is better than refusing every later poll.
//!
//! ```no_run
//! use std::sync::RwLock;
//! use assetd::locks::{resilient_read, resilient_write};
//!
//! let lock = RwLock::new(Vec::<u64>::new());
//! resilient_write(&lock).push(4242);
//! assert_eq!(resilient_read(&lock).len(), 1);
//! ```

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "assetd::locks",
            "RwLock poisoned during read, recovering. A task panicked while holding it."
        );
        poisoned.into_inner()
    })
}

/// Acquire a write lock, recovering from poisoning.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "assetd::locks",
            "RwLock poisoned during write, recovering. A task panicked while holding it."
        );
        poisoned.into_inner()
    })
}
