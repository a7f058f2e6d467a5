// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of Keyward.
//
// Keyward is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Keyward is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Keyward. If not, see <https://www.gnu.org/licenses/>.

//! In-memory lock store implementation (for testing).

use crate::{LockResult, LockStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Value stored for an exclusive lock record.
const HELD: i64 = 1;

/// Expiry horizon used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Entry in the in-memory store with its expiry.
#[derive(Debug, Clone)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

impl Entry {
    fn new_with_ttl(value: i64, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory lock store (for testing).
///
/// ## Purpose
/// Provides a simple in-memory implementation of `LockStore` for testing
/// and single-process scenarios. Each primitive runs under one write guard,
/// which gives it the same atomicity the Redis backend gets from the server.
///
/// ## Limitations
/// - Not persistent (locks lost on restart)
/// - Not distributed (single process only)
/// - Expired entries are only evicted when touched or on [`purge_expired`](Self::purge_expired)
///
/// Expiry follows `tokio::time`, so tests running with a paused clock can
/// advance past a TTL without sleeping.
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryLockStore {
    /// Create a new in-memory lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Remaining lifetime of a live record, `None` if absent or expired.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(key) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), Entry::new_with_ttl(HELD, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> LockResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn acquire_permit(&self, key: &str, num: u32, ttl_secs: u64) -> LockResult<bool> {
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                if entry.value <= 0 {
                    return Ok(false);
                }
                // Decrement keeps the original expiry.
                entry.value -= 1;
                Ok(true)
            }
            _ => {
                let remaining = i64::from(num) - 1;
                entries.insert(
                    key.to_string(),
                    Entry::new_with_ttl(remaining, Duration::from_secs(ttl_secs)),
                );
                Ok(true)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
