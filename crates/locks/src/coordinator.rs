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

//! Lock coordinator: exclusive and counting locks over a shared store.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::{BackoffPolicy, LockError, LockResult, LockStore};

/// Stateless façade over a [`LockStore`].
///
/// ## Purpose
/// Offers two lock flavors on the same store:
/// - **Exclusive**: at most one holder per key, acquired with set-if-absent
/// - **Counting**: up to `num` holders per key, tracked by a remaining-permit counter
///
/// Every operation namespaces the caller's key with the coordinator prefix
/// and makes exactly one store round trip per attempt. The coordinator keeps
/// no lock state, so it can be cloned freely and shared across tasks.
///
/// ## Known limitations
/// - [`unlock`](Self::unlock) does not check ownership: any caller can release any key.
/// - Counting locks have no release; permits come back only when the key's TTL expires.
/// - Waiters are not ordered; who wins after contention is unspecified.
///
/// ## Example
/// ```rust
/// use keyward_locks::{memory::MemoryLockStore, LockCoordinator};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = LockCoordinator::new(Arc::new(MemoryLockStore::new()), "jobs:");
///
/// if coordinator.try_lock("report", Duration::from_secs(30)).await? {
///     // ... exclusive work ...
///     coordinator.unlock("report").await?;
/// }
///
/// // At most 3 concurrent exporters
/// coordinator.lock_num("export", 3, Duration::from_secs(60)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    prefix: String,
    backoff: BackoffPolicy,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("backend", &self.store.backend_name())
            .field("prefix", &self.prefix)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl LockCoordinator {
    /// Create a coordinator over `store` with a fixed key prefix.
    pub fn new(store: Arc<dyn LockStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Replace the polling policy used by the blocking operations.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Namespace a raw key: `prefix + key`.
    pub fn format_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Try once to take the exclusive lock on `key`.
    ///
    /// ## Returns
    /// - `Ok(true)`: lock acquired, it expires after `ttl` unless released first
    /// - `Ok(false)`: lock currently held
    /// - `Err(LockError::BackendError)`: store unreachable or protocol error
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let full_key = self.checked_key(key)?;
        check_exclusive_ttl(ttl)?;

        let acquired = self.set_if_absent(&full_key, ttl).await?;
        debug!(key = %full_key, acquired, "exclusive lock attempt");
        Ok(acquired)
    }

    /// Take the exclusive lock on `key`, polling until it is free.
    ///
    /// There is no deadline; wrap the call in `tokio::time::timeout` to bound
    /// the wait. Only store failures end the loop early.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn lock(&self, key: &str, ttl: Duration) -> LockResult<()> {
        let full_key = self.checked_key(key)?;
        check_exclusive_ttl(ttl)?;

        let key_ref = full_key.as_str();
        let attempts = self
            .poll_until(move || self.set_if_absent(key_ref, ttl))
            .await?;
        debug!(key = %full_key, attempts, "exclusive lock acquired");
        Ok(())
    }

    /// Delete the exclusive lock on `key`, whoever holds it.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn unlock(&self, key: &str) -> LockResult<()> {
        let full_key = self.checked_key(key)?;

        self.store
            .delete(&full_key)
            .await
            .inspect_err(|e| warn!(key = %full_key, error = %e, "failed to release lock"))?;
        debug!(key = %full_key, "lock released");
        Ok(())
    }

    /// Try once to take one of `num` permits on `key`.
    ///
    /// The first grant on a fresh key initializes the counter to `num - 1`
    /// with a TTL of `ttl` rounded to the nearest second. Later grants
    /// decrement it without extending the TTL.
    ///
    /// ## Returns
    /// - `Ok(true)`: permit granted
    /// - `Ok(false)`: all permits taken
    /// - `Err(LockError::InvalidPermits)`: `num` is zero
    /// - `Err(LockError::InvalidTtl)`: `ttl` rounds to zero seconds
    /// - `Err(LockError::BackendError)`: store unreachable or script error
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn try_lock_num(&self, key: &str, num: u32, ttl: Duration) -> LockResult<bool> {
        let full_key = self.checked_key(key)?;
        let ttl_secs = check_counting_args(num, ttl)?;

        let acquired = self.acquire_permit(&full_key, num, ttl_secs).await?;
        debug!(key = %full_key, acquired, "counting lock attempt");
        Ok(acquired)
    }

    /// Take one of `num` permits on `key`, polling until one is granted.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn lock_num(&self, key: &str, num: u32, ttl: Duration) -> LockResult<()> {
        let full_key = self.checked_key(key)?;
        let ttl_secs = check_counting_args(num, ttl)?;

        let key_ref = full_key.as_str();
        let attempts = self
            .poll_until(move || self.acquire_permit(key_ref, num, ttl_secs))
            .await?;
        debug!(key = %full_key, attempts, "counting lock acquired");
        Ok(())
    }

    fn checked_key(&self, key: &str) -> LockResult<String> {
        if key.is_empty() {
            return Err(LockError::InvalidKey("key must not be empty".to_string()));
        }
        Ok(self.format_key(key))
    }

    async fn set_if_absent(&self, full_key: &str, ttl: Duration) -> LockResult<bool> {
        self.store
            .set_if_absent(full_key, ttl)
            .await
            .inspect_err(|e| warn!(key = %full_key, error = %e, "exclusive acquire failed"))
    }

    async fn acquire_permit(&self, full_key: &str, num: u32, ttl_secs: u64) -> LockResult<bool> {
        self.store
            .acquire_permit(full_key, num, ttl_secs)
            .await
            .inspect_err(|e| warn!(key = %full_key, error = %e, "counting acquire failed"))
    }

    /// Run `attempt` until it grants, sleeping per the backoff policy between
    /// denials. Returns the number of attempts made.
    async fn poll_until<F, Fut>(&self, mut attempt: F) -> LockResult<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LockResult<bool>>,
    {
        let mut denied: u32 = 0;
        loop {
            if attempt().await? {
                return Ok(denied.saturating_add(1));
            }
            let delay = self.backoff.delay(denied);
            trace!(attempt = denied, ?delay, "lock busy, retrying");
            tokio::time::sleep(delay).await;
            denied = denied.saturating_add(1);
        }
    }
}

/// Round `ttl` to the nearest whole second, halves rounding up.
pub fn ttl_to_secs(ttl: Duration) -> u64 {
    let round_up = ttl.subsec_nanos() >= 500_000_000;
    ttl.as_secs().saturating_add(u64::from(round_up))
}

fn check_exclusive_ttl(ttl: Duration) -> LockResult<()> {
    if ttl.is_zero() {
        return Err(LockError::InvalidTtl("ttl must be greater than zero".to_string()));
    }
    Ok(())
}

fn check_counting_args(num: u32, ttl: Duration) -> LockResult<u64> {
    if num == 0 {
        return Err(LockError::InvalidPermits(num));
    }
    let ttl_secs = ttl_to_secs(ttl);
    if ttl_secs == 0 {
        return Err(LockError::InvalidTtl(format!(
            "{:?} rounds to zero seconds",
            ttl
        )));
    }
    Ok(ttl_secs)
}

#[cfg(all(test, feature = "memory-backend"))]
mod tests {
    use super::*;
    use crate::memory::MemoryLockStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn coordinator(prefix: &str) -> LockCoordinator {
        LockCoordinator::new(Arc::new(MemoryLockStore::new()), prefix)
    }

    /// Store whose every call fails, as if the server were unreachable.
    struct UnreachableStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LockStore for UnreachableStore {
        async fn set_if_absent(&self, _key: &str, _ttl: Duration) -> LockResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LockError::BackendError("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> LockResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LockError::BackendError("connection refused".to_string()))
        }

        async fn acquire_permit(&self, _key: &str, _num: u32, _ttl_secs: u64) -> LockResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LockError::BackendError("connection refused".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "unreachable"
        }
    }

    /// Store that records the keys it was handed.
    #[derive(Default)]
    struct RecordingStore {
        keys: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LockStore for RecordingStore {
        async fn set_if_absent(&self, key: &str, _ttl: Duration) -> LockResult<bool> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(true)
        }

        async fn delete(&self, key: &str) -> LockResult<()> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn acquire_permit(&self, key: &str, _num: u32, _ttl_secs: u64) -> LockResult<bool> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(true)
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    #[test]
    fn test_format_key() {
        let coordinator = coordinator("test");
        assert_eq!(coordinator.format_key("job1"), "testjob1");
        assert_eq!(coordinator.format_key(""), "test");
    }

    #[test]
    fn test_ttl_to_secs_rounds_to_nearest() {
        assert_eq!(ttl_to_secs(Duration::from_millis(400)), 0);
        assert_eq!(ttl_to_secs(Duration::from_millis(500)), 1);
        assert_eq!(ttl_to_secs(Duration::from_millis(1499)), 1);
        assert_eq!(ttl_to_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_to_secs(Duration::from_secs(5)), 5);
    }

    #[tokio::test]
    async fn test_try_lock_then_denied() {
        let coordinator = coordinator("test");

        assert!(coordinator.try_lock("job1", Duration::from_secs(8)).await.unwrap());
        for _ in 0..5 {
            assert!(!coordinator.try_lock("job1", Duration::from_secs(8)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unlock_by_any_caller() {
        let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        let holder = LockCoordinator::new(store.clone(), "test");
        let other = LockCoordinator::new(store, "test");

        assert!(holder.try_lock("job1", Duration::from_secs(8)).await.unwrap());
        other.unlock("job1").await.unwrap();
        assert!(other.try_lock("job1", Duration::from_secs(8)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_unheld_is_ok() {
        coordinator("test").unlock("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_counting_lock_capacity() {
        let coordinator = coordinator("test");

        for _ in 0..3 {
            assert!(coordinator.try_lock_num("pool", 3, Duration::from_secs(5)).await.unwrap());
        }
        assert!(!coordinator.try_lock_num("pool", 3, Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_counting_lock_rejects_zero_permits() {
        let result = coordinator("test").try_lock_num("pool", 0, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(LockError::InvalidPermits(0))));

        let result = coordinator("test").lock_num("pool", 0, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(LockError::InvalidPermits(0))));
    }

    #[tokio::test]
    async fn test_counting_lock_rejects_subsecond_ttl() {
        let result = coordinator("test")
            .try_lock_num("pool", 2, Duration::from_millis(499))
            .await;
        assert!(matches!(result, Err(LockError::InvalidTtl(_))));
    }

    #[tokio::test]
    async fn test_counting_lock_accepts_rounded_up_ttl() {
        let coordinator = coordinator("test");
        assert!(coordinator
            .try_lock_num("pool", 2, Duration::from_millis(500))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_effectively_forever_ttl() {
        let coordinator = coordinator("p");

        assert!(coordinator.try_lock("k", Duration::MAX).await.unwrap());
        assert!(!coordinator.try_lock("k", Duration::MAX).await.unwrap());

        assert!(coordinator
            .try_lock_num("n", 2, Duration::from_secs(u64::MAX))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_exclusive_rejects_zero_ttl() {
        let result = coordinator("test").try_lock("job", Duration::ZERO).await;
        assert!(matches!(result, Err(LockError::InvalidTtl(_))));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let coordinator = coordinator("test");

        let result = coordinator.try_lock("", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));
        let result = coordinator.unlock("").await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_prefix_applied_once() {
        let store = Arc::new(RecordingStore::default());
        let coordinator = LockCoordinator::new(store.clone(), "app:");

        coordinator.try_lock("a", Duration::from_secs(1)).await.unwrap();
        coordinator.lock("b", Duration::from_secs(1)).await.unwrap();
        coordinator.unlock("c").await.unwrap();
        coordinator.try_lock_num("d", 2, Duration::from_secs(1)).await.unwrap();
        coordinator.lock_num("e", 2, Duration::from_secs(1)).await.unwrap();

        let keys = store.keys.lock().unwrap().clone();
        assert_eq!(keys, vec!["app:a", "app:b", "app:c", "app:d", "app:e"]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_denial() {
        let store = Arc::new(UnreachableStore {
            calls: AtomicU32::new(0),
        });
        let coordinator = LockCoordinator::new(store.clone(), "test");

        let result = coordinator.try_lock("job", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::BackendError(_))));

        let result = coordinator.try_lock_num("job", 2, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::BackendError(_))));

        let result = coordinator.unlock("job").await;
        assert!(matches!(result, Err(LockError::BackendError(_))));
    }

    #[tokio::test]
    async fn test_blocking_lock_propagates_backend_failure() {
        let store = Arc::new(UnreachableStore {
            calls: AtomicU32::new(0),
        });
        let coordinator = LockCoordinator::new(store.clone(), "test");

        let result = coordinator.lock("job", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::BackendError(_))));

        let result = coordinator.lock_num("job", 2, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::BackendError(_))));

        // No retry after a failure
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_lock_waits_for_release() {
        let coordinator = coordinator("test");
        assert!(coordinator.try_lock("job", Duration::from_secs(60)).await.unwrap());

        let releaser = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            releaser.unlock("job").await.unwrap();
        });

        let started = tokio::time::Instant::now();
        coordinator.lock("job", Duration::from_secs(60)).await.unwrap();
        let waited = started.elapsed();

        assert!(waited >= Duration::from_millis(350));
        assert!(waited <= Duration::from_millis(450));
        assert!(!coordinator.try_lock("job", Duration::from_secs(60)).await.unwrap());
    }

    #[test]
    fn test_debug_shows_backend_and_prefix() {
        let rendered = format!("{:?}", coordinator("jobs:"));
        assert!(rendered.contains("memory"));
        assert!(rendered.contains("jobs:"));
    }
}
