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

//! Store trait for the atomic primitives the lock protocol is built on.

use async_trait::async_trait;
use std::time::Duration;

use crate::LockResult;

/// Atomic key-value primitives backing [`LockCoordinator`](crate::LockCoordinator).
///
/// ## Purpose
/// The store is the sole owner of lock state. Implementations receive keys
/// that are already namespaced and must perform every primitive as one
/// indivisible step on the backend; the coordinator never reads lock state
/// outside these calls.
///
/// ## Backends
/// - [`MemoryLockStore`](crate::memory::MemoryLockStore): single process, for tests
/// - [`RedisLockStore`](crate::redis::RedisLockStore): `SET NX PX` plus a Lua script
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` only if it does not already exist, expiring after `ttl`.
    ///
    /// Creation and expiry assignment happen in one operation, so a crash
    /// can never leave a record without an expiry.
    ///
    /// ## Returns
    /// - `Ok(true)`: key was created
    /// - `Ok(false)`: key already existed
    /// - `Err(LockError::BackendError)`: backend error
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> LockResult<bool>;

    /// Delete `key` unconditionally. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> LockResult<()>;

    /// Take one permit from the counter stored at `key` (atomic operation).
    ///
    /// ## Behavior
    /// - If the key doesn't exist: store `num - 1` with a `ttl_secs` expiry, grant
    /// - If the counter is `<= 0`: deny
    /// - Otherwise: decrement without touching the expiry, grant
    ///
    /// ## Returns
    /// - `Ok(true)`: permit granted
    /// - `Ok(false)`: no permits left
    /// - `Err(LockError::BackendError)`: backend error
    async fn acquire_permit(&self, key: &str, num: u32, ttl_secs: u64) -> LockResult<bool>;

    /// Short backend name used in log fields.
    fn backend_name(&self) -> &'static str;
}
