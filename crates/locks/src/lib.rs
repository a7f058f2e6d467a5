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

//! # Keyward Distributed Locks
//!
//! ## Purpose
//! Coordinates mutual exclusion and bounded concurrency across independent
//! processes, using a shared atomic key-value store as the arbitration
//! point. No coordination service is involved: every process talks to the
//! store directly.
//!
//! ## Lock Flavors
//! - **Exclusive lock**: one holder per key, acquired with an atomic
//!   set-if-absent that assigns the TTL in the same step
//! - **Counting lock**: up to `num` holders per key; the first grant stores
//!   `num - 1` remaining permits, later grants decrement atomically
//!
//! Both flavors have a single-attempt form returning `bool` and a blocking
//! form that polls until granted.
//!
//! ## Failure Model
//! - A crashed holder never blocks others forever: records expire after their TTL
//! - Store failures are returned as [`LockError::BackendError`], never as a denial
//! - There are no fencing tokens, lease renewal, or fairness among waiters
//!
//! ## Backend Support
//!
//! - **InMemory**: HashMap-based (feature: `memory-backend`, default)
//! - **Redis**: `SET NX PX` and a Lua script (feature: `redis-backend`)
//!
//! ## Examples
//!
//! ```rust
//! use keyward_locks::{memory::MemoryLockStore, LockCoordinator};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = LockCoordinator::new(Arc::new(MemoryLockStore::new()), "test");
//!
//! assert!(coordinator.try_lock("job1", Duration::from_secs(8)).await?);
//! assert!(!coordinator.try_lock("job1", Duration::from_secs(8)).await?);
//! coordinator.unlock("job1").await?;
//!
//! // Bound the blocking form with the caller's own timeout
//! let waited = tokio::time::timeout(
//!     Duration::from_secs(2),
//!     coordinator.lock("job1", Duration::from_secs(8)),
//! )
//! .await;
//! assert!(waited.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod store;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use backoff::{BackoffPolicy, DEFAULT_RETRY_INTERVAL};
pub use config::{create_coordinator_from_config, create_coordinator_from_env, BackendType, LockConfig};
pub use coordinator::{ttl_to_secs, LockCoordinator};
pub use error::{LockError, LockResult};
pub use store::LockStore;
