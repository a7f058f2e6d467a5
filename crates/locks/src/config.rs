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

//! Configuration support for lock store backends.
//!
//! ## Environment Variables
//!
//! ### Backend Selection
//! - `KEYWARD_LOCK_BACKEND`: Backend type (default: "in-memory")
//!   - "in-memory" | "memory" → MemoryLockStore
//!   - "redis" → RedisLockStore
//!
//! ### Redis Configuration
//! - `KEYWARD_LOCK_REDIS_URL`: Redis server URL (default: "redis://localhost:6379")
//!
//! ### Coordinator
//! - `KEYWARD_LOCK_PREFIX`: Key prefix for isolation (default: "keyward:lock:")
//! - `KEYWARD_LOCK_RETRY_INTERVAL_MS`: Poll interval of the blocking operations (default: 100)
//!
//! ## Examples
//!
//! ```bash
//! export KEYWARD_LOCK_BACKEND=redis
//! export KEYWARD_LOCK_REDIS_URL=redis://localhost:6379
//! export KEYWARD_LOCK_PREFIX=billing:
//! cargo run
//! ```

use crate::{BackoffPolicy, LockCoordinator, LockError, LockResult, LockStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "keyward:lock:";

/// Redis URL used when none is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Backend type configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendType {
    /// In-memory backend (default, single process only)
    #[default]
    InMemory,
    /// Redis backend (requires redis-backend feature)
    Redis {
        /// Redis server URL
        url: String,
    },
}

/// Lock coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Backend type
    #[serde(default)]
    pub backend: BackendType,
    /// Prefix prepended to every lock key
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Polling policy of the blocking operations
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::InMemory,
            prefix: default_prefix(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl LockConfig {
    /// Create configuration with explicit backend and prefix.
    pub fn new(backend: BackendType, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See module documentation for the complete list.
    pub fn from_env() -> LockResult<Self> {
        let backend_str = std::env::var("KEYWARD_LOCK_BACKEND")
            .unwrap_or_else(|_| "in-memory".to_string())
            .to_lowercase();

        let backend = match backend_str.as_str() {
            "in-memory" | "memory" => BackendType::InMemory,
            "redis" => {
                let url = std::env::var("KEYWARD_LOCK_REDIS_URL")
                    .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
                BackendType::Redis { url }
            }
            other => {
                return Err(LockError::ConfigError(format!(
                    "Unknown backend type: {}. Valid options: in-memory, redis",
                    other
                )));
            }
        };

        let prefix = std::env::var("KEYWARD_LOCK_PREFIX").unwrap_or_else(|_| default_prefix());

        let backoff = match std::env::var("KEYWARD_LOCK_RETRY_INTERVAL_MS") {
            Ok(raw) => {
                let millis: u64 = raw.trim().parse().map_err(|_| {
                    LockError::ConfigError(format!(
                        "KEYWARD_LOCK_RETRY_INTERVAL_MS must be a whole number of milliseconds, got {:?}",
                        raw
                    ))
                })?;
                if millis == 0 {
                    return Err(LockError::ConfigError(
                        "KEYWARD_LOCK_RETRY_INTERVAL_MS must be greater than zero".to_string(),
                    ));
                }
                BackoffPolicy::constant(Duration::from_millis(millis))
            }
            Err(_) => BackoffPolicy::default(),
        };

        Ok(Self {
            backend,
            prefix,
            backoff,
        })
    }

    /// Replace the polling policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Create a lock coordinator from environment configuration.
pub async fn create_coordinator_from_env() -> LockResult<LockCoordinator> {
    let config = LockConfig::from_env()?;
    create_coordinator_from_config(config).await
}

/// Create a lock coordinator from explicit configuration.
///
/// ## Examples
/// ```rust
/// use keyward_locks::{create_coordinator_from_config, BackendType, LockConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LockConfig::new(BackendType::InMemory, "jobs:");
/// let coordinator = create_coordinator_from_config(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_coordinator_from_config(config: LockConfig) -> LockResult<LockCoordinator> {
    let store = create_store(&config.backend).await?;
    Ok(LockCoordinator::new(store, config.prefix).with_backoff(config.backoff))
}

async fn create_store(backend: &BackendType) -> LockResult<Arc<dyn LockStore>> {
    match backend {
        #[cfg(feature = "memory-backend")]
        BackendType::InMemory => Ok(Arc::new(crate::memory::MemoryLockStore::new())),

        #[cfg(not(feature = "memory-backend"))]
        BackendType::InMemory => Err(LockError::ConfigError(
            "In-memory backend requires 'memory-backend' feature".to_string(),
        )),

        #[cfg(feature = "redis-backend")]
        BackendType::Redis { url } => {
            let store = crate::redis::RedisLockStore::new(url).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "redis-backend"))]
        BackendType::Redis { .. } => Err(LockError::ConfigError(
            "Redis backend requires 'redis-backend' feature".to_string(),
        )),
    }
}
