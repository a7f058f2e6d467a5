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

//! Error types for distributed lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
///
/// Contention is not represented here: a lock that is held by someone else
/// is reported as `Ok(false)` by the acquire operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Backend error (connectivity, protocol, script failure)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Invalid lock key
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    /// Permit count for a counting lock was not at least one
    #[error("Invalid permit count: {0}")]
    InvalidPermits(u32),

    /// TTL that the backend cannot represent (zero, or rounds to zero seconds)
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LockError {
    /// True when the failure came from talking to the store.
    pub fn is_backend(&self) -> bool {
        matches!(self, LockError::BackendError(_))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::BackendError(format!("Redis error: {}", err))
    }
}
