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

//! Redis-based lock store implementation.
//!
//! Exclusive records use `SET key 1 NX PX <ttl>`, which creates the key and
//! assigns its expiry in one command. Counting records go through a Lua
//! script so the read, the decision and the write run as one unit on the
//! server; the script uses `redis.call` so a failing command aborts the
//! script and comes back as an error instead of a denial.

use crate::{LockError, LockResult, LockStore};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script};
use std::time::Duration;
use tracing::debug;

/// Take one permit from the counter at `KEYS[1]`.
///
/// `ARGV[1]` is the capacity, `ARGV[2]` the expiry in whole seconds.
/// Returns 1 when a permit was granted and 0 when the counter is exhausted.
const ACQUIRE_PERMIT_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if current == false then
    redis.call("SETEX", KEYS[1], ARGV[2], tonumber(ARGV[1]) - 1)
    return 1
elseif tonumber(current) <= 0 then
    return 0
else
    redis.call("DECR", KEYS[1])
    return 1
end
"#;

/// Redis lock store.
///
/// ## Architecture
/// - Uses `redis` crate with async ConnectionManager
/// - ConnectionManager reconnects automatically; cloning it is cheap
/// - The permit script is sent with EVALSHA and falls back to EVAL on a cold cache
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    permit_script: Script,
}

impl RedisLockStore {
    /// Create a new Redis lock store with the given URL.
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1/`
    /// - `redis+tls://host:6379/`
    pub async fn new(redis_url: &str) -> LockResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::BackendError(format!("failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::BackendError(format!("failed to connect redis: {e}")))?;
        debug!(url = %redis_url, "connected redis lock store");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            permit_script: Script::new(ACQUIRE_PERMIT_SCRIPT),
        }
    }

    /// Round trip a `PING` to check the server is reachable.
    pub async fn ping(&self) -> LockResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// `PX` rejects zero, so sub-millisecond TTLs round up to one millisecond.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::BackendError(format!("Redis SET NX failed: {}", e)))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> LockResult<()> {
        let mut conn = self.conn.clone();

        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;

        Ok(())
    }

    async fn acquire_permit(&self, key: &str, num: u32, ttl_secs: u64) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        let mut invocation = self.permit_script.prepare_invoke();
        invocation.key(key).arg(num).arg(ttl_secs);
        let granted: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::BackendError(format!("Redis permit script failed: {}", e)))?;

        Ok(granted == 1)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
