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

//! Polling delays for the blocking acquire operations.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll interval used when no policy is configured.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How long a blocking acquire sleeps between attempts.
///
/// The policy only shapes latency; whether an attempt is granted or denied
/// is decided entirely by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay after every failed attempt.
    Constant { interval: Duration },
    /// `initial * multiplier^attempt`, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: u32,
    },
    /// `base` plus a uniformly random extra in `[0, jitter]`.
    Jittered { base: Duration, jitter: Duration },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Constant {
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl BackoffPolicy {
    /// Constant policy with the given interval.
    pub fn constant(interval: Duration) -> Self {
        Self::Constant { interval }
    }

    /// Delay before the next attempt, `attempt` counting failed attempts from 0.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant { interval } => *interval,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
                initial.checked_mul(factor).map_or(*max, |d| d.min(*max))
            }
            Self::Jittered { base, jitter } => {
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                if jitter_ms == 0 {
                    return *base;
                }
                let extra = rand::thread_rng().gen_range(0..=jitter_ms);
                base.saturating_add(Duration::from_millis(extra))
            }
        }
    }
}
