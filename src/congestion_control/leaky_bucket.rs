// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;
use std::time::Instant;

use crate::Bandwidth;

/// A byte backlog drained at a constant rate, used to pace packets.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    /// Bytes not drained as of `time_last_updated`.
    bytes: u64,

    /// Time of the last update. None before the first update.
    time_last_updated: Option<Instant>,

    draining_rate: Bandwidth,
}

impl LeakyBucket {
    pub fn new(draining_rate: Bandwidth) -> Self {
        Self {
            bytes: 0,
            time_last_updated: None,
            draining_rate,
        }
    }

    /// Change the draining rate. Bytes drained so far are accounted at the
    /// previous rate.
    pub fn set_draining_rate(&mut self, now: Instant, draining_rate: Bandwidth) {
        self.update(now);
        self.draining_rate = draining_rate;
    }

    /// Add bytes to the backlog.
    pub fn add(&mut self, now: Instant, bytes: u64) {
        self.update(now);
        self.bytes = self.bytes.saturating_add(bytes);
    }

    /// Time until the backlog is drained, zero if it already is.
    pub fn time_remaining(&self, now: Instant) -> Duration {
        if self.draining_rate.is_zero() {
            if self.bytes == 0 {
                return Duration::ZERO;
            }
            return Duration::MAX;
        }

        let time_since_last_update = match self.time_last_updated {
            Some(t) => now.saturating_duration_since(t),
            None => return Duration::ZERO,
        };

        let send_delay = self.draining_rate.transfer_time(self.bytes);
        send_delay.saturating_sub(time_since_last_update)
    }

    /// Bytes left in the backlog as of `now`.
    pub fn bytes_pending(&mut self, now: Instant) -> u64 {
        self.update(now);
        self.bytes
    }

    pub fn draining_rate(&self) -> Bandwidth {
        self.draining_rate
    }

    fn update(&mut self, now: Instant) {
        let bytes_cleared = match self.time_last_updated {
            Some(t) => self
                .draining_rate
                .to_bytes_per_period(now.saturating_duration_since(t)),
            None => u64::MAX,
        };
        self.bytes = self.bytes.saturating_sub(bytes_cleared);
        self.time_last_updated = Some(now);
    }
}
