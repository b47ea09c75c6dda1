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

/// A virtual monotonic clock.
///
/// Recovery components never read the wall clock themselves; every operation
/// takes `now` explicitly. The mock clock lets tests and the simulator move
/// time forward deterministically.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    now: Instant,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    /// Create a clock starting at the given instant.
    pub fn starting_at(now: Instant) -> Self {
        Self { now }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Move the clock forward by `delta`.
    pub fn advance_time(&mut self, delta: Duration) {
        self.now += delta;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
