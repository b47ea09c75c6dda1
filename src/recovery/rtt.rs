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

use std::cmp;
use std::time::Duration;
use std::time::Instant;

use log::*;

/// Round trip time statistics of a connection.
#[derive(Debug, Clone)]
pub struct RttStats {
    /// The most recent RTT sample, with the peer's ack delay removed.
    latest_rtt: Duration,

    /// The minimum RTT observed on the connection.
    min_rtt: Duration,

    /// Exponentially weighted moving average of the RTT samples. Zero until
    /// the first sample arrives.
    smoothed_rtt: Duration,

    /// Mean deviation of the RTT samples around the smoothed RTT.
    mean_deviation: Duration,

    /// RTT assumed before any sample is taken.
    initial_rtt: Duration,
}

impl RttStats {
    pub fn new(initial_rtt: Duration) -> Self {
        Self {
            latest_rtt: Duration::ZERO,
            min_rtt: Duration::ZERO,
            smoothed_rtt: Duration::ZERO,
            mean_deviation: Duration::ZERO,
            initial_rtt,
        }
    }

    /// Whether at least one valid RTT sample has been taken.
    pub fn has_updates(&self) -> bool {
        !self.smoothed_rtt.is_zero()
    }

    /// Return the current best RTT estimation, or the initial RTT if no
    /// sample has been taken yet.
    pub fn smoothed_rtt(&self) -> Duration {
        if !self.has_updates() {
            return self.initial_rtt;
        }
        self.smoothed_rtt
    }

    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    pub fn mean_deviation(&self) -> Duration {
        self.mean_deviation
    }

    pub fn initial_rtt(&self) -> Duration {
        self.initial_rtt
    }

    /// Only honoured before the first sample.
    pub fn set_initial_rtt(&mut self, initial_rtt: Duration) {
        if self.has_updates() {
            return;
        }
        self.initial_rtt = initial_rtt;
    }

    /// Update the statistics with the time elapsed between sending a packet
    /// and receiving its acknowledgement (`send_delta`), and the delay the
    /// peer reported before acknowledging it (`ack_delay`).
    ///
    /// Return whether the sample was taken into account.
    pub fn update_rtt(
        &mut self,
        send_delta: Duration,
        ack_delay: Duration,
        now: Instant,
    ) -> bool {
        let rtt_sample = if send_delta > ack_delay {
            send_delta - ack_delay
        } else if !self.has_updates() {
            // The ack delay is implausible, but the send delta is still the
            // best estimate available until a real sample comes in.
            send_delta
        } else {
            Duration::ZERO
        };

        if rtt_sample.is_zero() || rtt_sample == Duration::MAX {
            debug!("now={:?} ignoring rtt sample {:?}", now, rtt_sample);
            return false;
        }

        self.latest_rtt = rtt_sample;
        if self.min_rtt.is_zero() || self.min_rtt > rtt_sample {
            self.min_rtt = rtt_sample;
        }

        if !self.has_updates() {
            self.smoothed_rtt = rtt_sample;
            self.mean_deviation = rtt_sample / 2;
            return true;
        }

        let deviation = if self.smoothed_rtt > rtt_sample {
            self.smoothed_rtt - rtt_sample
        } else {
            rtt_sample - self.smoothed_rtt
        };
        self.mean_deviation = (3 * self.mean_deviation + deviation) / 4;
        self.smoothed_rtt = (7 * self.smoothed_rtt + rtt_sample) / 8;
        true
    }

    /// The larger of the smoothed and the latest RTT.
    pub fn max_of_smoothed_and_latest(&self) -> Duration {
        cmp::max(self.smoothed_rtt(), self.latest_rtt)
    }
}

impl Default for RttStats {
    fn default() -> Self {
        Self::new(crate::INITIAL_RTT)
    }
}
