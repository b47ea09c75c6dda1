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

//! Fixed rate congestion control.
//!
//! The receiver advertises a bitrate and the sender paces its packets to
//! that rate, regardless of losses. At most the bytes the bitrate moves in
//! 10ms are kept in flight.

use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionFeedback;
use super::CongestionPacket;
use super::CongestionStats;
use super::LeakyBucket;
use super::ReceiveAlgorithm;
use super::SendAlgorithm;
use crate::recovery::RttStats;
use crate::Bandwidth;
use crate::Error;
use crate::Result;

/// Bitrate used until the peer advertises one.
pub const INITIAL_BITRATE: Bandwidth = Bandwidth::from_bytes_per_second(100_000);

/// The congestion window holds what the bitrate transfers in this period.
const WINDOW_SIZE: Duration = Duration::from_millis(10);

/// Fixed rate sender.
#[derive(Debug)]
pub struct FixRateSender {
    bitrate: Bandwidth,

    max_segment_size: u64,

    /// Paces sent bytes at `bitrate`.
    leaky_bucket: LeakyBucket,

    /// RTT of the last congestion event with a new RTT sample.
    latest_rtt: Duration,

    stats: CongestionStats,
}

impl FixRateSender {
    pub fn new(initial_bitrate: Bandwidth, max_segment_size: u64) -> Self {
        Self {
            bitrate: initial_bitrate,
            max_segment_size,
            leaky_bucket: LeakyBucket::new(initial_bitrate),
            latest_rtt: Duration::ZERO,
            stats: Default::default(),
        }
    }
}

impl Default for FixRateSender {
    fn default() -> Self {
        Self::new(INITIAL_BITRATE, crate::DEFAULT_MAX_PACKET_SIZE)
    }
}

impl SendAlgorithm for FixRateSender {
    fn name(&self) -> &str {
        "FIXRATE"
    }

    fn on_incoming_congestion_feedback(
        &mut self,
        feedback: &CongestionFeedback,
        now: Instant,
    ) -> Result<()> {
        match feedback {
            CongestionFeedback::FixRate { bitrate } => {
                trace!(
                    "now={:?} {} ON_FEEDBACK bitrate={:?}",
                    now,
                    self.name(),
                    bitrate
                );
                self.bitrate = *bitrate;
                self.leaky_bucket.set_draining_rate(now, *bitrate);
                Ok(())
            }
            _ => {
                error!(
                    "{} got congestion feedback of type {:?}",
                    self.name(),
                    feedback.feedback_type()
                );
                Err(Error::InvalidFeedback)
            }
        }
    }

    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        bytes_in_flight: u64,
        acked_packets: &[CongestionPacket],
        lost_packets: &[CongestionPacket],
        rtt: &RttStats,
    ) {
        if rtt_updated {
            self.latest_rtt = rtt.latest_rtt();
        }

        let acked_bytes: u64 = acked_packets.iter().map(|p| p.bytes).sum();
        let lost_bytes: u64 = lost_packets.iter().map(|p| p.bytes).sum();
        self.stats.bytes_acked_in_total += acked_bytes;
        self.stats.bytes_lost_in_total += lost_bytes;
        self.stats.bytes_in_flight = bytes_in_flight.saturating_sub(acked_bytes + lost_bytes);
    }

    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        sequence_number: u64,
        bytes: u64,
        has_retransmittable_data: bool,
    ) -> bool {
        self.leaky_bucket.add(sent_time, bytes);
        self.stats.bytes_sent_in_total += bytes;
        self.stats.bytes_in_flight = bytes_in_flight + bytes;
        true
    }

    fn time_until_send(
        &self,
        now: Instant,
        bytes_in_flight: u64,
        has_retransmittable_data: bool,
    ) -> Duration {
        // Wait for an ack once a full window is outstanding.
        if bytes_in_flight >= self.congestion_window() {
            return Duration::MAX;
        }
        self.leaky_bucket.time_remaining(now)
    }

    fn bandwidth_estimate(&self) -> Bandwidth {
        self.bitrate
    }

    // TODO: derive from the smoothed RTT and its deviation once the sender
    // tracks them.
    fn retransmission_delay(&self) -> Duration {
        self.latest_rtt * 2
    }

    fn congestion_window(&self) -> u64 {
        // Never less than a packet.
        self.bitrate
            .to_bytes_per_period(WINDOW_SIZE)
            .max(self.max_segment_size)
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

/// Fixed rate receiver, advertising a configured bitrate.
#[derive(Debug, Clone)]
pub struct FixRateReceiver {
    bitrate: Bandwidth,
}

impl FixRateReceiver {
    pub fn new(bitrate: Bandwidth) -> Self {
        Self { bitrate }
    }

    pub fn set_bitrate(&mut self, bitrate: Bandwidth) {
        self.bitrate = bitrate;
    }
}

impl Default for FixRateReceiver {
    fn default() -> Self {
        Self::new(INITIAL_BITRATE)
    }
}

impl ReceiveAlgorithm for FixRateReceiver {
    fn generate_congestion_feedback(&self) -> Option<CongestionFeedback> {
        Some(CongestionFeedback::FixRate {
            bitrate: self.bitrate,
        })
    }
}
