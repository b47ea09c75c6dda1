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
use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::rtt::RttStats;
use super::unacked_packet_map::UnackedPacketMap;
use super::LossDetection;
use super::LossDetectionType;

/// A packet is lost this many RTTs after it was sent, regardless of how many
/// times it was nacked.
pub const LOSS_DELAY_MULTIPLIER: f64 = 1.25;

/// Lower bound of the loss delay.
pub const MIN_LOSS_DELAY: Duration = Duration::from_millis(5);

/// Time based loss detection.
#[derive(Debug, Default)]
pub struct TimeLossAlgorithm {
    loss_detection_timeout: Option<Instant>,
}

impl TimeLossAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LossDetection for TimeLossAlgorithm {
    fn loss_detection_type(&self) -> LossDetectionType {
        LossDetectionType::Time
    }

    fn detect_lost_packets(
        &mut self,
        unacked_packets: &UnackedPacketMap,
        now: Instant,
        largest_observed: u64,
        rtt: &RttStats,
    ) -> BTreeSet<u64> {
        let mut lost_packets = BTreeSet::new();
        self.loss_detection_timeout = None;

        let loss_delay = cmp::max(
            MIN_LOSS_DELAY,
            rtt.max_of_smoothed_and_latest()
                .mul_f64(LOSS_DELAY_MULTIPLIER),
        );

        let unacked_iter = unacked_packets
            .iter()
            .take_while(|(seq, _)| **seq <= largest_observed)
            .filter(|(_, info)| info.in_flight);
        for (&seq, info) in unacked_iter {
            if info.nack_count == 0 {
                error!("pn={} below largest observed but never nacked", seq);
            }

            let sent_time = match info.sent_time {
                Some(v) => v,
                None => continue,
            };

            // Packets are sent in order, so no later packet can be lost yet.
            let when_lost = sent_time + loss_delay;
            if now < when_lost {
                self.loss_detection_timeout = Some(when_lost);
                break;
            }

            trace!(
                "now={:?} {:?} ON_LOST pn={} sent_time={:?}",
                now,
                self.loss_detection_type(),
                seq,
                sent_time
            );
            lost_packets.insert(seq);
        }

        lost_packets
    }

    fn loss_timeout(&self) -> Option<Instant> {
        self.loss_detection_timeout
    }
}
