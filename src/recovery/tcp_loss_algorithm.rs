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

use std::collections::BTreeSet;
use std::time::Instant;

use log::*;

use super::rtt::RttStats;
use super::unacked_packet_map::UnackedPacketMap;
use super::LossDetection;
use super::LossDetectionType;

/// A packet is lost once this many later packets were acked before it.
pub const NUMBER_OF_NACKS_BEFORE_RETRANSMISSION: usize = 3;

/// Early retransmit declares a packet lost this many smoothed RTTs after it
/// was sent.
pub const EARLY_RETRANSMIT_LOSS_DELAY_MULTIPLIER: f64 = 1.25;

/// TCP style loss detection: a nack threshold as in fast retransmit, plus a
/// timer protected early retransmit (RFC 5827) once the most recently sent
/// packet has been acked.
#[derive(Debug, Default)]
pub struct TcpLossAlgorithm {
    loss_detection_timeout: Option<Instant>,
}

impl TcpLossAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LossDetection for TcpLossAlgorithm {
    fn loss_detection_type(&self) -> LossDetectionType {
        LossDetectionType::Nack
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

        let loss_delay = rtt
            .smoothed_rtt()
            .mul_f64(EARLY_RETRANSMIT_LOSS_DELAY_MULTIPLIER);
        let early_retransmit = unacked_packets.largest_sent_packet() == largest_observed;

        let unacked_iter = unacked_packets
            .iter()
            .take_while(|(seq, _)| **seq <= largest_observed)
            .filter(|(_, info)| info.in_flight);
        for (&seq, info) in unacked_iter {
            if info.nack_count == 0 {
                error!("pn={} below largest observed but never nacked", seq);
            }

            if info.nack_count >= NUMBER_OF_NACKS_BEFORE_RETRANSMISSION {
                trace!(
                    "now={:?} {:?} ON_LOST pn={} nack_count={}",
                    now,
                    self.loss_detection_type(),
                    seq,
                    info.nack_count
                );
                lost_packets.insert(seq);
                continue;
            }

            // Early retransmit only applies once the last sent packet is acked
            // and data is still outstanding.
            if info.retransmittable_frames.is_none() || !early_retransmit {
                continue;
            }

            let sent_time = match info.sent_time {
                Some(v) => v,
                None => continue,
            };
            let when_lost = sent_time + loss_delay;
            if now >= when_lost {
                trace!(
                    "now={:?} {:?} ON_LOST pn={} early retransmit",
                    now,
                    self.loss_detection_type(),
                    seq
                );
                lost_packets.insert(seq);
            } else {
                // Only the earliest candidate arms the timer.
                self.loss_detection_timeout = Some(when_lost);
                break;
            }
        }

        lost_packets
    }

    fn loss_timeout(&self) -> Option<Instant> {
        self.loss_detection_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::recovery::unacked_packet_map::RetransmittableFrames;
    use crate::recovery::unacked_packet_map::SerializedPacket;
    use crate::Result;
    use std::time::Duration;

    const DEFAULT_LENGTH: u64 = 1000;

    struct TestContext {
        unacked_packets: UnackedPacketMap,
        algorithm: TcpLossAlgorithm,
        rtt: RttStats,
        clock: MockClock,
    }

    impl TestContext {
        fn new() -> Self {
            let clock = MockClock::new();
            let mut rtt = RttStats::default();
            rtt.update_rtt(Duration::from_millis(100), Duration::ZERO, clock.now());
            Self {
                unacked_packets: UnackedPacketMap::new(),
                algorithm: TcpLossAlgorithm::new(),
                rtt,
                clock,
            }
        }

        fn send_data_packet(&mut self, seq: u64) -> Result<()> {
            let packet = SerializedPacket::new(seq, Some(RetransmittableFrames::new()));
            self.unacked_packets.add_packet(packet)?;
            self.unacked_packets
                .set_sent(seq, self.clock.now(), DEFAULT_LENGTH, true)
        }

        fn verify_losses(&mut self, largest_observed: u64, expected: &[u64]) -> Result<()> {
            if largest_observed > self.unacked_packets.largest_observed() {
                self.unacked_packets
                    .increase_largest_observed(largest_observed)?;
            }
            let lost = self.algorithm.detect_lost_packets(
                &self.unacked_packets,
                self.clock.now(),
                largest_observed,
                &self.rtt,
            );
            assert_eq!(lost.into_iter().collect::<Vec<_>>(), expected);
            Ok(())
        }
    }

    #[test]
    fn nack_retransmit_1_packet() -> Result<()> {
        let mut t = TestContext::new();
        for seq in 1..=5 {
            t.send_data_packet(seq)?;
        }

        // No loss on one ack.
        t.unacked_packets.remove_from_in_flight(2)?;
        t.unacked_packets.nack_packet(1, 1)?;
        t.verify_losses(2, &[])?;

        // No loss on two acks.
        t.unacked_packets.remove_from_in_flight(3)?;
        t.unacked_packets.nack_packet(1, 2)?;
        t.verify_losses(3, &[])?;

        // Loss on three acks.
        t.unacked_packets.remove_from_in_flight(4)?;
        t.unacked_packets.nack_packet(1, 3)?;
        t.verify_losses(4, &[1])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        Ok(())
    }

    #[test]
    fn nack_retransmit_with_single_ack() -> Result<()> {
        let mut t = TestContext::new();
        for seq in 1..=10 {
            t.send_data_packet(seq)?;
        }

        // One ack of packet 4 after 1 to 3 went missing, as seen with FACK.
        t.unacked_packets.remove_from_in_flight(4)?;
        for seq in 1..=3 {
            t.unacked_packets.nack_packet(seq, 3)?;
        }
        t.verify_losses(4, &[1, 2, 3])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        Ok(())
    }

    #[test]
    fn early_retransmit_1_packet() -> Result<()> {
        let mut t = TestContext::new();
        for seq in 1..=2 {
            t.send_data_packet(seq)?;
        }

        // Early retransmit when the final packet gets acked and the first is
        // nacked.
        t.unacked_packets.remove_from_in_flight(2)?;
        t.unacked_packets.nack_packet(1, 1)?;
        t.verify_losses(2, &[])?;
        let loss_delay = t
            .rtt
            .smoothed_rtt()
            .mul_f64(EARLY_RETRANSMIT_LOSS_DELAY_MULTIPLIER);
        assert_eq!(t.algorithm.loss_timeout(), Some(t.clock.now() + loss_delay));

        t.clock.advance_time(loss_delay);
        t.verify_losses(2, &[1])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        Ok(())
    }

    #[test]
    fn early_retransmit_all_packets() -> Result<()> {
        let mut t = TestContext::new();
        let srtt = t.rtt.smoothed_rtt();
        for seq in 1..=5 {
            t.send_data_packet(seq)?;
            // Advance the time 1/4 RTT between 3 and 4.
            if seq == 3 {
                t.clock.advance_time(srtt / 4);
            }
        }

        // Early retransmit when the final packet gets acked and 1.25 RTTs
        // have elapsed since the packets were sent.
        t.unacked_packets.remove_from_in_flight(5)?;
        for seq in 1..=4 {
            t.unacked_packets.nack_packet(seq, 5 - seq as usize)?;
        }
        t.verify_losses(5, &[1, 2])?;

        // The timer is armed 1.25 RTTs after packet 3, not packet 4.
        assert_eq!(t.algorithm.loss_timeout(), Some(t.clock.now() + srtt));
        t.unacked_packets.remove_from_in_flight(1)?;
        t.unacked_packets.remove_from_in_flight(2)?;

        t.clock.advance_time(srtt);
        t.verify_losses(5, &[3])?;
        assert_eq!(t.algorithm.loss_timeout(), Some(t.clock.now() + srtt / 4));
        t.unacked_packets.remove_from_in_flight(3)?;

        t.clock.advance_time(srtt / 4);
        t.verify_losses(5, &[4])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        Ok(())
    }

    #[test]
    fn stretch_ack_of_last_packet() -> Result<()> {
        let mut t = TestContext::new();
        let start = t.clock.now();
        for seq in 1..=10 {
            t.send_data_packet(seq)?;
            t.clock.advance_time(Duration::from_millis(5));
        }

        // A single ack of packet 10 nacks 1 to 9 once.
        t.unacked_packets.remove_from_in_flight(10)?;
        for seq in 1..=9 {
            t.unacked_packets.nack_packet(seq, 1)?;
        }
        t.verify_losses(10, &[])?;
        let loss_delay = t
            .rtt
            .smoothed_rtt()
            .mul_f64(EARLY_RETRANSMIT_LOSS_DELAY_MULTIPLIER);
        assert_eq!(t.algorithm.loss_timeout(), Some(start + loss_delay));

        t.clock.advance_time(start + loss_delay - t.clock.now());
        t.verify_losses(10, &[1])?;
        assert_eq!(
            t.algorithm.loss_timeout(),
            Some(start + Duration::from_millis(5) + loss_delay)
        );

        Ok(())
    }

    #[test]
    fn dont_early_retransmit_without_retransmittable_frames() -> Result<()> {
        let mut t = TestContext::new();
        t.unacked_packets.add_packet(SerializedPacket::new(1, None))?;
        t.unacked_packets
            .set_sent(1, t.clock.now(), DEFAULT_LENGTH, true)?;
        t.send_data_packet(2)?;

        t.unacked_packets.remove_from_in_flight(2)?;
        t.unacked_packets.nack_packet(1, 1)?;
        t.verify_losses(2, &[])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        t.clock.advance_time(t.rtt.smoothed_rtt() * 2);
        t.verify_losses(2, &[])?;

        Ok(())
    }

    #[test]
    fn packets_after_largest_observed_are_never_lost() -> Result<()> {
        let mut t = TestContext::new();
        for seq in 1..=10 {
            t.send_data_packet(seq)?;
        }
        t.unacked_packets.remove_from_in_flight(5)?;
        for seq in 1..=4 {
            t.unacked_packets.nack_packet(seq, 4)?;
        }
        for seq in 6..=10 {
            t.unacked_packets.nack_packet(seq, 10)?;
        }

        t.clock.advance_time(Duration::from_secs(10));
        t.verify_losses(5, &[1, 2, 3, 4])?;
        assert_eq!(t.algorithm.loss_timeout(), None);

        Ok(())
    }
}
