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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use crate::recovery::RttStats;
use crate::Bandwidth;
use crate::Error;
use crate::RecoveryConfig;
use crate::Result;
pub use fix_rate::FixRateReceiver;
pub use fix_rate::FixRateSender;
pub use hybrid_slow_start::HybridSlowStart;
pub use hybrid_slow_start::HystartState;
pub use leaky_bucket::LeakyBucket;
pub use tcp_receiver::TcpReceiver;

/// Available congestion control algorithm
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// Send at the fixed rate advertised by the peer, paced by a leaky
    /// bucket.
    #[default]
    FixRate,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("fixrate") || algor.eq_ignore_ascii_case("fix_rate") {
            Ok(CongestionControlAlgorithm::FixRate)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Type of the congestion feedback a receiver sends to its peer.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionFeedbackType {
    /// The receive window, as TCP does.
    Tcp,

    /// The bitrate the sender should use.
    #[default]
    FixRate,
}

impl FromStr for CongestionFeedbackType {
    type Err = Error;

    fn from_str(name: &str) -> Result<CongestionFeedbackType> {
        if name.eq_ignore_ascii_case("tcp") {
            Ok(CongestionFeedbackType::Tcp)
        } else if name.eq_ignore_ascii_case("fixrate") || name.eq_ignore_ascii_case("fix_rate") {
            Ok(CongestionFeedbackType::FixRate)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion feedback carried from the receiver to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionFeedback {
    Tcp { receive_window: u64 },

    FixRate { bitrate: Bandwidth },
}

impl CongestionFeedback {
    pub fn feedback_type(&self) -> CongestionFeedbackType {
        match self {
            CongestionFeedback::Tcp { .. } => CongestionFeedbackType::Tcp,
            CongestionFeedback::FixRate { .. } => CongestionFeedbackType::FixRate,
        }
    }
}

/// A packet acked or lost in a congestion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionPacket {
    pub sequence_number: u64,

    pub bytes: u64,
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Bytes in flight.
    pub bytes_in_flight: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,
}

/// Sender side congestion control interfaces shared by different algorithms.
pub trait SendAlgorithm {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Process congestion feedback received from the peer at `now`. Feedback
    /// the algorithm does not understand is rejected and otherwise ignored.
    fn on_incoming_congestion_feedback(
        &mut self,
        feedback: &CongestionFeedback,
        now: Instant,
    ) -> Result<()>;

    /// Process the packets acked and lost by an incoming ack. `rtt_updated`
    /// tells whether the ack produced a new RTT sample in `rtt`.
    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        bytes_in_flight: u64,
        acked_packets: &[CongestionPacket],
        lost_packets: &[CongestionPacket],
        rtt: &RttStats,
    );

    /// Callback after packet was sent out. Return whether the packet counts
    /// against the congestion window.
    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        sequence_number: u64,
        bytes: u64,
        has_retransmittable_data: bool,
    ) -> bool;

    /// Called when the retransmission timer fires.
    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {}

    /// Called when the last retransmission timeout was spurious.
    fn revert_retransmission_timeout(&mut self) {}

    /// Delay before the next packet may be sent, `Duration::MAX` if sending
    /// is blocked.
    fn time_until_send(
        &self,
        now: Instant,
        bytes_in_flight: u64,
        has_retransmittable_data: bool,
    ) -> Duration;

    /// Current estimate of the available bandwidth.
    fn bandwidth_estimate(&self) -> Bandwidth;

    /// Delay before retransmitting unacked packets.
    fn retransmission_delay(&self) -> Duration;

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        false
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn SendAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send algorithm {}.", self.name())
    }
}

/// Receiver side congestion control interfaces.
pub trait ReceiveAlgorithm {
    /// Feedback to send to the peer, if any.
    fn generate_congestion_feedback(&self) -> Option<CongestionFeedback>;

    /// Called for every packet received.
    fn record_incoming_packet(&mut self, bytes: u64, sequence_number: u64, timestamp: Instant) {}
}

impl fmt::Debug for dyn ReceiveAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receive algorithm.")
    }
}

/// Build a send algorithm.
pub fn build_send_algorithm(conf: &RecoveryConfig) -> Box<dyn SendAlgorithm> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::FixRate => Box::new(FixRateSender::new(
            conf.fix_rate_initial_bitrate,
            conf.max_segment_size,
        )),
    }
}

/// Build a receive algorithm.
pub fn build_receive_algorithm(conf: &RecoveryConfig) -> Box<dyn ReceiveAlgorithm> {
    match conf.congestion_feedback_type {
        CongestionFeedbackType::Tcp => Box::new(TcpReceiver::new(conf.tcp_receive_window)),
        CongestionFeedbackType::FixRate => {
            Box::new(FixRateReceiver::new(conf.fix_rate_initial_bitrate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("fixrate", Ok(CongestionControlAlgorithm::FixRate)),
            ("FixRate", Ok(CongestionControlAlgorithm::FixRate)),
            ("FIX_RATE", Ok(CongestionControlAlgorithm::FixRate)),
            ("cubic", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn congestion_feedback_name() {
        let cases = [
            ("tcp", Ok(CongestionFeedbackType::Tcp)),
            ("TCP", Ok(CongestionFeedbackType::Tcp)),
            ("fixrate", Ok(CongestionFeedbackType::FixRate)),
            ("fix_rate", Ok(CongestionFeedbackType::FixRate)),
            ("inter_arrival", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, ty) in cases {
            assert_eq!(CongestionFeedbackType::from_str(name), ty);
        }
    }

    #[test]
    fn build_from_config() {
        let mut conf = RecoveryConfig::default();

        let sender = build_send_algorithm(&conf);
        assert_eq!(sender.name(), "FIXRATE");
        assert_eq!(sender.bandwidth_estimate(), conf.fix_rate_initial_bitrate);
        assert!(!sender.in_slow_start());
        assert_eq!(format!("{:?}", sender), "send algorithm FIXRATE.");

        let receiver = build_receive_algorithm(&conf);
        assert_eq!(
            receiver.generate_congestion_feedback(),
            Some(CongestionFeedback::FixRate {
                bitrate: conf.fix_rate_initial_bitrate
            })
        );

        conf.congestion_feedback_type = CongestionFeedbackType::Tcp;
        let receiver = build_receive_algorithm(&conf);
        let feedback = receiver.generate_congestion_feedback();
        assert_eq!(
            feedback,
            Some(CongestionFeedback::Tcp {
                receive_window: conf.tcp_receive_window
            })
        );
        assert_eq!(
            feedback.map(|f| f.feedback_type()),
            Some(CongestionFeedbackType::Tcp)
        );
    }
}

mod fix_rate;
mod hybrid_slow_start;
mod leaky_bucket;
pub mod simulator;
mod tcp_receiver;
