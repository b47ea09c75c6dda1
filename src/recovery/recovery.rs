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

//! Loss detection over the set of unacked packets.

use core::str::FromStr;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use crate::Error;
use crate::RecoveryConfig;
use crate::Result;
pub use rtt::RttStats;
pub use tcp_loss_algorithm::TcpLossAlgorithm;
pub use time_loss_algorithm::TimeLossAlgorithm;
pub use unacked_packet_map::RetransmittableFrames;
pub use unacked_packet_map::SequenceNumberLength;
pub use unacked_packet_map::SerializedPacket;
pub use unacked_packet_map::TransmissionInfo;
pub use unacked_packet_map::TransmissionType;
pub use unacked_packet_map::UnackedPacketMap;

/// Available loss detection algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum LossDetectionType {
    /// Packets are lost after being nacked a fixed number of times, or by
    /// early retransmit once the last sent packet is acked.
    #[default]
    Nack,

    /// Packets are lost once a multiple of the RTT has elapsed since they
    /// were sent.
    Time,
}

impl FromStr for LossDetectionType {
    type Err = Error;

    fn from_str(name: &str) -> Result<LossDetectionType> {
        if name.eq_ignore_ascii_case("nack") || name.eq_ignore_ascii_case("tcp") {
            Ok(LossDetectionType::Nack)
        } else if name.eq_ignore_ascii_case("time") {
            Ok(LossDetectionType::Time)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Loss detection interfaces shared by different algorithms.
pub trait LossDetection {
    /// Loss detection algorithm type.
    fn loss_detection_type(&self) -> LossDetectionType;

    /// Return the in flight packets up to `largest_observed` which are
    /// considered lost. The caller is expected to have nacked every packet
    /// below `largest_observed` beforehand.
    ///
    /// Every call recomputes the loss timeout.
    fn detect_lost_packets(
        &mut self,
        unacked_packets: &UnackedPacketMap,
        now: Instant,
        largest_observed: u64,
        rtt: &RttStats,
    ) -> BTreeSet<u64>;

    /// Time at which `detect_lost_packets` should be called again, if any.
    fn loss_timeout(&self) -> Option<Instant>;
}

impl fmt::Debug for dyn LossDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss detection {:?}.", self.loss_detection_type())
    }
}

/// Build a loss detection algorithm.
pub fn build_loss_detection(conf: &RecoveryConfig) -> Box<dyn LossDetection> {
    match conf.loss_detection_type {
        LossDetectionType::Nack => Box::new(TcpLossAlgorithm::new()),
        LossDetectionType::Time => Box::new(TimeLossAlgorithm::new()),
    }
}


pub mod rtt;
pub mod tcp_loss_algorithm;
pub mod time_loss_algorithm;
pub mod unacked_packet_map;
