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

//! Loss detection and congestion control building blocks for QUIC.
//!
//! ## Components
//!
//! * **Unacked packet map**: tracks every sent packet until it is acked or
//!   abandoned, the retransmission chains between packets, and the bytes in
//!   flight.
//! * **Loss detection**: a nack counting algorithm with early retransmit, and
//!   a purely time based algorithm, both reporting lost sequence numbers and
//!   a loss detection timeout.
//! * **Congestion control**: a fixed rate sender paced by a leaky bucket, the
//!   matching receivers, and the hybrid slow start exit heuristic.
//! * **Simulator**: a synthetic network model driving any send algorithm, for
//!   tests and experiments.
//! * **Server config rotation**: selection of the primary crypto server
//!   config by primary time and priority.
//!
//! Time is never read from the system clock by the algorithms. Callers pass
//! the current `Instant`, and tests drive a [`MockClock`].

use std::time::Duration;

use crate::congestion_control::CongestionControlAlgorithm;
use crate::congestion_control::CongestionFeedbackType;
use crate::recovery::LossDetectionType;

/// Default maximum size of an outgoing packet.
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 1350;

/// The initial RTT used before any RTT sample is taken.
pub const INITIAL_RTT: Duration = Duration::from_millis(100);

/// Result type for loss recovery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about loss detection and congestion control.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// The maximum size of outgoing packets.
    pub max_segment_size: u64,

    /// The initial rtt, used before real rtt is estimated.
    pub initial_rtt: Duration,

    /// The loss detection algorithm.
    pub loss_detection_type: LossDetectionType,

    /// The congestion control algorithm used by the sender.
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// The type of congestion feedback sent by the receiver.
    pub congestion_feedback_type: CongestionFeedbackType,

    /// The bitrate of the fixed rate algorithms until the peer advertises one.
    pub fix_rate_initial_bitrate: Bandwidth,

    /// The receive window advertised by the tcp receiver.
    pub tcp_receive_window: u64,
}

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            max_segment_size: DEFAULT_MAX_PACKET_SIZE,
            initial_rtt: INITIAL_RTT,
            loss_detection_type: LossDetectionType::Nack,
            congestion_control_algorithm: CongestionControlAlgorithm::FixRate,
            congestion_feedback_type: CongestionFeedbackType::FixRate,
            fix_rate_initial_bitrate: Bandwidth::from_bytes_per_second(100_000),
            tcp_receive_window: 256_000,
        }
    }
}


pub use crate::bandwidth::Bandwidth;
pub use crate::clock::MockClock;
pub use crate::congestion_control::ReceiveAlgorithm;
pub use crate::congestion_control::SendAlgorithm;
pub use crate::crypto_config::ServerConfigRotation;
pub use crate::error::Error;
pub use crate::recovery::LossDetection;
pub use crate::recovery::RttStats;
pub use crate::recovery::UnackedPacketMap;

#[path = "recovery/recovery.rs"]
pub mod recovery;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod bandwidth;
pub mod clock;
pub mod crypto_config;
pub mod error;
