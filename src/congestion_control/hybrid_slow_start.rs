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

//! Hybrid slow start.
//!
//! Slow start doubles the congestion window every round trip and easily
//! overshoots the path capacity. Hybrid slow start leaves slow start early
//! when either the acks of a burst spread out over a good share of the RTT
//! (ack train), or the minimum RTT of a round grows past the long term
//! minimum RTT (delay increase).
//!
//! Rounds are delimited by sequence numbers: a round ends once the last
//! packet sent at the start of the round is acked.

use std::time::Duration;
use std::time::Instant;

use log::*;

/// Slow start is never left below this congestion window, in packets.
pub const LOW_WINDOW: u64 = 16;

/// Number of RTT samples of a round considered for delay increase detection.
pub const MIN_SAMPLES: u32 = 8;

/// The delay increase threshold is `min_rtt >> DELAY_FACTOR_EXP`.
const DELAY_FACTOR_EXP: u32 = 3;

/// Lower bound of the delay increase threshold. Acks closer than this to each
/// other are also considered part of an ack train.
const DELAY_MIN_THRESHOLD: Duration = Duration::from_millis(4);

/// Upper bound of the delay increase threshold.
const DELAY_MAX_THRESHOLD: Duration = Duration::from_millis(16);

/// Which signal, if any, ended slow start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HystartState {
    #[default]
    NotFound,

    /// Acks of the round spread out over at least half the minimum RTT.
    AckTrain,

    /// The round's minimum RTT exceeded the long term minimum RTT.
    Delay,
}

#[derive(Debug)]
pub struct HybridSlowStart {
    /// Whether ack train detection is enabled.
    ack_train_detection: bool,

    /// Whether a round is in progress.
    started: bool,

    /// Exit signal found in the current round.
    found: HystartState,

    /// The last sent sequence number, where an implicit round ends.
    last_sent_sequence_number: u64,

    /// Beginning of the current round.
    round_start: Option<Instant>,

    /// The current round ends once this sequence number is acked.
    end_sequence_number: u64,

    /// Time of the last ack close to its predecessor.
    last_close_ack_pair_time: Option<Instant>,

    /// RTT samples taken in the current round.
    rtt_sample_count: u32,

    /// Minimum of the first `MIN_SAMPLES` RTT samples of the current round.
    current_min_rtt: Duration,
}

impl HybridSlowStart {
    pub fn new() -> Self {
        Self {
            ack_train_detection: true,
            started: false,
            found: HystartState::NotFound,
            last_sent_sequence_number: 0,
            round_start: None,
            end_sequence_number: 0,
            last_close_ack_pair_time: None,
            rtt_sample_count: 0,
            current_min_rtt: Duration::ZERO,
        }
    }

    pub fn set_ack_train_detection(&mut self, ack_train_detection: bool) {
        self.ack_train_detection = ack_train_detection;
    }

    pub fn ack_train_detection(&self) -> bool {
        self.ack_train_detection
    }

    /// Whether a round is in progress.
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn state(&self) -> HystartState {
        self.found
    }

    pub fn on_packet_sent(&mut self, sequence_number: u64) {
        self.last_sent_sequence_number = sequence_number;
    }

    /// End the round once its last packet is acked. Called after
    /// `should_exit_slow_start`, so the next round begins with the next ack.
    pub fn on_packet_acked(&mut self, acked_sequence_number: u64, in_slow_start: bool) {
        if in_slow_start && self.is_end_of_round(acked_sequence_number) {
            self.started = false;
        }
    }

    /// Forget the current round and any exit signal, e.g. after a
    /// retransmission timeout.
    pub fn restart(&mut self) {
        self.started = false;
        self.found = HystartState::NotFound;
    }

    /// Begin a round which ends once `end_sequence_number` is acked.
    pub fn start_receive_round(&mut self, now: Instant, end_sequence_number: u64) {
        debug!(
            "now={:?} hybrid slow start new round end_pn={}",
            now, end_sequence_number
        );
        self.round_start = Some(now);
        self.last_close_ack_pair_time = Some(now);
        self.end_sequence_number = end_sequence_number;
        self.found = HystartState::NotFound;
        self.current_min_rtt = Duration::ZERO;
        self.rtt_sample_count = 0;
        self.started = true;
    }

    /// Whether `ack` ends the current round. Stays true for every later
    /// sequence number until a new round starts.
    pub fn is_end_of_round(&self, ack: u64) -> bool {
        self.end_sequence_number <= ack
    }

    /// Feed an RTT sample taken at `now`, and return whether slow start
    /// should be left. `congestion_window` is in packets.
    pub fn should_exit_slow_start(
        &mut self,
        now: Instant,
        latest_rtt: Duration,
        min_rtt: Duration,
        congestion_window: u64,
    ) -> bool {
        if !self.started {
            self.start_receive_round(now, self.last_sent_sequence_number);
        }
        if self.found != HystartState::NotFound {
            return congestion_window >= LOW_WINDOW;
        }

        let round_start = self.round_start.unwrap_or(now);
        let last_close_ack_pair_time = self.last_close_ack_pair_time.unwrap_or(now);

        // Acks arriving close to each other belong to a train. Once the train
        // spans half the minimum RTT, the packets are spread out more than
        // the path capacity allows.
        if self.ack_train_detection
            && now.saturating_duration_since(last_close_ack_pair_time) <= DELAY_MIN_THRESHOLD
        {
            self.last_close_ack_pair_time = Some(now);
            if now.saturating_duration_since(round_start) >= min_rtt / 2 {
                trace!("now={:?} hybrid slow start found ack train", now);
                self.found = HystartState::AckTrain;
            }
        } else if last_close_ack_pair_time == round_start {
            // The previous ack was not close, move the round start forward.
            self.round_start = Some(now);
            self.last_close_ack_pair_time = Some(now);
        }

        // Only the lowest RTT of the first few samples of the round is
        // compared to the long term minimum.
        self.rtt_sample_count += 1;
        if self.rtt_sample_count <= MIN_SAMPLES
            && (self.current_min_rtt.is_zero() || self.current_min_rtt > latest_rtt)
        {
            self.current_min_rtt = latest_rtt;
        }

        if self.rtt_sample_count == MIN_SAMPLES {
            let threshold = (min_rtt / (1 << DELAY_FACTOR_EXP))
                .clamp(DELAY_MIN_THRESHOLD, DELAY_MAX_THRESHOLD);
            if self.current_min_rtt > min_rtt + threshold {
                trace!(
                    "now={:?} hybrid slow start found delay increase round_min_rtt={:?} min_rtt={:?}",
                    now,
                    self.current_min_rtt,
                    min_rtt
                );
                self.found = HystartState::Delay;
            }
        }

        congestion_window >= LOW_WINDOW && self.found != HystartState::NotFound
    }
}

impl Default for HybridSlowStart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    #[test]
    fn hybrid_slow_start_simple_case() {
        let clock = MockClock::new();
        let mut slow_start = HybridSlowStart::new();
        let mut sequence_number = 1;

        slow_start.start_receive_round(clock.now(), 3);
        assert!(!slow_start.is_end_of_round(sequence_number));
        sequence_number += 1;

        // Duplicates.
        assert!(!slow_start.is_end_of_round(sequence_number));
        assert!(!slow_start.is_end_of_round(sequence_number));
        sequence_number += 1;
        assert!(slow_start.is_end_of_round(sequence_number));
        sequence_number += 1;

        // Latched until a new round starts.
        assert!(slow_start.is_end_of_round(sequence_number));
        assert!(slow_start.is_end_of_round(sequence_number + 100));
        sequence_number += 1;

        slow_start.start_receive_round(clock.now(), 20);
        while sequence_number < 20 {
            assert!(!slow_start.is_end_of_round(sequence_number));
            sequence_number += 1;
        }
        assert!(slow_start.is_end_of_round(sequence_number));
    }

    #[test]
    fn hybrid_slow_start_ack_train() {
        // At a typical RTT of 60ms and acks arriving 1ms apart, a burst of 30
        // packets goes out before the ack train is detected.
        let mut clock = MockClock::new();
        let mut slow_start = HybridSlowStart::new();
        let rtt = Duration::from_millis(60);
        let one_ms = Duration::from_millis(1);
        let mut sequence_number = 2;
        let mut end_sequence_number = 2;

        for _ in 0..5 {
            slow_start.start_receive_round(clock.now(), end_sequence_number);
            loop {
                clock.advance_time(one_ms);
                assert!(!slow_start.should_exit_slow_start(clock.now(), rtt, rtt, 100));
                let end_of_round = slow_start.is_end_of_round(sequence_number);
                sequence_number += 1;
                if end_of_round {
                    break;
                }
            }
            // Exponential growth.
            end_sequence_number *= 2;
        }

        slow_start.start_receive_round(clock.now(), end_sequence_number);
        for _ in 0..29 {
            assert!(!slow_start.is_end_of_round(sequence_number));
            sequence_number += 1;
            clock.advance_time(one_ms);
            assert!(!slow_start.should_exit_slow_start(clock.now(), rtt, rtt, 100));
        }
        clock.advance_time(one_ms);
        assert!(slow_start.should_exit_slow_start(clock.now(), rtt, rtt, 100));
        assert_eq!(slow_start.state(), HystartState::AckTrain);
    }

    #[test]
    fn hybrid_slow_start_delay() {
        // The increase is detected at 1/8 of the RTT above the minimum RTT,
        // 67.5ms for an RTT of 60ms.
        let clock = MockClock::new();
        let mut slow_start = HybridSlowStart::new();
        let rtt = Duration::from_millis(60);
        let mut end_sequence_number = 1;

        // The lowest RTT of the burst equals the long term RTT.
        slow_start.start_receive_round(clock.now(), end_sequence_number);
        end_sequence_number += 1;
        for n in 0..MIN_SAMPLES {
            let latest_rtt = rtt + Duration::from_millis(n as u64);
            assert!(!slow_start.should_exit_slow_start(clock.now(), latest_rtt, rtt, 100));
        }

        // Every sample of this burst is above the threshold.
        slow_start.start_receive_round(clock.now(), end_sequence_number);
        for n in 1..MIN_SAMPLES {
            let latest_rtt = rtt + Duration::from_millis(n as u64 + 8);
            assert!(!slow_start.should_exit_slow_start(clock.now(), latest_rtt, rtt, 100));
        }
        let latest_rtt = rtt + Duration::from_millis(8);
        assert!(slow_start.should_exit_slow_start(clock.now(), latest_rtt, rtt, 100));
        assert_eq!(slow_start.state(), HystartState::Delay);
    }

    #[test]
    fn hybrid_slow_start_small_window() {
        let clock = MockClock::new();
        let mut slow_start = HybridSlowStart::new();
        slow_start.set_ack_train_detection(false);
        assert!(!slow_start.ack_train_detection());

        let rtt = Duration::from_millis(60);
        let latest_rtt = Duration::from_millis(100);
        slow_start.on_packet_sent(10);
        for _ in 0..MIN_SAMPLES {
            assert!(!slow_start.should_exit_slow_start(clock.now(), latest_rtt, rtt, 8));
        }
        assert!(slow_start.started());
        assert_eq!(slow_start.state(), HystartState::Delay);

        // The signal is kept until the window is large enough.
        assert!(slow_start.should_exit_slow_start(clock.now(), latest_rtt, rtt, LOW_WINDOW));

        // The round implicitly ends at the last sent packet.
        slow_start.on_packet_acked(9, true);
        assert!(slow_start.started());
        slow_start.on_packet_acked(10, true);
        assert!(!slow_start.started());

        slow_start.restart();
        assert_eq!(slow_start.state(), HystartState::NotFound);
    }
}
