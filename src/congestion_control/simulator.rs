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

//! A network simulator for exercising send algorithms.
//!
//! Senders transfer data over a single bottleneck link with a fixed
//! bandwidth and RTT, a bounded buffer and random forward and reverse loss.
//! The simulated receiver acks every second packet, acks immediately when it
//! notices a gap, and otherwise delays an isolated ack. Time is virtual and
//! jumps from one send or ack event to the next.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::rngs::OsRng;
use rand::rngs::StdRng;
use rand::RngCore;
use rand::SeedableRng;
use serde::Deserialize;
use serde::Serialize;

use super::CongestionPacket;
use super::SendAlgorithm;
use crate::clock::MockClock;
use crate::recovery::RttStats;
use crate::Bandwidth;
use crate::Error;
use crate::Result;

/// Size of every simulated packet.
pub const PACKET_SIZE: u64 = 1200;

/// Time waited before probing when neither a send nor an ack is pending.
const TAIL_LOSS_PROBE_DELAY: Duration = Duration::from_millis(100);

/// Source of randomness for simulated losses.
pub enum SimulatorRng {
    /// Seeded generator, reproducing the same losses on every run.
    Deterministic(StdRng),

    /// Operating system randomness.
    System(OsRng),
}

impl SimulatorRng {
    pub fn deterministic(seed: u64) -> Self {
        SimulatorRng::Deterministic(StdRng::seed_from_u64(seed))
    }

    pub fn system() -> Self {
        SimulatorRng::System(OsRng)
    }

    pub fn rand_u64(&mut self) -> u64 {
        match self {
            SimulatorRng::Deterministic(rng) => rng.next_u64(),
            SimulatorRng::System(rng) => rng.next_u64(),
        }
    }

    /// Return true with the given probability.
    fn happens(&mut self, probability: f64) -> bool {
        probability * u64::MAX as f64 > self.rand_u64() as f64
    }
}

impl std::fmt::Debug for SimulatorRng {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SimulatorRng::Deterministic(_) => write!(f, "deterministic"),
            SimulatorRng::System(_) => write!(f, "system"),
        }
    }
}

/// Network model of the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Bottleneck bandwidth.
    pub bandwidth_kbytes_per_second: u64,

    /// Round trip time of the path without queueing.
    pub rtt_ms: u64,

    /// Probability of losing a data packet.
    pub forward_loss_rate: f64,

    /// Probability of losing an ack.
    pub reverse_loss_rate: f64,

    /// Probability of losing a data packet right after a lost one.
    pub loss_correlation: f64,

    /// Bytes the bottleneck buffers before dropping packets.
    pub buffer_size: u64,

    /// Delay of an isolated ack.
    pub delayed_ack_ms: u64,

    /// Seed of the loss generator. System randomness is used if unset.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bandwidth_kbytes_per_second: 1000,
            rtt_ms: 100,
            forward_loss_rate: 0.0,
            reverse_loss_rate: 0.0,
            loss_correlation: 0.0,
            buffer_size: 1_000_000,
            delayed_ack_ms: 100,
            seed: None,
        }
    }
}

/// A send algorithm together with its RTT estimation and the statistics
/// collected while it transfers data.
#[derive(Debug)]
pub struct Sender {
    send_algorithm: Box<dyn SendAlgorithm>,

    rtt_stats: RttStats,

    last_sent: u64,

    last_acked: u64,

    next_acked: u64,

    /// Largest congestion window seen after an ack.
    pub max_cwnd: u64,

    /// Smallest congestion window seen after an ack.
    pub min_cwnd: u64,

    /// Largest decrease of the congestion window between two acks.
    pub max_cwnd_drop: u64,

    pub last_cwnd: u64,

    /// Goodput of the last completed transfer.
    pub last_transfer_bandwidth: Bandwidth,

    /// Share of the packets lost in the last completed transfer.
    pub last_transfer_loss_rate: f64,
}

impl Sender {
    pub fn new(send_algorithm: Box<dyn SendAlgorithm>, rtt_stats: RttStats) -> Self {
        Self {
            send_algorithm,
            rtt_stats,
            last_sent: 0,
            last_acked: 0,
            next_acked: 1,
            max_cwnd: 0,
            min_cwnd: u64::MAX,
            max_cwnd_drop: 0,
            last_cwnd: 0,
            last_transfer_bandwidth: Bandwidth::zero(),
            last_transfer_loss_rate: 0.0,
        }
    }

    pub fn send_algorithm(&self) -> &dyn SendAlgorithm {
        self.send_algorithm.as_ref()
    }

    pub fn send_algorithm_mut(&mut self) -> &mut dyn SendAlgorithm {
        self.send_algorithm.as_mut()
    }

    pub fn rtt_stats(&self) -> &RttStats {
        &self.rtt_stats
    }

    fn record_stats(&mut self) {
        let cwnd = self.send_algorithm.congestion_window();
        self.max_cwnd = self.max_cwnd.max(cwnd);
        self.min_cwnd = self.min_cwnd.min(cwnd);
        if self.last_cwnd > cwnd {
            self.max_cwnd_drop = self.max_cwnd_drop.max(self.last_cwnd - cwnd);
        }
        self.last_cwnd = cwnd;
    }
}

#[derive(Debug)]
struct Transfer {
    id: u64,

    /// Index of the sender in the simulator.
    sender: usize,

    num_bytes: u64,

    bytes_acked: u64,

    bytes_lost: u64,

    bytes_in_flight: u64,

    start_time: Instant,
}

#[derive(Debug)]
struct SentPacket {
    sequence_number: u64,

    send_time: Instant,

    /// Time the packet's ack reaches the sender, ignoring ack delay.
    ack_time: Instant,

    lost: bool,

    /// Id of the transfer the packet belongs to.
    transfer: u64,
}

/// The next event of the simulation. `Duration::MAX` means no event.
#[derive(Debug)]
struct PacketEvent {
    time_delta: Duration,

    /// Index of the pending transfer concerned.
    transfer: Option<usize>,
}

impl PacketEvent {
    fn none() -> Self {
        Self {
            time_delta: Duration::MAX,
            transfer: None,
        }
    }
}

/// Simulated path driving one or more send algorithms.
#[derive(Debug)]
pub struct SendAlgorithmSimulator {
    clock: MockClock,

    rng: SimulatorRng,

    bandwidth: Bandwidth,

    rtt: Duration,

    forward_loss_rate: f64,

    reverse_loss_rate: f64,

    loss_correlation: f64,

    buffer_size: u64,

    delayed_ack_timer: Duration,

    /// Whether the next ack is lost, decided once per ack.
    lose_next_ack: bool,

    senders: Vec<Sender>,

    pending_transfers: Vec<Transfer>,

    /// Packets in the network, in send order.
    sent_packets: VecDeque<SentPacket>,

    next_transfer_id: u64,
}

impl SendAlgorithmSimulator {
    pub fn new(
        clock: MockClock,
        rng: SimulatorRng,
        bandwidth: Bandwidth,
        rtt: Duration,
    ) -> Result<Self> {
        if bandwidth.is_zero() {
            return Err(Error::InvalidConfig("zero bandwidth".into()));
        }

        Ok(Self {
            clock,
            rng,
            bandwidth,
            rtt,
            forward_loss_rate: 0.0,
            reverse_loss_rate: 0.0,
            loss_correlation: 0.0,
            buffer_size: 1_000_000,
            delayed_ack_timer: Duration::from_millis(100),
            lose_next_ack: false,
            senders: Vec::new(),
            pending_transfers: Vec::new(),
            sent_packets: VecDeque::new(),
            next_transfer_id: 0,
        })
    }

    pub fn from_config(clock: MockClock, conf: &SimulatorConfig) -> Result<Self> {
        let rates = [
            conf.forward_loss_rate,
            conf.reverse_loss_rate,
            conf.loss_correlation,
        ];
        if rates.iter().any(|r| !(0.0..1.0).contains(r)) {
            return Err(Error::InvalidConfig("loss rate out of range".into()));
        }

        let rng = match conf.seed {
            Some(seed) => SimulatorRng::deterministic(seed),
            None => SimulatorRng::system(),
        };
        let mut simulator = Self::new(
            clock,
            rng,
            Bandwidth::from_kbytes_per_second(conf.bandwidth_kbytes_per_second),
            Duration::from_millis(conf.rtt_ms),
        )?;
        simulator.set_forward_loss_rate(conf.forward_loss_rate);
        simulator.set_reverse_loss_rate(conf.reverse_loss_rate);
        simulator.set_loss_correlation(conf.loss_correlation);
        simulator.set_buffer_size(conf.buffer_size);
        simulator.set_delayed_ack_timer(Duration::from_millis(conf.delayed_ack_ms));
        Ok(simulator)
    }

    pub fn set_forward_loss_rate(&mut self, loss_rate: f64) {
        self.forward_loss_rate = loss_rate;
    }

    pub fn set_reverse_loss_rate(&mut self, loss_rate: f64) {
        self.reverse_loss_rate = loss_rate;
    }

    pub fn set_loss_correlation(&mut self, loss_correlation: f64) {
        self.loss_correlation = loss_correlation;
    }

    pub fn set_buffer_size(&mut self, buffer_size: u64) {
        self.buffer_size = buffer_size;
    }

    pub fn set_delayed_ack_timer(&mut self, delayed_ack_timer: Duration) {
        self.delayed_ack_timer = delayed_ack_timer;
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Add a sender and return its index.
    pub fn add_sender(&mut self, send_algorithm: Box<dyn SendAlgorithm>) -> usize {
        self.senders
            .push(Sender::new(send_algorithm, RttStats::default()));
        self.senders.len() - 1
    }

    pub fn senders(&self) -> &[Sender] {
        &self.senders
    }

    pub fn sender_mut(&mut self, sender: usize) -> Option<&mut Sender> {
        self.senders.get_mut(sender)
    }

    /// Start transferring `num_bytes` from `sender` now.
    pub fn add_transfer(&mut self, sender: usize, num_bytes: u64) -> Result<()> {
        let now = self.clock.now();
        self.add_transfer_at(sender, num_bytes, now)
    }

    /// Start transferring `num_bytes` from `sender` at `start_time`.
    pub fn add_transfer_at(
        &mut self,
        sender: usize,
        num_bytes: u64,
        start_time: Instant,
    ) -> Result<()> {
        if sender >= self.senders.len() {
            return Err(Error::InvalidState(format!("unknown sender {}", sender)));
        }

        self.pending_transfers.push(Transfer {
            id: self.next_transfer_id,
            sender,
            num_bytes,
            bytes_acked: 0,
            bytes_lost: 0,
            bytes_in_flight: 0,
            start_time,
        });
        self.next_transfer_id += 1;
        Ok(())
    }

    pub fn has_pending_transfers(&self) -> bool {
        !self.pending_transfers.is_empty()
    }

    /// Run until every pending transfer completes.
    pub fn transfer_bytes(&mut self) {
        self.transfer_bytes_limited(u64::MAX, None);
    }

    /// Run until every pending transfer completes, `max_bytes` are sent, or
    /// `max_time` elapses.
    pub fn transfer_bytes_limited(&mut self, max_bytes: u64, max_time: Option<Duration>) {
        let end_time = max_time.map(|d| self.clock.now() + d);
        let mut bytes_sent = 0;

        while !self.pending_transfers.is_empty()
            && end_time.map_or(true, |t| self.clock.now() < t)
            && bytes_sent < max_bytes
        {
            let send_event = self.next_send_event();
            let ack_event = self.next_ack_event();

            if ack_event.time_delta == Duration::MAX && send_event.time_delta == Duration::MAX {
                debug!(
                    "now={:?} nothing to send or ack, simulating a tail loss probe",
                    self.clock.now()
                );
                self.clock.advance_time(TAIL_LOSS_PROBE_DELAY);
                self.send_data_now(0);
            } else if ack_event.time_delta < send_event.time_delta {
                let transfer = match ack_event.transfer {
                    Some(v) => v,
                    None => break,
                };
                self.clock.advance_time(ack_event.time_delta);
                self.handle_pending_ack(transfer);
            } else {
                let transfer = match send_event.transfer {
                    Some(v) => v,
                    None => break,
                };
                self.clock.advance_time(send_event.time_delta);
                self.send_data_now(transfer);
                bytes_sent += PACKET_SIZE;
            }
        }
    }

    fn next_send_event(&self) -> PacketEvent {
        let now = self.clock.now();
        let mut event = PacketEvent::none();

        for (i, transfer) in self.pending_transfers.iter().enumerate() {
            // Enough bytes sent, wait for them to be acked.
            if transfer.bytes_acked + transfer.bytes_in_flight >= transfer.num_bytes {
                continue;
            }

            let time_delta = if now >= transfer.start_time {
                self.senders[transfer.sender].send_algorithm.time_until_send(
                    now,
                    transfer.bytes_in_flight,
                    true,
                )
            } else {
                transfer.start_time - now
            };
            if time_delta < event.time_delta {
                event = PacketEvent {
                    time_delta,
                    transfer: Some(i),
                };
            }
        }

        trace!("now={:?} next send in {:?}", now, event.time_delta);
        event
    }

    fn next_ack_event(&mut self) -> PacketEvent {
        let mut event = PacketEvent::none();
        if self.sent_packets.is_empty() {
            return event;
        }

        for i in 0..self.pending_transfers.len() {
            let time_delta = self.find_next_acked(i);
            if time_delta < event.time_delta {
                event = PacketEvent {
                    time_delta,
                    transfer: Some(i),
                };
            }
        }
        event
    }

    /// Find the next ack the sender of the transfer receives and return the
    /// time until it arrives.
    fn find_next_acked(&mut self, transfer: usize) -> Duration {
        let transfer_id = self.pending_transfers[transfer].id;
        let sender = self.pending_transfers[transfer].sender;

        // Decide whether the next ack is lost only once per ack, so repeated
        // lookups agree.
        if self.senders[sender].next_acked == self.senders[sender].last_acked {
            self.lose_next_ack = self.rng.happens(self.reverse_loss_rate);
        }

        let last_acked = self.senders[sender].last_acked;
        let (mut next_acked, mut ack_delay) = self.find_next_ack(transfer_id, sender, last_acked);
        if self.lose_next_ack {
            (next_acked, ack_delay) = self.find_next_ack(transfer_id, sender, next_acked);
        }
        self.senders[sender].next_acked = next_acked;

        trace!(
            "now={:?} next ack pn={} last_acked={} in {:?}",
            self.clock.now(),
            next_acked,
            last_acked,
            ack_delay
        );
        ack_delay
    }

    /// Find the packet acked by the first ack after `last_acked`, and the
    /// time until that ack arrives.
    fn find_next_ack(&self, transfer_id: u64, sender: usize, last_acked: u64) -> (u64, Duration) {
        let now = self.clock.now();
        let mut next_acked = last_acked;
        let mut ack_delay = Duration::MAX;

        let candidates = self
            .sent_packets
            .iter()
            .filter(|p| p.transfer == transfer_id)
            .filter(|p| p.sequence_number > last_acked && !p.lost);
        for packet in candidates {
            // The delayed ack for the current candidate fires first.
            let packet_ack_delay = packet.ack_time.saturating_duration_since(now);
            if ack_delay < packet_ack_delay {
                break;
            }

            next_acked = packet.sequence_number;
            ack_delay = packet_ack_delay;
            if self.has_recent_lost_packets(transfer_id, sender, next_acked)
                || next_acked - last_acked >= 2
            {
                break;
            }
            ack_delay = ack_delay.saturating_add(self.delayed_ack_timer);
        }

        (next_acked, ack_delay)
    }

    /// Whether the receiver noticed a gap before `next_acked`, which makes it
    /// ack immediately.
    fn has_recent_lost_packets(&self, transfer_id: u64, sender: usize, next_acked: u64) -> bool {
        let mut last_packet = self.senders[sender].last_acked;
        let packets = self
            .sent_packets
            .iter()
            .filter(|p| p.transfer == transfer_id)
            .take_while(|p| p.sequence_number < next_acked);
        for packet in packets {
            if packet.lost {
                return true;
            }
            // Packets dropped by the buffer leave a gap.
            if packet.sequence_number > last_packet + 1 {
                return true;
            }
            last_packet = packet.sequence_number;
        }
        false
    }

    /// Deliver the pending ack of the transfer: every packet up to the next
    /// acked one is either acked or lost.
    fn handle_pending_ack(&mut self, transfer: usize) {
        let now = self.clock.now();
        let transfer_id = self.pending_transfers[transfer].id;
        let sender = &mut self.senders[self.pending_transfers[transfer].sender];

        let mut acked_packets = Vec::new();
        let mut lost_packets = Vec::new();
        let mut largest_observed = None;

        while sender.last_acked < sender.next_acked {
            sender.last_acked += 1;
            let packet = CongestionPacket {
                sequence_number: sender.last_acked,
                bytes: PACKET_SIZE,
            };

            let pos = self
                .sent_packets
                .iter()
                .position(|p| p.transfer == transfer_id);
            let sent = match pos {
                Some(pos) if self.sent_packets[pos].sequence_number == sender.last_acked => {
                    self.sent_packets.remove(pos)
                }
                _ => None,
            };

            match sent {
                Some(sent) => {
                    if sent.lost {
                        lost_packets.push(packet);
                    } else {
                        acked_packets.push(packet);
                    }
                    largest_observed = Some(sent);
                }
                None => {
                    debug!(
                        "now={:?} pn={} dropped by buffer overflow",
                        now, packet.sequence_number
                    );
                    lost_packets.push(packet);
                }
            }
        }

        let rtt_updated = match largest_observed {
            Some(p) => sender.rtt_stats.update_rtt(
                p.ack_time.saturating_duration_since(p.send_time),
                Duration::ZERO,
                now,
            ),
            None => false,
        };

        let transfer_state = &mut self.pending_transfers[transfer];
        sender.send_algorithm.on_congestion_event(
            rtt_updated,
            transfer_state.bytes_in_flight,
            &acked_packets,
            &lost_packets,
            &sender.rtt_stats,
        );

        let acked_bytes = PACKET_SIZE * acked_packets.len() as u64;
        let lost_bytes = PACKET_SIZE * lost_packets.len() as u64;
        if acked_bytes + lost_bytes > transfer_state.bytes_in_flight {
            error!(
                "acked and lost bytes {} exceed bytes in flight {}",
                acked_bytes + lost_bytes,
                transfer_state.bytes_in_flight
            );
        }
        transfer_state.bytes_in_flight = transfer_state
            .bytes_in_flight
            .saturating_sub(acked_bytes + lost_bytes);
        transfer_state.bytes_acked += acked_bytes;
        transfer_state.bytes_lost += lost_bytes;
        sender.record_stats();

        trace!(
            "now={:?} {} ON_ACK acked={} lost={} inflight={} cwnd={}",
            now,
            sender.send_algorithm.name(),
            acked_packets.len(),
            lost_packets.len(),
            transfer_state.bytes_in_flight,
            sender.last_cwnd
        );

        if transfer_state.bytes_acked >= transfer_state.num_bytes {
            let transfer_time = now.saturating_duration_since(transfer_state.start_time);
            let total = transfer_state.bytes_lost + transfer_state.bytes_acked;
            sender.last_transfer_loss_rate = transfer_state.bytes_lost as f64 / total as f64;
            sender.last_transfer_bandwidth =
                Bandwidth::from_bytes_and_time_delta(transfer_state.num_bytes, transfer_time);
            debug!(
                "now={:?} transfer {} done bandwidth={:?} loss_rate={}",
                now, transfer_id, sender.last_transfer_bandwidth, sender.last_transfer_loss_rate
            );

            self.pending_transfers.remove(transfer);
            self.sent_packets.retain(|p| p.transfer != transfer_id);
        }
    }

    fn send_data_now(&mut self, transfer: usize) {
        let now = self.clock.now();
        let transfer_state = match self.pending_transfers.get_mut(transfer) {
            Some(v) => v,
            None => return,
        };
        let sender = &mut self.senders[transfer_state.sender];

        sender.last_sent += 1;
        trace!(
            "now={:?} {} ON_SENT pn={} inflight={}",
            now,
            sender.send_algorithm.name(),
            sender.last_sent,
            transfer_state.bytes_in_flight
        );
        sender.send_algorithm.on_packet_sent(
            now,
            transfer_state.bytes_in_flight,
            sender.last_sent,
            PACKET_SIZE,
            true,
        );

        if (self.sent_packets.len() as u64) * PACKET_SIZE < self.buffer_size {
            let mut lost = self.rng.happens(self.forward_loss_rate);
            if let Some(last) = self.sent_packets.back() {
                if last.lost && self.rng.happens(self.loss_correlation) {
                    lost = true;
                }
            }
            if lost {
                debug!("now={:?} pn={} lost randomly", now, sender.last_sent);
            }

            // Below the bandwidth delay product packets are not queued.
            let bdp = self.bandwidth.to_bytes_per_period(self.rtt);
            let mut ack_time = now + self.rtt;
            if PACKET_SIZE > bdp {
                ack_time += self.bandwidth.transfer_time(PACKET_SIZE - bdp);
            }
            if let Some(last) = self.sent_packets.back() {
                let queue_ack_time = last.ack_time + self.bandwidth.transfer_time(PACKET_SIZE);
                ack_time = ack_time.max(queue_ack_time);
            }

            self.sent_packets.push_back(SentPacket {
                sequence_number: sender.last_sent,
                send_time: now,
                ack_time,
                lost,
                transfer: transfer_state.id,
            });
        } else {
            debug!("now={:?} pn={} lost, buffer full", now, sender.last_sent);
        }

        transfer_state.bytes_in_flight += PACKET_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::CongestionFeedback;
    use crate::congestion_control::FixRateSender;

    fn fix_rate_sender(kbytes_per_second: u64) -> Box<dyn SendAlgorithm> {
        let mut sender = FixRateSender::default();
        let feedback = CongestionFeedback::FixRate {
            bitrate: Bandwidth::from_kbytes_per_second(kbytes_per_second),
        };
        assert!(sender
            .on_incoming_congestion_feedback(&feedback, Instant::now())
            .is_ok());
        Box::new(sender)
    }

    #[test]
    fn fix_rate_transfer() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        // The 3000 bytes window covers the round trip, so pacing limits.
        let conf = SimulatorConfig {
            rtt_ms: 2,
            seed: Some(1),
            ..SimulatorConfig::default()
        };
        let mut simulator = SendAlgorithmSimulator::from_config(MockClock::new(), &conf)?;
        let sender = simulator.add_sender(fix_rate_sender(300));

        // 250 packets paced 4ms apart.
        simulator.add_transfer(sender, 300_000)?;
        simulator.transfer_bytes();
        assert!(!simulator.has_pending_transfers());

        let stats = &simulator.senders()[sender];
        let goodput = stats.last_transfer_bandwidth.to_kbytes_per_second();
        assert!((290..=310).contains(&goodput), "goodput {}KB/s", goodput);
        assert_eq!(stats.last_transfer_loss_rate, 0.0);
        assert_eq!(stats.max_cwnd, 3000);
        assert_eq!(stats.min_cwnd, 3000);
        assert_eq!(stats.max_cwnd_drop, 0);
        assert_eq!(stats.rtt_stats().min_rtt(), Duration::from_millis(2));
        assert_eq!(stats.send_algorithm().stats().bytes_lost_in_total, 0);

        Ok(())
    }

    #[test]
    fn fix_rate_transfer_limited_by_window() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let conf = SimulatorConfig {
            seed: Some(1),
            ..SimulatorConfig::default()
        };
        let mut simulator = SendAlgorithmSimulator::from_config(MockClock::new(), &conf)?;
        let sender = simulator.add_sender(fix_rate_sender(300));

        // Three packets fill the 3000 bytes window, then the sender waits
        // for the ack of the first pair, 100ms later.
        simulator.add_transfer(sender, 300_000)?;
        simulator.transfer_bytes_limited(u64::MAX, Some(Duration::from_millis(50)));
        assert_eq!(
            simulator.senders()[sender]
                .send_algorithm()
                .stats()
                .bytes_sent_in_total,
            3 * PACKET_SIZE
        );

        simulator.transfer_bytes();
        assert!(!simulator.has_pending_transfers());
        let goodput = simulator.senders()[sender]
            .last_transfer_bandwidth
            .to_kbytes_per_second();
        assert!(goodput < 100, "goodput {}KB/s", goodput);

        Ok(())
    }

    #[test]
    fn delayed_ack_of_single_packet() -> Result<()> {
        let clock = MockClock::new();
        let start = clock.now();
        let mut simulator = SendAlgorithmSimulator::new(
            clock,
            SimulatorRng::deterministic(7),
            Bandwidth::from_kbytes_per_second(1000),
            Duration::from_millis(100),
        )?;
        let sender = simulator.add_sender(fix_rate_sender(100));

        simulator.add_transfer(sender, PACKET_SIZE)?;
        simulator.transfer_bytes();

        // The isolated ack is held back by the delayed ack timer.
        assert_eq!(simulator.now() - start, Duration::from_millis(200));
        assert_eq!(
            simulator.senders()[sender].last_transfer_bandwidth,
            Bandwidth::from_bytes_and_time_delta(PACKET_SIZE, Duration::from_millis(200))
        );

        Ok(())
    }

    #[test]
    fn fix_rate_transfer_with_forward_loss() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let conf = SimulatorConfig {
            forward_loss_rate: 0.1,
            seed: Some(0x1234),
            ..SimulatorConfig::default()
        };
        let mut simulator = SendAlgorithmSimulator::from_config(MockClock::new(), &conf)?;
        let sender = simulator.add_sender(fix_rate_sender(300));

        simulator.add_transfer(sender, 300_000)?;
        simulator.transfer_bytes_limited(u64::MAX, Some(Duration::from_secs(60)));
        assert!(!simulator.has_pending_transfers());

        let stats = &simulator.senders()[sender];
        assert!(stats.last_transfer_loss_rate > 0.0);
        assert!(stats.last_transfer_loss_rate < 0.3);
        assert!(stats.send_algorithm().stats().bytes_lost_in_total > 0);

        Ok(())
    }

    #[test]
    fn limited_transfer_stops_early() -> Result<()> {
        let conf = SimulatorConfig {
            seed: Some(3),
            ..SimulatorConfig::default()
        };
        let mut simulator = SendAlgorithmSimulator::from_config(MockClock::new(), &conf)?;
        let sender = simulator.add_sender(fix_rate_sender(300));

        simulator.add_transfer(sender, 300_000)?;
        simulator.transfer_bytes_limited(10 * PACKET_SIZE, None);
        assert!(simulator.has_pending_transfers());
        assert_eq!(
            simulator.senders()[sender]
                .send_algorithm()
                .stats()
                .bytes_sent_in_total,
            10 * PACKET_SIZE
        );

        Ok(())
    }

    #[test]
    fn simulator_config() -> Result<()> {
        let conf: SimulatorConfig =
            serde_json::from_str(r#"{"rtt_ms": 50, "forward_loss_rate": 0.05, "seed": 7}"#)
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        assert_eq!(conf.rtt_ms, 50);
        assert_eq!(conf.forward_loss_rate, 0.05);
        assert_eq!(conf.seed, Some(7));
        assert_eq!(conf.bandwidth_kbytes_per_second, 1000);
        assert_eq!(conf.buffer_size, 1_000_000);

        let bad = SimulatorConfig {
            reverse_loss_rate: 1.5,
            ..SimulatorConfig::default()
        };
        assert!(SendAlgorithmSimulator::from_config(MockClock::new(), &bad).is_err());

        let zero = SimulatorConfig {
            bandwidth_kbytes_per_second: 0,
            ..SimulatorConfig::default()
        };
        assert!(SendAlgorithmSimulator::from_config(MockClock::new(), &zero).is_err());

        let mut rng = SimulatorRng::deterministic(42);
        let mut same = SimulatorRng::deterministic(42);
        assert_eq!(rng.rand_u64(), same.rand_u64());
        assert!(!rng.happens(0.0));
        assert_eq!(format!("{:?}", SimulatorRng::system()), "system");

        Ok(())
    }

    #[test]
    fn add_transfer_for_unknown_sender() -> Result<()> {
        let mut simulator = SendAlgorithmSimulator::from_config(
            MockClock::new(),
            &SimulatorConfig::default(),
        )?;
        assert!(simulator.add_transfer(0, 1000).is_err());
        assert!(simulator.sender_mut(0).is_none());

        Ok(())
    }
}
