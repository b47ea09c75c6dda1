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

//! Bookkeeping of every packet that has been sent but not yet acknowledged
//! and is still needed for loss detection, RTT measurement or retransmission.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;
use log::*;
use slab::Slab;
use smallvec::smallvec;
use smallvec::SmallVec;

use crate::Error;
use crate::Result;

/// Sequence numbers of all transmissions of one logical packet, in
/// ascending order.
type Chain = SmallVec<[u64; 2]>;

/// Number of bytes used to encode the sequence number on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SequenceNumberLength {
    One = 1,
    Two = 2,
    Four = 4,
    #[default]
    Six = 6,
}

/// Why a packet was transmitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransmissionType {
    #[default]
    NotRetransmission,
    HandshakeRetransmission,
    AllUnackedRetransmission,
    LossRetransmission,
    RtoRetransmission,
    TlpRetransmission,
}

/// Frames of a packet which have to be sent again if the packet is lost.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetransmittableFrames {
    frames: Vec<Bytes>,

    /// Whether the frames carry the crypto handshake.
    crypto_handshake: bool,
}

impl RetransmittableFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames carrying crypto handshake messages.
    pub fn new_handshake() -> Self {
        Self {
            frames: Vec::new(),
            crypto_handshake: true,
        }
    }

    pub fn add_frame(&mut self, frame: Bytes) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn has_crypto_handshake(&self) -> bool {
        self.crypto_handshake
    }
}

/// A packet handed over by the packet creator, not yet sent.
#[derive(Clone, Debug, Default)]
pub struct SerializedPacket {
    pub sequence_number: u64,

    pub sequence_number_length: SequenceNumberLength,

    pub retransmittable_frames: Option<RetransmittableFrames>,
}

impl SerializedPacket {
    pub fn new(
        sequence_number: u64,
        retransmittable_frames: Option<RetransmittableFrames>,
    ) -> Self {
        Self {
            sequence_number,
            sequence_number_length: SequenceNumberLength::default(),
            retransmittable_frames,
        }
    }
}

/// Metadata of one transmission of a packet.
#[derive(Clone)]
pub struct TransmissionInfo {
    pub sequence_number: u64,

    /// Frames to retransmit if this transmission is lost. Only the newest
    /// transmission of a logical packet carries them.
    pub retransmittable_frames: Option<RetransmittableFrames>,

    pub sequence_number_length: SequenceNumberLength,

    /// Set once, when the packet is sent.
    pub sent_time: Option<Instant>,

    /// Bytes counted against the bytes in flight while `in_flight` is set.
    pub bytes_sent: u64,

    /// Number of times a later packet was acked while this one was not.
    pub nack_count: usize,

    pub transmission_type: TransmissionType,

    pub in_flight: bool,

    /// Key of the transmission chain in the chain arena.
    chain: usize,
}

impl TransmissionInfo {
    fn new(
        sequence_number: u64,
        sequence_number_length: SequenceNumberLength,
        retransmittable_frames: Option<RetransmittableFrames>,
        transmission_type: TransmissionType,
        chain: usize,
    ) -> Self {
        Self {
            sequence_number,
            retransmittable_frames,
            sequence_number_length,
            sent_time: None,
            bytes_sent: 0,
            nack_count: 0,
            transmission_type,
            in_flight: false,
            chain,
        }
    }
}

impl std::fmt::Debug for TransmissionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "pn={:?}", self.sequence_number)?;
        write!(f, " in_flight={}", self.in_flight)?;
        write!(f, " bytes_sent={}", self.bytes_sent)?;
        write!(f, " nack_count={}", self.nack_count)?;
        write!(f, " retransmittable={}", self.retransmittable_frames.is_some())?;

        Ok(())
    }
}

/// Unacked packets ordered by sequence number.
///
/// Retransmissions of the same logical packet share a transmission chain, so
/// that an ack for any of them can drop the retransmittable frames of all of
/// them. A transmission is kept until it is neither in flight, nor holding
/// frames, nor part of a chain with other transmissions, and it has been
/// passed by the largest observed sequence number.
pub struct UnackedPacketMap {
    packets: BTreeMap<u64, TransmissionInfo>,

    /// Arena of transmission chains, keyed by `TransmissionInfo::chain`.
    /// A chain is freed when its last member leaves the map.
    chains: Slab<Chain>,

    /// The largest sequence number handed to `add_packet` or
    /// `on_retransmitted_packet`.
    largest_added_packet: u64,

    largest_sent_packet: u64,

    largest_observed: u64,

    /// Sum of `bytes_sent` over the transmissions in flight.
    bytes_in_flight: u64,

    /// Number of transmissions holding crypto handshake frames.
    pending_crypto_packet_count: usize,
}

impl UnackedPacketMap {
    pub fn new() -> Self {
        Self {
            packets: BTreeMap::new(),
            chains: Slab::new(),
            largest_added_packet: 0,
            largest_sent_packet: 0,
            largest_observed: 0,
            bytes_in_flight: 0,
            pending_crypto_packet_count: 0,
        }
    }

    /// Start tracking a new packet. It is not in flight until `set_sent`.
    pub fn add_packet(&mut self, packet: SerializedPacket) -> Result<()> {
        let seq = packet.sequence_number;
        debug_assert!(seq > self.largest_added_packet, "pn={} added out of order", seq);
        if seq <= self.largest_added_packet {
            error!(
                "add_packet pn={} not larger than largest added pn={}",
                seq, self.largest_added_packet
            );
            return Err(Error::PacketOutOfOrder(seq));
        }

        if packet
            .retransmittable_frames
            .as_ref()
            .map_or(false, |f| f.has_crypto_handshake())
        {
            self.pending_crypto_packet_count += 1;
        }

        let chain = self.chains.insert(smallvec![seq]);
        self.packets.insert(
            seq,
            TransmissionInfo::new(
                seq,
                packet.sequence_number_length,
                packet.retransmittable_frames,
                TransmissionType::NotRetransmission,
                chain,
            ),
        );
        self.largest_added_packet = seq;
        Ok(())
    }

    /// Record that `new_seq` retransmits `old_seq`. The frames move to the
    /// new transmission, the old one stays tracked until it or one of its
    /// retransmissions is acked.
    pub fn on_retransmitted_packet(
        &mut self,
        old_seq: u64,
        new_seq: u64,
        transmission_type: TransmissionType,
    ) -> Result<()> {
        debug_assert!(
            new_seq > self.largest_added_packet,
            "retransmission pn={} added out of order",
            new_seq
        );
        debug_assert!(
            self.has_retransmittable_frames(old_seq),
            "pn={} has nothing to retransmit",
            old_seq
        );
        if new_seq <= self.largest_added_packet {
            error!(
                "retransmission pn={} not larger than largest added pn={}",
                new_seq, self.largest_added_packet
            );
            return Err(Error::PacketOutOfOrder(new_seq));
        }

        let old = match self.packets.get_mut(&old_seq) {
            Some(v) => v,
            None => {
                error!("retransmitting pn={} which is not unacked", old_seq);
                return Err(Error::UnknownPacket(old_seq));
            }
        };

        let frames = match old.retransmittable_frames.take() {
            Some(v) => v,
            None => {
                error!("retransmitting pn={} without retransmittable frames", old_seq);
                return Err(Error::NoRetransmittableFrames(old_seq));
            }
        };
        let chain = old.chain;
        let sequence_number_length = old.sequence_number_length;

        self.chains[chain].push(new_seq);
        self.packets.insert(
            new_seq,
            TransmissionInfo::new(
                new_seq,
                sequence_number_length,
                Some(frames),
                transmission_type,
                chain,
            ),
        );
        self.largest_added_packet = new_seq;
        Ok(())
    }

    /// Mark a tracked packet as sent at `sent_time`.
    pub fn set_sent(
        &mut self,
        seq: u64,
        sent_time: Instant,
        bytes_sent: u64,
        set_in_flight: bool,
    ) -> Result<()> {
        debug_assert!(
            self.packets.get(&seq).map_or(false, |i| !i.in_flight),
            "pn={} is unknown or already in flight",
            seq
        );
        let info = match self.packets.get_mut(&seq) {
            Some(v) => v,
            None => {
                error!("set_sent called for pn={} which is not unacked", seq);
                return Err(Error::UnknownPacket(seq));
            }
        };
        if info.in_flight {
            error!("set_sent called for pn={} which is already in flight", seq);
            return Err(Error::PacketAlreadyInFlight(seq));
        }

        self.largest_sent_packet = self.largest_sent_packet.max(seq);
        info.sent_time = Some(sent_time);
        if set_in_flight {
            self.bytes_in_flight += bytes_sent;
            info.bytes_sent = bytes_sent;
            info.in_flight = true;
        }
        Ok(())
    }

    /// Raise the nack count of a packet to at least `min_nacks`.
    pub fn nack_packet(&mut self, seq: u64, min_nacks: usize) -> Result<()> {
        debug_assert!(self.is_unacked(seq), "nack of unknown pn={}", seq);
        match self.packets.get_mut(&seq) {
            Some(info) => {
                info.nack_count = info.nack_count.max(min_nacks);
                Ok(())
            }
            None => {
                error!("nack_packet called for pn={} which is not unacked", seq);
                Err(Error::UnknownPacket(seq))
            }
        }
    }

    /// Stop counting a packet against the bytes in flight, and forget it if
    /// it is no longer needed.
    pub fn remove_from_in_flight(&mut self, seq: u64) -> Result<()> {
        debug_assert!(self.is_unacked(seq), "unknown pn={} removed from flight", seq);
        let info = match self.packets.get_mut(&seq) {
            Some(v) => v,
            None => {
                error!(
                    "remove_from_in_flight called for pn={} which is not unacked",
                    seq
                );
                return Err(Error::UnknownPacket(seq));
            }
        };

        if info.in_flight {
            if self.bytes_in_flight < info.bytes_sent {
                error!(
                    "bytes in flight {} smaller than bytes sent {} of pn={}",
                    self.bytes_in_flight, info.bytes_sent, seq
                );
            }
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(info.bytes_sent);
            info.in_flight = false;
        }

        if self.is_packet_useless(seq) {
            self.erase(seq);
        }
        Ok(())
    }

    /// Drop the retransmittable frames of every transmission of the logical
    /// packet `seq` belongs to, and split the chain apart. Transmissions that
    /// are already observed and not in flight are forgotten.
    pub fn remove_retransmittability(&mut self, seq: u64) {
        let chain = match self.packets.get(&seq) {
            Some(info) => info.chain,
            None => {
                debug!("remove_retransmittability pn={} is not unacked", seq);
                return;
            }
        };

        let members = self.chains.remove(chain);
        for &member in members.iter().rev() {
            let info = match self.packets.get_mut(&member) {
                Some(v) => v,
                None => {
                    error!("chain member pn={} missing from unacked packets", member);
                    continue;
                }
            };

            if let Some(frames) = info.retransmittable_frames.take() {
                if frames.has_crypto_handshake() {
                    self.pending_crypto_packet_count -= 1;
                }
            }

            if member <= self.largest_observed && !info.in_flight {
                self.packets.remove(&member);
            } else {
                info.chain = self.chains.insert(smallvec![member]);
            }
        }
    }

    /// Raise the largest observed sequence number and forget every packet up
    /// to it that is no longer needed.
    pub fn increase_largest_observed(&mut self, largest_observed: u64) -> Result<()> {
        debug_assert!(
            largest_observed > self.largest_observed,
            "largest observed pn={} decreased",
            largest_observed
        );
        if largest_observed <= self.largest_observed {
            error!(
                "largest observed pn={} not larger than current pn={}",
                largest_observed, self.largest_observed
            );
            return Err(Error::InvalidState(format!(
                "largest observed {} <= {}",
                largest_observed, self.largest_observed
            )));
        }
        self.largest_observed = largest_observed;

        let useless: Vec<u64> = self
            .packets
            .range(..=largest_observed)
            .map(|(seq, _)| *seq)
            .filter(|seq| self.is_packet_useless(*seq))
            .collect();
        for seq in useless {
            self.erase(seq);
        }
        Ok(())
    }

    /// Forget up to `num_to_clear` of the oldest packets, stopping at the
    /// first one that is in flight or holds retransmittable frames.
    pub fn clear_previous_retransmissions(&mut self, num_to_clear: usize) {
        let stale: Vec<u64> = self
            .packets
            .values()
            .take_while(|info| !info.in_flight && info.retransmittable_frames.is_none())
            .take(num_to_clear)
            .map(|info| info.sequence_number)
            .collect();

        for seq in stale {
            self.erase(seq);
        }
    }

    /// A packet is useless once it has been passed by the largest observed
    /// packet and nothing (flight, frames, chain) keeps it alive.
    fn is_packet_useless(&self, seq: u64) -> bool {
        match self.packets.get(&seq) {
            Some(info) => {
                seq <= self.largest_observed
                    && !info.in_flight
                    && info.retransmittable_frames.is_none()
                    && self.chains[info.chain].len() == 1
            }
            None => false,
        }
    }

    /// Remove a packet from the map and from its chain, freeing the chain
    /// with its last member.
    fn erase(&mut self, seq: u64) {
        let info = match self.packets.remove(&seq) {
            Some(v) => v,
            None => return,
        };

        if let Some(frames) = info.retransmittable_frames {
            if frames.has_crypto_handshake() {
                self.pending_crypto_packet_count -= 1;
            }
        }

        let chain = &mut self.chains[info.chain];
        chain.retain(|member| *member != seq);
        if chain.is_empty() {
            self.chains.remove(info.chain);
        }
        trace!("erased pn={} from unacked packets", seq);
    }

    pub fn is_unacked(&self, seq: u64) -> bool {
        self.packets.contains_key(&seq)
    }

    pub fn has_retransmittable_frames(&self, seq: u64) -> bool {
        self.packets
            .get(&seq)
            .map_or(false, |info| info.retransmittable_frames.is_some())
    }

    pub fn transmission_info(&self, seq: u64) -> Option<&TransmissionInfo> {
        self.packets.get(&seq)
    }

    /// All transmissions of the logical packet `seq` belongs to.
    pub fn all_transmissions(&self, seq: u64) -> Option<&[u64]> {
        self.packets
            .get(&seq)
            .map(|info| self.chains[info.chain].as_slice())
    }

    /// Iterate over the tracked packets in ascending sequence number order.
    pub fn iter(&self) -> btree_map::Iter<'_, u64, TransmissionInfo> {
        self.packets.iter()
    }

    pub fn largest_sent_packet(&self) -> u64 {
        self.largest_sent_packet
    }

    pub fn largest_observed(&self) -> u64 {
        self.largest_observed
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn has_unacked_packets(&self) -> bool {
        !self.packets.is_empty()
    }

    pub fn has_in_flight_packets(&self) -> bool {
        self.bytes_in_flight > 0
    }

    pub fn has_multiple_in_flight_packets(&self) -> bool {
        self.packets.values().rev().filter(|i| i.in_flight).nth(1).is_some()
    }

    pub fn has_pending_crypto_packets(&self) -> bool {
        self.pending_crypto_packet_count > 0
    }

    pub fn has_unacked_retransmittable_frames(&self) -> bool {
        self.packets
            .values()
            .rev()
            .any(|i| i.in_flight && i.retransmittable_frames.is_some())
    }

    /// The smallest tracked sequence number, or the next sequence number to
    /// be sent if nothing is tracked.
    pub fn least_unacked_sent_packet(&self) -> u64 {
        match self.packets.keys().next() {
            Some(seq) => *seq,
            None => self.largest_sent_packet + 1,
        }
    }

    /// Send time of the most recently sent packet in flight. Callers are
    /// expected to check `has_in_flight_packets` first.
    pub fn last_packet_sent_time(&self) -> Option<Instant> {
        let sent_time = self
            .packets
            .values()
            .rev()
            .find(|i| i.in_flight)
            .and_then(|i| i.sent_time);
        if sent_time.is_none() {
            error!("last_packet_sent_time requires in flight packets");
            debug_assert!(false, "no packet in flight");
        }
        sent_time
    }

    /// Send time of the oldest packet in flight. Callers are expected to
    /// check `has_in_flight_packets` first.
    pub fn first_in_flight_packet_sent_time(&self) -> Option<Instant> {
        let sent_time = self
            .packets
            .values()
            .find(|i| i.in_flight)
            .and_then(|i| i.sent_time);
        if sent_time.is_none() {
            error!("first_in_flight_packet_sent_time requires in flight packets");
            debug_assert!(false, "no packet in flight");
        }
        sent_time
    }

    /// Number of tracked packets which are still needed.
    pub fn num_unacked_packets(&self) -> usize {
        self.packets
            .keys()
            .filter(|seq| !self.is_packet_useless(**seq))
            .count()
    }
}

impl Default for UnackedPacketMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UnackedPacketMap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "unacked={}", self.packets.len())?;
        write!(f, " largest_sent={}", self.largest_sent_packet)?;
        write!(f, " largest_observed={}", self.largest_observed)?;
        write!(f, " inflight={}", self.bytes_in_flight)?;

        Ok(())
    }
}
