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

#![no_main]

use std::time::Duration;
use std::time::Instant;

use libfuzzer_sys::fuzz_target;

use quic_recovery::recovery::RetransmittableFrames;
use quic_recovery::recovery::SerializedPacket;
use quic_recovery::recovery::TransmissionType;
use quic_recovery::UnackedPacketMap;

// Every input byte pair is an operation and its argument.
fuzz_target!(|data: &[u8]| {
    let mut unacked_packets = UnackedPacketMap::new();
    let mut now = Instant::now();
    let mut next_seq = 1;

    for op in data.chunks_exact(2) {
        let arg = op[1] as u64;
        let seq = unacked_packets.least_unacked_sent_packet() + arg % 8;

        // Only calls honouring the map contract are issued.
        match op[0] % 8 {
            0 => {
                let frames = (arg % 2 == 0).then(RetransmittableFrames::new);
                let _ = unacked_packets.add_packet(SerializedPacket::new(next_seq, frames));
                let _ = unacked_packets.set_sent(next_seq, now, arg + 1, arg % 3 != 0);
                next_seq += 1;
            }
            1 if unacked_packets.has_retransmittable_frames(seq) => {
                let _ = unacked_packets.on_retransmitted_packet(
                    seq,
                    next_seq,
                    TransmissionType::LossRetransmission,
                );
                let _ = unacked_packets.set_sent(next_seq, now, 1200, true);
                next_seq += 1;
            }
            2 if unacked_packets.is_unacked(seq) => {
                let _ = unacked_packets.nack_packet(seq, (arg % 4) as usize);
            }
            3 if unacked_packets.is_unacked(seq) => {
                let _ = unacked_packets.remove_from_in_flight(seq);
            }
            4 => unacked_packets.remove_retransmittability(seq),
            5 if seq > unacked_packets.largest_observed() => {
                let _ = unacked_packets.increase_largest_observed(seq);
            }
            6 => unacked_packets.clear_previous_retransmissions(arg as usize % 4),
            7 => now += Duration::from_millis(arg),
            _ => {}
        }

        if unacked_packets.has_in_flight_packets() {
            assert!(unacked_packets.first_in_flight_packet_sent_time().is_some());
        }

        let in_flight: u64 = unacked_packets
            .iter()
            .filter(|(_, info)| info.in_flight)
            .map(|(_, info)| info.bytes_sent)
            .sum();
        assert_eq!(unacked_packets.bytes_in_flight(), in_flight);
    }
});
