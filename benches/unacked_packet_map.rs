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

use std::time::Duration;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use quic_recovery::recovery::build_loss_detection;
use quic_recovery::recovery::RetransmittableFrames;
use quic_recovery::recovery::SerializedPacket;
use quic_recovery::RecoveryConfig;
use quic_recovery::RttStats;
use quic_recovery::UnackedPacketMap;

const RANGE: u64 = 10_000;

fn sent_packets(now: Instant) -> UnackedPacketMap {
    let mut unacked_packets = UnackedPacketMap::new();
    for seq in 1..=RANGE {
        let packet = SerializedPacket::new(seq, Some(RetransmittableFrames::new()));
        unacked_packets.add_packet(packet).ok();
        unacked_packets.set_sent(seq, now, 1200, true).ok();
    }
    unacked_packets
}

pub fn send_and_ack_benchmark(c: &mut Criterion) {
    let now = Instant::now();
    c.bench_function("unacked packet map send and ack", |b| {
        b.iter(|| {
            let mut unacked_packets = sent_packets(now);
            unacked_packets.increase_largest_observed(RANGE).ok();
            for seq in 1..=RANGE {
                unacked_packets.remove_from_in_flight(seq).ok();
                unacked_packets.remove_retransmittability(seq);
            }
            unacked_packets.bytes_in_flight()
        })
    });
}

pub fn detect_lost_packets_benchmark(c: &mut Criterion) {
    let now = Instant::now();
    let mut unacked_packets = sent_packets(now);
    unacked_packets.increase_largest_observed(RANGE).ok();
    for seq in 1..RANGE {
        unacked_packets.nack_packet(seq, 1).ok();
    }

    let mut rtt = RttStats::default();
    rtt.update_rtt(Duration::from_millis(100), Duration::ZERO, now);
    let mut loss_detection = build_loss_detection(&RecoveryConfig::default());
    let later = now + Duration::from_millis(50);
    c.bench_function("nack loss detection", |b| {
        b.iter(|| loss_detection.detect_lost_packets(&unacked_packets, later, RANGE, &rtt))
    });
}

criterion_group!(
    benches,
    send_and_ack_benchmark,
    detect_lost_packets_benchmark,
);
criterion_main!(benches);
