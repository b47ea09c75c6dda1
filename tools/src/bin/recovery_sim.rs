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

use clap::Parser;
use log::*;

use quic_recovery::congestion_control::build_send_algorithm;
use quic_recovery::congestion_control::simulator::SendAlgorithmSimulator;
use quic_recovery::congestion_control::simulator::SimulatorConfig;
use quic_recovery::congestion_control::CongestionControlAlgorithm;
use quic_recovery::congestion_control::CongestionFeedback;
use quic_recovery::Bandwidth;
use quic_recovery::MockClock;
use quic_recovery::RecoveryConfig;
use quic_recovery_tools::Result;

#[derive(Parser, Debug, Clone)]
#[clap(name = "recovery_sim")]
pub struct SimulatorOpt {
    /// Network model in JSON. Command line options override its fields.
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Congestion control algorithm of the senders.
    #[clap(long, default_value = "FIXRATE", value_name = "STR")]
    pub congestion_control_algor: CongestionControlAlgorithm,

    /// Bitrate advertised to the senders in KB/s.
    #[clap(short, long, default_value = "300", value_name = "NUM")]
    pub bitrate: u64,

    /// Number of senders sharing the bottleneck.
    #[clap(short, long, default_value = "1", value_name = "NUM")]
    pub senders: usize,

    /// Bytes transferred by each sender.
    #[clap(short, long, default_value = "1000000", value_name = "NUM")]
    pub transfer_bytes: u64,

    /// Stop the simulation after this many milliseconds. "0" means no limit.
    #[clap(short, long, default_value = "0", value_name = "TIME")]
    pub duration: u64,

    /// Probability of losing a data packet.
    #[clap(long, value_name = "NUM")]
    pub forward_loss_rate: Option<f64>,

    /// Probability of losing an ack.
    #[clap(long, value_name = "NUM")]
    pub reverse_loss_rate: Option<f64>,

    /// Seed of the loss generator.
    #[clap(long, value_name = "NUM")]
    pub seed: Option<u64>,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

fn process_option(option: &SimulatorOpt) -> Result<SimulatorConfig> {
    env_logger::builder()
        .target(quic_recovery_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let mut conf = match &option.config {
        Some(path) => quic_recovery_tools::load_simulator_config(path)?,
        None => SimulatorConfig::default(),
    };
    if let Some(rate) = option.forward_loss_rate {
        conf.forward_loss_rate = rate;
    }
    if let Some(rate) = option.reverse_loss_rate {
        conf.reverse_loss_rate = rate;
    }
    if option.seed.is_some() {
        conf.seed = option.seed;
    }
    debug!("simulator config {:?}", conf);
    Ok(conf)
}

fn main() -> Result<()> {
    // Parse simulator option.
    let option = SimulatorOpt::parse();
    let conf = process_option(&option)?;

    let mut simulator = SendAlgorithmSimulator::from_config(MockClock::new(), &conf)?;
    let recovery_conf = RecoveryConfig {
        congestion_control_algorithm: option.congestion_control_algor,
        ..RecoveryConfig::default()
    };
    let feedback = CongestionFeedback::FixRate {
        bitrate: Bandwidth::from_kbytes_per_second(option.bitrate),
    };

    let start = simulator.now();
    for _ in 0..option.senders {
        let id = simulator.add_sender(build_send_algorithm(&recovery_conf));
        if let Some(sender) = simulator.sender_mut(id) {
            sender
                .send_algorithm_mut()
                .on_incoming_congestion_feedback(&feedback, start)?;
        }
        simulator.add_transfer(id, option.transfer_bytes)?;
    }

    // Run the simulation.
    match option.duration {
        0 => simulator.transfer_bytes(),
        ms => simulator.transfer_bytes_limited(u64::MAX, Some(Duration::from_millis(ms))),
    }

    let elapsed = simulator.now().saturating_duration_since(start);
    println!("elapsed: {:?}", elapsed);
    for (i, sender) in simulator.senders().iter().enumerate() {
        println!(
            "sender {}: {} goodput={:?} loss_rate={:.4} cwnd=[{}, {}] max_cwnd_drop={} srtt={:?} min_rtt={:?}",
            i,
            sender.send_algorithm().name(),
            sender.last_transfer_bandwidth,
            sender.last_transfer_loss_rate,
            sender.min_cwnd,
            sender.max_cwnd,
            sender.max_cwnd_drop,
            sender.rtt_stats().smoothed_rtt(),
            sender.rtt_stats().min_rtt(),
        );
    }

    if simulator.has_pending_transfers() {
        warn!("simulation stopped with pending transfers");
    }
    Ok(())
}
