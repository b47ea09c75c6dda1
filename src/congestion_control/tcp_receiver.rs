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

use super::CongestionFeedback;
use super::ReceiveAlgorithm;

/// Receive window advertised by default.
pub const DEFAULT_RECEIVE_WINDOW: u64 = 256_000;

/// Receiver advertising a fixed receive window.
#[derive(Debug, Clone)]
pub struct TcpReceiver {
    receive_window: u64,
}

impl TcpReceiver {
    pub fn new(receive_window: u64) -> Self {
        Self { receive_window }
    }
}

impl Default for TcpReceiver {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVE_WINDOW)
    }
}

impl ReceiveAlgorithm for TcpReceiver {
    fn generate_congestion_feedback(&self) -> Option<CongestionFeedback> {
        Some(CongestionFeedback::Tcp {
            receive_window: self.receive_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn tcp_receiver_feedback() {
        let mut receiver = TcpReceiver::default();
        receiver.record_incoming_packet(1200, 1, Instant::now());
        assert_eq!(
            receiver.generate_congestion_feedback(),
            Some(CongestionFeedback::Tcp {
                receive_window: DEFAULT_RECEIVE_WINDOW
            })
        );
    }
}
