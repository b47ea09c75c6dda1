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

//! Error type for loss recovery and congestion control operations.

use strum_macros::EnumIter;

/// Loss recovery error.
///
/// Most variants describe a broken contract between the connection and the
/// recovery state, e.g. acknowledging a packet that was never sent. They are
/// logged as errors where they are detected and the offending operation is
/// skipped without touching any state.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// The configuration is invalid.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state.
    InvalidState(String),

    /// The sequence number is not tracked by the unacked packet map.
    UnknownPacket(u64),

    /// The sequence number is not larger than every tracked sequence number.
    PacketOutOfOrder(u64),

    /// The packet has already been marked as sent and in flight.
    PacketAlreadyInFlight(u64),

    /// The packet carries no retransmittable frames.
    NoRetransmittableFrames(u64),

    /// The congestion feedback frame is of a type the algorithm does not
    /// understand.
    InvalidFeedback,

    /// A server config with the same id already exists.
    DuplicateConfig(String),

    /// No server config has the given id.
    UnknownConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn error_display() {
        for err in Error::iter() {
            assert_eq!(format!("{}", err), format!("{:?}", err));
        }

        let e = Error::UnknownPacket(7);
        assert_eq!(format!("{}", e), "UnknownPacket(7)");
    }

    #[test]
    fn error_source() {
        use std::error::Error;
        let e = super::Error::InvalidConfig("unknown".into());
        assert_eq!(format!("{}", e), "InvalidConfig(\"unknown\")");
        assert!(e.source().is_none());
    }
}
