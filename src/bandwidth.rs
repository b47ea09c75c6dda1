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

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

const MICROS_PER_SECOND: u128 = 1_000_000;

/// A data rate, stored in bits per second.
///
/// Conversions to bytes and to periods of time work on whole microseconds,
/// truncating any remainder.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bandwidth {
    bits_per_second: u64,
}

impl Bandwidth {
    pub const fn zero() -> Self {
        Bandwidth { bits_per_second: 0 }
    }

    pub const fn from_bits_per_second(bits_per_second: u64) -> Self {
        Bandwidth { bits_per_second }
    }

    pub const fn from_kbits_per_second(k_bits_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: k_bits_per_second * 1000,
        }
    }

    pub const fn from_bytes_per_second(bytes_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: bytes_per_second * 8,
        }
    }

    pub const fn from_kbytes_per_second(k_bytes_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: k_bytes_per_second * 8000,
        }
    }

    /// The rate needed to move `bytes` in `delta`. A zero `delta` yields a
    /// zero bandwidth.
    pub fn from_bytes_and_time_delta(bytes: u64, delta: Duration) -> Self {
        let micros = delta.as_micros();
        if micros == 0 {
            return Bandwidth::zero();
        }
        let bits_per_second = bytes as u128 * 8 * MICROS_PER_SECOND / micros;
        Bandwidth {
            bits_per_second: bits_per_second.min(u64::MAX as u128) as u64,
        }
    }

    pub fn to_bits_per_second(&self) -> u64 {
        self.bits_per_second
    }

    pub fn to_kbits_per_second(&self) -> u64 {
        self.bits_per_second / 1000
    }

    pub fn to_bytes_per_second(&self) -> u64 {
        self.bits_per_second / 8
    }

    pub fn to_kbytes_per_second(&self) -> u64 {
        self.bits_per_second / 8000
    }

    /// Bytes transferred at this rate during `period`.
    pub fn to_bytes_per_period(&self, period: Duration) -> u64 {
        let bytes = self.bits_per_second as u128 * period.as_micros() / 8 / MICROS_PER_SECOND;
        bytes.min(u64::MAX as u128) as u64
    }

    /// Time needed to transfer `bytes` at this rate. Returns `Duration::MAX`
    /// for a zero bandwidth.
    pub fn transfer_time(&self, bytes: u64) -> Duration {
        if self.bits_per_second == 0 {
            return Duration::MAX;
        }
        let micros = bytes as u128 * 8 * MICROS_PER_SECOND / self.bits_per_second as u128;
        Duration::from_micros(micros.min(u64::MAX as u128) as u64)
    }

    pub fn is_zero(&self) -> bool {
        self.bits_per_second == 0
    }
}

impl fmt::Debug for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.bits_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let bw = Bandwidth::from_kbytes_per_second(300);
        assert_eq!(bw.to_bytes_per_second(), 300_000);
        assert_eq!(bw.to_kbytes_per_second(), 300);
        assert_eq!(bw.to_bits_per_second(), 2_400_000);
        assert_eq!(bw.to_kbits_per_second(), 2_400);

        assert_eq!(
            Bandwidth::from_kbits_per_second(8),
            Bandwidth::from_bytes_per_second(1000)
        );
        assert!(Bandwidth::zero().is_zero());
        assert!(Bandwidth::from_bits_per_second(1) > Bandwidth::zero());
    }

    #[test]
    fn period_and_transfer_time() {
        let bw = Bandwidth::from_bytes_per_second(200_000);
        assert_eq!(bw.to_bytes_per_period(Duration::from_millis(5)), 1000);
        assert_eq!(bw.to_bytes_per_period(Duration::from_millis(10)), 2000);
        assert_eq!(bw.to_bytes_per_period(Duration::ZERO), 0);
        assert_eq!(bw.transfer_time(2000), Duration::from_millis(10));
        assert_eq!(Bandwidth::zero().transfer_time(1), Duration::MAX);
    }

    #[test]
    fn from_bytes_and_time_delta() {
        let bw = Bandwidth::from_bytes_and_time_delta(1000, Duration::from_millis(1));
        assert_eq!(bw.to_bytes_per_second(), 1_000_000);
        assert_eq!(
            Bandwidth::from_bytes_and_time_delta(1000, Duration::ZERO),
            Bandwidth::zero()
        );
        assert_eq!(format!("{:?}", bw), "8000000bps");
    }
}
