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

/// A bandwidth estimate in bytes per second.
///
/// [`Bandwidth::INFINITE`] stands for "no measurement yet": before the
/// first RTT sample the sender cannot bound its rate, and the pacer lets
/// packets through without budget accounting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Bandwidth(u64);

impl Bandwidth {
    /// The unknown/unlimited bandwidth sentinel.
    pub const INFINITE: Bandwidth = Bandwidth(u64::MAX);

    /// Bandwidth of a window of `bytes` delivered per `rtt`.
    ///
    /// A zero `rtt` yields [`Bandwidth::INFINITE`].
    pub fn from_window_and_rtt(bytes: u64, rtt: Duration) -> Self {
        if rtt.is_zero() {
            return Bandwidth::INFINITE;
        }
        Bandwidth((bytes as u128 * 1_000_000 / rtt.as_micros()) as u64)
    }

    /// Whether this is the unknown/unlimited sentinel.
    pub fn is_infinite(&self) -> bool {
        *self == Bandwidth::INFINITE
    }

    /// The estimate in bytes per second.
    pub fn bytes_per_second(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_from_window_and_rtt() {
        let bw = Bandwidth::from_window_and_rtt(38400, Duration::from_millis(100));
        assert_eq!(bw.bytes_per_second(), 384000);
        assert_eq!(bw.is_infinite(), false);

        let bw = Bandwidth::from_window_and_rtt(1200, Duration::from_secs(1));
        assert_eq!(bw.bytes_per_second(), 1200);
    }

    #[test]
    fn bandwidth_zero_rtt_is_infinite() {
        let bw = Bandwidth::from_window_and_rtt(38400, Duration::ZERO);
        assert_eq!(bw, Bandwidth::INFINITE);
        assert_eq!(bw.is_infinite(), true);
    }
}
