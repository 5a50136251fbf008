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

use std::cmp;
use std::time::Duration;

/// RTT estimation for a network path.
///
/// The surrounding connection feeds one sample per ack-eliciting ack via
/// [`update`](RttEstimator::update); the congestion core only reads the
/// resulting latest/minimum/smoothed values.
///
/// See RFC 9002 Section 5
#[derive(Copy, Clone, Debug, Default)]
pub struct RttEstimator {
    /// The most recent RTT sample.
    latest_rtt: Duration,

    /// An exponentially weighted moving average of the RTT samples.
    smoothed_rtt: Option<Duration>,

    /// Mean variation of the RTT samples.
    rttvar: Duration,

    /// The minimum RTT observed on the path, ignoring ack delay.
    min_rtt: Duration,
}

impl RttEstimator {
    pub fn new() -> Self {
        RttEstimator::default()
    }

    /// Return the latest RTT sample, or zero before the first sample.
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// Return the smoothed RTT, or zero before the first sample.
    ///
    /// A zero smoothed RTT tells the congestion core that no measurement
    /// exists yet, which in turn makes the bandwidth estimate unlimited.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(Duration::ZERO)
    }

    /// Return the minimum RTT observed so far, or zero before the first
    /// sample.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    /// Return the variation in the RTT samples using a mean variation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Update the estimator with the given RTT sample.
    pub fn update(&mut self, ack_delay: Duration, rtt: Duration) {
        self.latest_rtt = rtt;

        if let Some(smoothed_rtt) = self.smoothed_rtt {
            self.min_rtt = cmp::min(self.min_rtt, rtt);

            // The ack delay is only subtracted when the result would not
            // fall below min_rtt.
            // See RFC 9002 Section 5.3
            let adjusted_rtt = if self.min_rtt + ack_delay <= rtt {
                rtt - ack_delay
            } else {
                rtt
            };

            let var_sample = if smoothed_rtt > adjusted_rtt {
                smoothed_rtt - adjusted_rtt
            } else {
                adjusted_rtt - smoothed_rtt
            };

            self.rttvar = (3 * self.rttvar + var_sample) / 4;
            self.smoothed_rtt = Some((7 * smoothed_rtt + adjusted_rtt) / 8);
        } else {
            self.min_rtt = rtt;
            self.smoothed_rtt = Some(rtt);
            self.rttvar = rtt / 2;
        }
    }
}
