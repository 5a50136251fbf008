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

//! HyStart++: Modified Slow Start for TCP, applied to QUIC.
//!
//! HyStart++ uses the same per-round delay increase heuristic as HyStart,
//! but instead of jumping straight to congestion avoidance it first moves
//! into Limited Slow Start (LSS), where the window keeps growing at a
//! reduced, window-dependent rate. The phase is single-shot: the first
//! loss while in LSS abandons HyStart++ for the rest of the connection.
//!
//! See <https://www.rfc-editor.org/rfc/rfc9406.html>.

use std::time::Duration;

/// The congestion window in packets below which the delay detector stays
/// quiet.
const LOW_WINDOW: u64 = 16;

/// The least RTT samples to collect in one round before the delay
/// condition may be evaluated.
///
/// See <https://www.rfc-editor.org/rfc/rfc9406.html#name-tuning-constants-and-other->.
const N_RTT_SAMPLE: u32 = 8;

/// A fraction of the last round's minimum RTT used to compute the delay
/// threshold.
///
/// See <https://www.rfc-editor.org/rfc/rfc9406.html#name-tuning-constants-and-other->.
const MIN_RTT_DIVISOR: u32 = 8;

/// Lower bound of the delay increase threshold.
///
/// See <https://www.rfc-editor.org/rfc/rfc9406.html#name-tuning-constants-and-other->.
const MIN_RTT_THRESH: Duration = Duration::from_millis(4);

/// Upper bound of the delay increase threshold.
///
/// See <https://www.rfc-editor.org/rfc/rfc9406.html#name-tuning-constants-and-other->.
const MAX_RTT_THRESH: Duration = Duration::from_millis(16);

/// Congestion window increase limit in datagrams for byte counting,
/// the recommended value in RFC 3465.
const ABC_L: u64 = 2;

/// Limited Slow Start divisor from RFC 3742; the advised value is below
/// 0.5.
const LSS_DIVISOR: f64 = 0.25;

/// Implementation of the HyStart++ detector and its window growth rules.
#[derive(Debug)]
pub struct HystartPlusPlus {
    /// The last packet sent when the current round started. An ack past
    /// this packet ends the round.
    end_packet_number: Option<u64>,

    /// The last sent packet number, recorded at packet send.
    last_sent_packet_number: Option<u64>,

    /// Minimum RTT sampled in the current round. `Duration::MAX` until
    /// the first sample.
    current_round_min_rtt: Duration,

    /// Minimum RTT sampled in the last completed round. `Duration::MAX`
    /// until a round completes.
    last_round_min_rtt: Duration,

    /// RTT sample count in the current round.
    rtt_sample_count: u32,

    /// Whether a receive round is in progress.
    started: bool,

    /// Whether the delay signal fired and growth switched to Limited
    /// Slow Start.
    in_lss: bool,
}

impl Default for HystartPlusPlus {
    fn default() -> Self {
        Self {
            end_packet_number: None,
            last_sent_packet_number: None,
            current_round_min_rtt: Duration::MAX,
            last_round_min_rtt: Duration::MAX,
            rtt_sample_count: 0,
            started: false,
            in_lss: false,
        }
    }
}

impl HystartPlusPlus {
    pub fn new() -> Self {
        HystartPlusPlus::default()
    }

    /// Whether growth is in the Limited Slow Start phase.
    pub fn in_lss(&self) -> bool {
        self.in_lss
    }

    /// Start a receive round: remember where it ends and rotate the
    /// round minimums.
    pub fn start_receive_round(&mut self, last_sent: Option<u64>) {
        self.end_packet_number = last_sent;
        self.last_round_min_rtt = self.current_round_min_rtt;
        self.current_round_min_rtt = Duration::MAX;
        self.rtt_sample_count = 0;
        self.started = true;
    }

    /// Whether this ack is past the last packet number of the current
    /// round.
    fn is_end_of_round(&self, ack: u64) -> bool {
        self.end_packet_number < Some(ack)
    }

    /// Feed the RTT sample of a new ack and evaluate the delay increase
    /// condition.
    ///
    /// On a positive signal the detector moves itself into Limited Slow
    /// Start and returns true; the sender then pins the slow start
    /// threshold to the current window.
    pub fn should_exit_slow_start(
        &mut self,
        latest_rtt: Duration,
        congestion_window: u64,
        max_datagram_size: u64,
    ) -> bool {
        if !self.started {
            self.start_receive_round(self.last_sent_packet_number);
        }

        self.current_round_min_rtt = self.current_round_min_rtt.min(latest_rtt);
        self.rtt_sample_count += 1;

        if congestion_window >= LOW_WINDOW * max_datagram_size
            && self.rtt_sample_count >= N_RTT_SAMPLE
            && self.current_round_min_rtt != Duration::MAX
            && self.last_round_min_rtt != Duration::MAX
        {
            let rtt_thresh =
                (self.last_round_min_rtt / MIN_RTT_DIVISOR).clamp(MIN_RTT_THRESH, MAX_RTT_THRESH);

            if self.current_round_min_rtt >= self.last_round_min_rtt.saturating_add(rtt_thresh) {
                self.in_lss = true;
                return true;
            }
        }
        false
    }

    /// Record the last sent packet number, used as the end marker when
    /// the next round starts.
    pub fn on_packet_sent(&mut self, packet_number: u64) {
        self.last_sent_packet_number = Some(packet_number);
    }

    /// End the round when the final packet of the burst is acked; the
    /// next round starts on the next incoming ack.
    pub fn on_packet_acked(&mut self, packet_number: u64) {
        if self.is_end_of_round(packet_number) {
            self.started = false;
        }
    }

    /// Restart the detector from a clean state.
    pub fn restart(&mut self) {
        *self = HystartPlusPlus::default();
    }

    /// Window after an ack in (pre-LSS) slow start: byte counting with
    /// the increase limited to [`ABC_L`] datagrams per ack.
    ///
    /// See <https://www.rfc-editor.org/rfc/rfc3465.html>.
    pub fn slow_start_window(
        &self,
        acked_bytes: u64,
        congestion_window: u64,
        max_datagram_size: u64,
    ) -> u64 {
        congestion_window.saturating_add(acked_bytes.min(ABC_L * max_datagram_size))
    }

    /// Window after an ack in Limited Slow Start.
    ///
    /// The byte-counted increase is divided by K = cwnd / (0.25 *
    /// ssthresh), and the result never falls below the window the
    /// congestion avoidance algorithm would have produced for the same
    /// ack.
    ///
    /// See <https://www.rfc-editor.org/rfc/rfc3742.html>.
    pub fn limited_slow_start_window(
        &self,
        acked_bytes: u64,
        congestion_window: u64,
        max_datagram_size: u64,
        slow_start_threshold: u64,
        ca_window: u64,
    ) -> u64 {
        let k = congestion_window as f64 / (LSS_DIVISOR * slow_start_threshold as f64);
        let lss_window =
            congestion_window as f64 + acked_bytes.min(ABC_L * max_datagram_size) as f64 / k;
        lss_window.max(ca_window as f64) as u64
    }
}
