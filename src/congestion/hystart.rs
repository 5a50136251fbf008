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

//! HyStart: delay-based slow start exit.
//!
//! Slow start can overshoot the ideal send rate, causing high packet loss
//! and poor performance. HyStart samples the minimum RTT of each round of
//! packets and signals a slow start exit once the per-round minimum rises
//! a threshold above the previous round's minimum.

use std::time::Duration;

/// The congestion window in packets below which the delay detector stays
/// quiet. The magic clamping numbers come from the original code in
/// tcp_cubic.c.
const LOW_WINDOW: u64 = 16;

/// The least RTT samples to collect in one round before the delay
/// condition may be evaluated.
const N_RTT_SAMPLE: u32 = 8;

/// A fraction of the last round's minimum RTT used to compute the delay
/// threshold. A smaller divisor means a larger threshold and thus less
/// sensitivity to delay increase, and vice versa.
const MIN_RTT_DIVISOR: u32 = 8;

/// Lower bound of the delay increase threshold. Smaller values may cause
/// spurious exits from slow start.
const MIN_RTT_THRESH: Duration = Duration::from_millis(4);

/// Upper bound of the delay increase threshold. Larger values may result
/// in slow start not exiting until loss is encountered on large RTT
/// paths.
const MAX_RTT_THRESH: Duration = Duration::from_millis(16);

/// Implementation of the HyStart delay detector.
#[derive(Debug)]
pub struct Hystart {
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
}

impl Default for Hystart {
    fn default() -> Self {
        Self {
            end_packet_number: None,
            last_sent_packet_number: None,
            current_round_min_rtt: Duration::MAX,
            last_round_min_rtt: Duration::MAX,
            rtt_sample_count: 0,
            started: false,
        }
    }
}

impl Hystart {
    pub fn new() -> Self {
        Hystart::default()
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
    /// Returns true when slow start should be exited: the window is at
    /// least [`LOW_WINDOW`] packets, enough samples were collected, and
    /// the round minimum RTT rose a clamped threshold above the previous
    /// round's minimum.
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
        *self = Hystart::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DATAGRAM_SIZE: u64 = 1200;
    const CWND: u64 = 32 * MAX_DATAGRAM_SIZE;

    /// A detector whose completed previous round measured `baseline`.
    fn with_baseline(baseline: Duration, end_packet_number: u64) -> Hystart {
        let mut hystart = Hystart::new();
        hystart.current_round_min_rtt = baseline;
        hystart.start_receive_round(Some(end_packet_number));
        hystart
    }

    #[test]
    fn hystart_first_round_never_exits() {
        let mut hystart = Hystart::new();

        // Without a completed previous round there is no baseline to
        // compare against, no matter how large the samples are.
        for pn in 1..=16u64 {
            hystart.on_packet_sent(pn);
        }
        for _ in 0..16 {
            assert_eq!(
                hystart.should_exit_slow_start(
                    Duration::from_millis(500),
                    CWND,
                    MAX_DATAGRAM_SIZE
                ),
                false
            );
        }
        assert_eq!(hystart.rtt_sample_count, 16);
        assert_eq!(hystart.current_round_min_rtt, Duration::from_millis(500));
        assert_eq!(hystart.last_round_min_rtt, Duration::MAX);
    }

    #[test]
    fn hystart_round_rotation() {
        let mut hystart = Hystart::new();

        // First burst. The round begins at the first ack and covers
        // packets 1..=8.
        for pn in 1..=8u64 {
            hystart.on_packet_sent(pn);
        }
        for pn in 1..=8u64 {
            hystart.should_exit_slow_start(Duration::from_millis(40), CWND, MAX_DATAGRAM_SIZE);
            hystart.on_packet_acked(pn);
        }
        assert_eq!(hystart.started, true);
        assert_eq!(hystart.end_packet_number, Some(8));
        assert_eq!(hystart.current_round_min_rtt, Duration::from_millis(40));
        assert_eq!(hystart.rtt_sample_count, 8);

        // Second burst. The ack of packet 9 is past the end marker: its
        // sample still joins the old round, then the round ends.
        for pn in 9..=16u64 {
            hystart.on_packet_sent(pn);
        }
        hystart.should_exit_slow_start(Duration::from_millis(45), CWND, MAX_DATAGRAM_SIZE);
        hystart.on_packet_acked(9);
        assert_eq!(hystart.started, false);

        // The next ack rotates the minimums and opens a round ending at
        // the last sent packet.
        hystart.should_exit_slow_start(Duration::from_millis(45), CWND, MAX_DATAGRAM_SIZE);
        hystart.on_packet_acked(10);
        assert_eq!(hystart.started, true);
        assert_eq!(hystart.end_packet_number, Some(16));
        assert_eq!(hystart.last_round_min_rtt, Duration::from_millis(40));
        assert_eq!(hystart.current_round_min_rtt, Duration::from_millis(45));
        assert_eq!(hystart.rtt_sample_count, 1);
    }

    #[test]
    fn hystart_delay_increase_exits() {
        // Baseline 40ms: threshold is clamp(40ms / 8, 4ms, 16ms) = 5ms,
        // and 45ms samples meet it once 8 of them were collected.
        let mut hystart = with_baseline(Duration::from_millis(40), 16);

        for i in 0..8 {
            let exit = hystart.should_exit_slow_start(
                Duration::from_millis(45),
                CWND,
                MAX_DATAGRAM_SIZE,
            );
            assert_eq!(exit, i == 7);
        }
    }

    #[test]
    fn hystart_delay_below_threshold_stays() {
        let mut hystart = with_baseline(Duration::from_millis(40), 16);

        for _ in 0..16 {
            assert_eq!(
                hystart.should_exit_slow_start(
                    Duration::from_millis(44),
                    CWND,
                    MAX_DATAGRAM_SIZE
                ),
                false
            );
        }
    }

    #[test]
    fn hystart_threshold_clamping() {
        // 8ms baseline: 8ms / 8 = 1ms clamps up to 4ms, so 11ms must not
        // trigger while 12ms does.
        let mut hystart = with_baseline(Duration::from_millis(8), 16);
        for _ in 0..8 {
            assert_eq!(
                hystart.should_exit_slow_start(
                    Duration::from_millis(11),
                    CWND,
                    MAX_DATAGRAM_SIZE
                ),
                false
            );
        }

        let mut hystart = with_baseline(Duration::from_millis(8), 16);
        let mut exit = false;
        for _ in 0..8 {
            exit |= hystart.should_exit_slow_start(
                Duration::from_millis(12),
                CWND,
                MAX_DATAGRAM_SIZE,
            );
        }
        assert_eq!(exit, true);

        // 200ms baseline: 200ms / 8 = 25ms clamps down to 16ms.
        let mut hystart = with_baseline(Duration::from_millis(200), 16);
        let mut exit = false;
        for _ in 0..8 {
            exit |= hystart.should_exit_slow_start(
                Duration::from_millis(216),
                CWND,
                MAX_DATAGRAM_SIZE,
            );
        }
        assert_eq!(exit, true);
    }

    #[test]
    fn hystart_small_window_stays_quiet() {
        let mut hystart = with_baseline(Duration::from_millis(40), 16);
        let small_cwnd = (LOW_WINDOW - 1) * MAX_DATAGRAM_SIZE;

        for _ in 0..16 {
            assert_eq!(
                hystart.should_exit_slow_start(
                    Duration::from_millis(500),
                    small_cwnd,
                    MAX_DATAGRAM_SIZE
                ),
                false
            );
        }
    }

    #[test]
    fn hystart_restart() {
        let mut hystart = with_baseline(Duration::from_millis(40), 16);
        hystart.on_packet_sent(17);
        hystart.should_exit_slow_start(Duration::from_millis(45), CWND, MAX_DATAGRAM_SIZE);

        hystart.restart();
        assert_eq!(hystart.started, false);
        assert_eq!(hystart.end_packet_number, None);
        assert_eq!(hystart.last_sent_packet_number, None);
        assert_eq!(hystart.current_round_min_rtt, Duration::MAX);
        assert_eq!(hystart.last_round_min_rtt, Duration::MAX);
        assert_eq!(hystart.rtt_sample_count, 0);
    }
}
