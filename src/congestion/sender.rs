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
use std::time::Instant;

use log::*;

use super::bandwidth::Bandwidth;
use super::cubic::Cubic;
use super::pacing::Pacer;
use super::CongestionAlgorithm;
use super::CongestionState;
use super::CongestionTracer;
use super::SlowStartVariant;
use super::StartAlgorithm;
use crate::rtt::RttEstimator;
use crate::Config;

/// Reno multiplicative decrease factor applied on loss.
const RENO_BETA: f64 = 0.7;

/// The window headroom in packets below which the sender still counts as
/// window limited.
const MAX_BURST_PACKETS: u64 = 3;

/// The per-connection send algorithm.
///
/// The sender owns the congestion window and slow start threshold and
/// reacts to the four external events (packet sent, acked, lost,
/// retransmission timeout) by dispatching to the configured slow start
/// and congestion avoidance variants. A token-bucket pacer derives the
/// departure time of the next datagram from the current bandwidth
/// estimate.
///
/// All methods are synchronous and non-blocking; the sender is driven
/// from its connection's event loop.
#[derive(Debug)]
pub struct Sender {
    /// RTT estimation for the connection's path, updated by the
    /// connection before RTT-consuming events are delivered.
    rtt: RttEstimator,

    /// CUBIC window function. Kept across algorithm choices so that a
    /// reset is always cheap and state never leaks between epochs.
    cubic: Cubic,

    /// State of the configured slow start variant.
    slow_start: SlowStartVariant,

    /// The configured congestion avoidance variant.
    congestion_algorithm: CongestionAlgorithm,

    /// The pacer deriving per-datagram release times.
    pacer: Pacer,

    /// The largest packet number sent so far.
    largest_sent_packet_number: Option<u64>,

    /// The largest packet number acked so far.
    largest_acked_packet_number: Option<u64>,

    /// The largest packet number outstanding when the last cwnd cutback
    /// occurred. Losses up to this point fold into one congestion event.
    largest_sent_at_last_cutback: Option<u64>,

    /// Whether the last loss event caused the sender to exit slow start.
    last_cutback_exited_slowstart: bool,

    /// Congestion window in bytes.
    congestion_window: u64,

    /// Slow start threshold in bytes.
    slow_start_threshold: u64,

    /// Ack counter for the NewReno congestion avoidance.
    num_acked_packets: u64,

    /// The initial congestion window in bytes, restored on migration.
    initial_congestion_window: u64,

    /// The minimal congestion window in packets.
    min_congestion_window_packets: u64,

    /// The maximal congestion window in packets.
    max_congestion_window_packets: u64,

    /// Max datagram size in bytes. Monotonically non-decreasing.
    max_datagram_size: u64,

    /// The last state reported to the tracer.
    last_state: CongestionState,

    /// Observer for congestion state transitions.
    tracer: Option<Box<dyn CongestionTracer>>,
}

impl Sender {
    pub fn new(conf: &Config, tracer: Option<Box<dyn CongestionTracer>>) -> Self {
        let max_datagram_size = conf.max_datagram_size;
        let initial_congestion_window = conf
            .initial_congestion_window
            .saturating_mul(max_datagram_size);

        let mut sender = Self {
            rtt: RttEstimator::new(),
            cubic: Cubic::new(),
            slow_start: SlowStartVariant::new(conf.start_algorithm),
            congestion_algorithm: conf.congestion_algorithm,
            pacer: Pacer::new(max_datagram_size),
            largest_sent_packet_number: None,
            largest_acked_packet_number: None,
            largest_sent_at_last_cutback: None,
            last_cutback_exited_slowstart: false,
            congestion_window: initial_congestion_window,
            slow_start_threshold: u64::MAX,
            num_acked_packets: 0,
            initial_congestion_window,
            min_congestion_window_packets: conf.min_congestion_window,
            max_congestion_window_packets: conf.max_congestion_window,
            max_datagram_size,
            last_state: CongestionState::SlowStart,
            tracer,
        };
        if let Some(tracer) = sender.tracer.as_mut() {
            tracer.updated_congestion_state(CongestionState::SlowStart);
        }
        sender
    }

    fn min_congestion_window(&self) -> u64 {
        self.min_congestion_window_packets * self.max_datagram_size
    }

    fn max_congestion_window(&self) -> u64 {
        self.max_congestion_window_packets * self.max_datagram_size
    }

    /// Current congestion window in bytes.
    pub fn congestion_window(&self) -> u64 {
        self.congestion_window
    }

    /// Current slow start threshold in bytes.
    pub fn slow_start_threshold(&self) -> u64 {
        self.slow_start_threshold
    }

    /// The slow start algorithm currently in effect.
    ///
    /// This can differ from the configured one: a loss during Limited
    /// Slow Start permanently downgrades HyStart++ to classic slow start.
    pub fn start_algorithm(&self) -> StartAlgorithm {
        self.slow_start.algorithm()
    }

    /// The configured congestion avoidance algorithm.
    pub fn congestion_algorithm(&self) -> CongestionAlgorithm {
        self.congestion_algorithm
    }

    /// Whether another packet fits into the window.
    pub fn can_send(&self, bytes_in_flight: u64) -> bool {
        bytes_in_flight < self.congestion_window
    }

    /// Whether the sender is in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.congestion_window < self.slow_start_threshold
    }

    /// Whether the sender is in recovery, i.e. acks do not yet reach
    /// past the last cutback point.
    pub fn in_recovery(&self) -> bool {
        self.largest_acked_packet_number.is_some()
            && self.largest_acked_packet_number <= self.largest_sent_at_last_cutback
    }

    /// Whether HyStart++ put the sender into Limited Slow Start.
    pub fn in_low_slow_start(&self) -> bool {
        self.slow_start.in_lss()
    }

    /// The current bandwidth estimate, `congestion_window / smoothed_rtt`.
    ///
    /// Unlimited before the first RTT measurement.
    pub fn bandwidth_estimate(&self) -> Bandwidth {
        let srtt = self.rtt.smoothed_rtt();
        if srtt.is_zero() {
            return Bandwidth::INFINITE;
        }
        Bandwidth::from_window_and_rtt(self.congestion_window, srtt)
    }

    /// The earliest time the next datagram may leave the wire, or `None`
    /// if it may leave immediately.
    pub fn time_until_send(&self) -> Option<Instant> {
        self.pacer.time_until_send(self.bandwidth_estimate())
    }

    /// Whether the pacer has at least one datagram of budget at `now`.
    pub fn has_pacing_budget(&self, now: Instant) -> bool {
        self.pacer.budget(now, self.bandwidth_estimate()) >= self.max_datagram_size
    }

    /// Feed an RTT sample taken by the connection.
    pub fn update_rtt(&mut self, ack_delay: Duration, rtt: Duration) {
        self.rtt.update(ack_delay, rtt);
    }

    /// The RTT view consumed by the congestion core.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Callback after a packet was sent out.
    pub fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        packet_number: u64,
        bytes: u64,
        is_retransmittable: bool,
    ) {
        let rate = self.bandwidth_estimate();
        self.pacer.on_packet_sent(sent_time, bytes, rate);
        if !is_retransmittable {
            return;
        }
        self.largest_sent_packet_number = Some(packet_number);
        self.slow_start.on_packet_sent(packet_number);
    }

    /// Run the configured slow start exit detector.
    ///
    /// On a positive signal the slow start threshold is pinned to the
    /// current window; HyStart moves to congestion avoidance, HyStart++
    /// to Limited Slow Start.
    pub fn maybe_exit_slow_start(&mut self) {
        if !self.in_slow_start() {
            return;
        }
        let latest_rtt = self.rtt.latest_rtt();
        let congestion_window = self.congestion_window;
        let max_datagram_size = self.max_datagram_size;

        if self
            .slow_start
            .should_exit_slow_start(latest_rtt, congestion_window, max_datagram_size)
        {
            self.slow_start_threshold = self.congestion_window;
            let next_state = if self.slow_start.in_lss() {
                CongestionState::LowSlowStart
            } else {
                CongestionState::CongestionAvoidance
            };
            self.maybe_trace_state_change(next_state);
        }
    }

    /// Callback for processing an acked packet.
    pub fn on_packet_acked(
        &mut self,
        packet_number: u64,
        acked_bytes: u64,
        prior_in_flight: u64,
        event_time: Instant,
    ) {
        self.largest_acked_packet_number =
            cmp::max(Some(packet_number), self.largest_acked_packet_number);
        if self.in_recovery() {
            return;
        }
        self.maybe_increase_cwnd(acked_bytes, prior_in_flight, event_time);
        if self.in_slow_start() {
            self.slow_start.on_packet_acked(packet_number);
        }
    }

    /// Callback for a packet declared lost.
    ///
    /// Losses of packets already covered by the last cutback fold into
    /// that congestion event and are ignored.
    pub fn on_packet_lost(&mut self, packet_number: u64, lost_bytes: u64, prior_in_flight: u64) {
        if self.in_low_slow_start() {
            // HyStart++ is single-shot: the first loss in Limited Slow
            // Start downgrades to classic slow start for the rest of the
            // connection.
            self.slow_start = SlowStartVariant::new(StartAlgorithm::SlowStart);
            self.maybe_trace_state_change(CongestionState::CongestionAvoidance);
        }

        if Some(packet_number) <= self.largest_sent_at_last_cutback {
            return;
        }
        trace!(
            "packet {} lost, {} bytes, {} bytes in flight before",
            packet_number,
            lost_bytes,
            prior_in_flight
        );

        self.last_cutback_exited_slowstart = self.in_slow_start();
        self.maybe_trace_state_change(CongestionState::Recovery);

        self.congestion_window = match self.congestion_algorithm {
            CongestionAlgorithm::NewReno => (self.congestion_window as f64 * RENO_BETA) as u64,
            CongestionAlgorithm::Cubic => self.cubic.window_after_loss(self.congestion_window),
        };
        self.congestion_window = cmp::max(self.congestion_window, self.min_congestion_window());

        self.slow_start_threshold = self.congestion_window;
        self.largest_sent_at_last_cutback = self.largest_sent_packet_number;
        // The ack count restarts once the sender is out of recovery.
        self.num_acked_packets = 0;
    }

    /// Callback for a retransmission timeout.
    pub fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        self.largest_sent_at_last_cutback = None;
        if !packets_retransmitted {
            return;
        }
        debug!(
            "retransmission timeout, cwnd collapses from {} to {}",
            self.congestion_window,
            self.min_congestion_window()
        );
        self.slow_start.restart();
        self.cubic.reset();
        self.slow_start_threshold = self.congestion_window / 2;
        self.congestion_window = self.min_congestion_window();
    }

    /// Callback for a connection migration. The path changed, so all
    /// path-derived state returns to its initial value.
    pub fn on_connection_migration(&mut self) {
        debug!("connection migrated, congestion state reinitialized");
        self.slow_start.restart();
        self.cubic.reset();
        self.largest_sent_packet_number = None;
        self.largest_acked_packet_number = None;
        self.largest_sent_at_last_cutback = None;
        self.last_cutback_exited_slowstart = false;
        self.num_acked_packets = 0;
        self.congestion_window = self.initial_congestion_window;
        self.slow_start_threshold = u64::MAX;
    }

    /// Update the max datagram size. The size never shrinks; a shrink is
    /// a programming error and panics.
    pub fn set_max_datagram_size(&mut self, v: u64) {
        if v < self.max_datagram_size {
            panic!(
                "congestion BUG: max datagram size decreased from {} to {}",
                self.max_datagram_size, v
            );
        }
        let cwnd_is_min_cwnd = self.congestion_window == self.min_congestion_window();
        self.max_datagram_size = v;
        if cwnd_is_min_cwnd {
            self.congestion_window = self.min_congestion_window();
        }
        self.pacer.set_max_datagram_size(v);
    }

    /// Grow the congestion window for an ack, according to the current
    /// phase and the configured variants.
    fn maybe_increase_cwnd(&mut self, acked_bytes: u64, prior_in_flight: u64, event_time: Instant) {
        // Do not grow the window unless the sender actually gets close to
        // using it.
        if !self.is_cwnd_limited(prior_in_flight) {
            self.cubic.on_application_limited();
            self.maybe_trace_state_change(CongestionState::ApplicationLimited);
            return;
        }
        if self.congestion_window >= self.max_congestion_window() {
            return;
        }

        if self.in_slow_start() {
            self.maybe_trace_state_change(CongestionState::SlowStart);
            match &self.slow_start {
                SlowStartVariant::SlowStart | SlowStartVariant::Hystart(_) => {
                    // Exponential growth, one datagram per ack.
                    self.congestion_window += self.max_datagram_size;
                }
                SlowStartVariant::HystartPlusPlus(hspp) => {
                    self.congestion_window = hspp.slow_start_window(
                        acked_bytes,
                        self.congestion_window,
                        self.max_datagram_size,
                    );
                }
            }
        } else if self.in_low_slow_start() {
            // Limited Slow Start keeps the larger of the LSS growth and
            // the window the congestion avoidance variant would predict
            // for the same ack.
            self.maybe_trace_state_change(CongestionState::LowSlowStart);
            let ca_window = match self.congestion_algorithm {
                CongestionAlgorithm::NewReno => {
                    if self.num_acked_packets >= self.congestion_window / self.max_datagram_size {
                        self.congestion_window + self.max_datagram_size
                    } else {
                        self.congestion_window
                    }
                }
                CongestionAlgorithm::Cubic => cmp::min(
                    self.max_congestion_window(),
                    self.cubic.window_after_ack(
                        acked_bytes,
                        self.congestion_window,
                        self.rtt.min_rtt(),
                        event_time,
                        self.max_datagram_size,
                    ),
                ),
            };
            if let SlowStartVariant::HystartPlusPlus(hspp) = &self.slow_start {
                self.congestion_window = hspp.limited_slow_start_window(
                    acked_bytes,
                    self.congestion_window,
                    self.max_datagram_size,
                    self.slow_start_threshold,
                    ca_window,
                );
            }
        } else {
            self.maybe_trace_state_change(CongestionState::CongestionAvoidance);
            match self.congestion_algorithm {
                CongestionAlgorithm::NewReno => {
                    // Classic Reno: one datagram per window of acks.
                    self.num_acked_packets += 1;
                    if self.num_acked_packets >= self.congestion_window / self.max_datagram_size {
                        self.congestion_window += self.max_datagram_size;
                        self.num_acked_packets = 0;
                    }
                }
                CongestionAlgorithm::Cubic => {
                    self.congestion_window = self.cubic.window_after_ack(
                        acked_bytes,
                        self.congestion_window,
                        self.rtt.min_rtt(),
                        event_time,
                        self.max_datagram_size,
                    );
                }
            }
        }
        self.congestion_window = cmp::min(self.congestion_window, self.max_congestion_window());
    }

    /// Whether the sender is close enough to using the whole window for
    /// growth to be justified.
    fn is_cwnd_limited(&self, bytes_in_flight: u64) -> bool {
        if bytes_in_flight >= self.congestion_window {
            return true;
        }
        let available_bytes = self.congestion_window - bytes_in_flight;
        let slow_start_limited =
            self.in_slow_start() && bytes_in_flight > self.congestion_window / 2;
        slow_start_limited || available_bytes <= MAX_BURST_PACKETS * self.max_datagram_size
    }

    fn maybe_trace_state_change(&mut self, new_state: CongestionState) {
        if new_state == self.last_state {
            return;
        }
        trace!("congestion state moved from {} to {}", self.last_state, new_state);
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.updated_congestion_state(new_state);
        }
        self.last_state = new_state;
    }
}
