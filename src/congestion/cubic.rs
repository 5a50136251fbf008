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

/// Cubic constant C.
///
/// Constant that determines the aggressiveness of CUBIC in competing with
/// other congestion control algorithms in high-BDP networks. Default to 0.4.
///
/// See <https://www.rfc-editor.org/rfc/rfc9438.html#name-constants-of-interest>.
const C: f64 = 0.4;

/// Cubic constant beta.
///
/// Beta_cubic is the CUBIC multiplication decrease factor, that
/// is, when a congestion event is detected, CUBIC reduces its cwnd to
/// W_cubic(0) = W_max * beta_cubic. Default to 0.7.
///
/// See <https://www.rfc-editor.org/rfc/rfc9438.html#name-constants-of-interest>.
const BETA: f64 = 0.7;

/// Cubic constant alpha.
///
/// CUBIC additive increase factor used in the Reno-friendly region.
/// Default to 3 * (1 - beta) / (1 + beta).
///
/// See <https://www.rfc-editor.org/rfc/rfc9438.html#name-reno-friendly-region>.
const ALPHA: f64 = 3.0 * (1.0 - BETA) / (1.0 + BETA);

/// The per-ack window function of the CUBIC congestion avoidance
/// algorithm.
///
/// This is the pure curve computation; ownership of the congestion window
/// stays with the sender, which feeds the current window in and assigns
/// the result back.
///
/// See <https://www.rfc-editor.org/rfc/rfc9438.html>.
#[derive(Debug, Default)]
pub struct Cubic {
    /// Time of the first ack after the last congestion event. Unset
    /// while the window is cut back and during idle periods.
    epoch: Option<Instant>,

    /// The window size in bytes just before the window was reduced in the
    /// last congestion event.
    w_max: f64,

    /// Origin point of the cubic curve for the current epoch, in bytes.
    origin_window: f64,

    /// The time period in seconds that the curve takes to increase the
    /// window back to w_max if there are no further congestion events.
    k: f64,

    /// Estimated window to achieve the same average window size as
    /// standard TCP (Reno), in bytes.
    w_est: f64,

    /// Bytes acked since the estimated windows were last advanced.
    acked_bytes: u64,
}

impl Cubic {
    pub fn new() -> Self {
        Cubic::default()
    }

    /// Forget all curve state. Used on retransmission timeout and
    /// connection migration.
    pub fn reset(&mut self) {
        *self = Cubic::default();
    }

    /// Unset the epoch so that idle time accrues no growth credit.
    ///
    /// The curve is restarted from the current window at the next ack.
    pub fn on_application_limited(&mut self) {
        self.epoch = None;
    }

    /// Compute the congestion window after a packet loss.
    ///
    /// Records the pre-loss window as W_max and applies the
    /// multiplicative decrease.
    /// See <https://www.rfc-editor.org/rfc/rfc9438.html#name-multiplicative-decrease>.
    pub fn window_after_loss(&mut self, congestion_window: u64) -> u64 {
        self.w_max = congestion_window as f64;
        self.epoch = None;
        (congestion_window as f64 * BETA) as u64
    }

    /// Compute the congestion window after an ack of `acked_bytes`
    /// received at `event_time`.
    ///
    /// The target is W_cubic(t) = C*(t-K)^3 + W_max, extrapolated one
    /// `min_rtt` ahead, and never less than the Reno-friendly window.
    /// See <https://www.rfc-editor.org/rfc/rfc9438.html#name-window-increase-function>.
    pub fn window_after_ack(
        &mut self,
        acked_bytes: u64,
        congestion_window: u64,
        min_rtt: Duration,
        event_time: Instant,
        max_datagram_size: u64,
    ) -> u64 {
        self.acked_bytes = self.acked_bytes.saturating_add(acked_bytes);

        let epoch = match self.epoch {
            Some(epoch) => epoch,
            None => {
                // First ack after a congestion event or an idle period.
                self.acked_bytes = acked_bytes;
                self.w_est = congestion_window as f64;
                if self.w_max <= congestion_window as f64 {
                    // Already past the origin, grow convex from here.
                    self.k = 0.0;
                    self.origin_window = congestion_window as f64;
                } else {
                    // K = cubic_root((W_max - cwnd_epoch)/C)
                    self.k = ((self.w_max - congestion_window as f64)
                        / max_datagram_size as f64
                        / C)
                        .cbrt();
                    self.origin_window = self.w_max;
                }
                self.epoch = Some(event_time);
                event_time
            }
        };

        let t = event_time
            .saturating_duration_since(epoch)
            .saturating_add(min_rtt)
            .as_secs_f64();

        let delta = C * (t - self.k).powi(3) * max_datagram_size as f64;
        let target = (self.origin_window + delta)
            .min(congestion_window as f64 + self.acked_bytes as f64 / 2.0);

        // Advance the Reno-friendly window by approximately alpha
        // datagrams per window of acked bytes.
        self.w_est += ALPHA * self.acked_bytes as f64 * max_datagram_size as f64 / self.w_est;
        self.acked_bytes = 0;

        target.max(self.w_est) as u64
    }
}
