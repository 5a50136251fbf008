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

use super::bandwidth::Bandwidth;

/// The upper bound of burst size in packets. The budget never accumulates
/// beyond one full burst.
const MAX_BURST_PACKETS: u64 = 10;

/// Using a rate slightly higher than the measured bandwidth (for example,
/// 1.25 times) ensures that variations in RTT do not result in
/// underutilization of the congestion window.
/// See <https://www.rfc-editor.org/rfc/rfc9002.html#section-7.7>.
const RATE_RATIO_N_NUMERATOR: u64 = 5;
const RATE_RATIO_N_DENOMINATOR: u64 = 4;

/// A simple token-bucket pacer.
///
/// The budget refills lazily at the adjusted bandwidth passed in by the
/// sender; the bucket holds at most one burst. An infinite bandwidth
/// estimate (no RTT measurement yet) bypasses budget accounting.
///
/// Refer to:
/// <https://www.rfc-editor.org/rfc/rfc9002.html#section-7.7>.
#[derive(Debug)]
pub struct Pacer {
    /// Byte budget remaining at the time of the last sent packet.
    budget: u64,

    /// When the last packet was sent and the budget updated.
    last_sent_time: Option<Instant>,

    /// Max datagram size in bytes.
    max_datagram_size: u64,
}

impl Pacer {
    pub fn new(max_datagram_size: u64) -> Self {
        Self {
            budget: MAX_BURST_PACKETS * max_datagram_size,
            last_sent_time: None,
            max_datagram_size,
        }
    }

    fn max_burst_size(&self) -> u64 {
        MAX_BURST_PACKETS * self.max_datagram_size
    }

    /// The pacing rate in bytes per second for a given bandwidth
    /// estimate.
    fn adjusted_rate(rate: Bandwidth) -> u64 {
        rate.bytes_per_second() / RATE_RATIO_N_DENOMINATOR * RATE_RATIO_N_NUMERATOR
    }

    /// The byte budget available at `now`, given the current bandwidth
    /// estimate.
    pub fn budget(&self, now: Instant, rate: Bandwidth) -> u64 {
        if rate.is_infinite() {
            return self.max_burst_size();
        }
        let last_sent_time = match self.last_sent_time {
            Some(t) => t,
            None => return self.max_burst_size(),
        };

        let elapsed = now.saturating_duration_since(last_sent_time);
        let refill =
            (Self::adjusted_rate(rate) as u128 * elapsed.as_nanos() / 1_000_000_000) as u64;
        self.budget.saturating_add(refill).min(self.max_burst_size())
    }

    /// Consume budget after a packet was sent.
    pub fn on_packet_sent(&mut self, now: Instant, bytes: u64, rate: Bandwidth) {
        self.budget = self.budget(now, rate).saturating_sub(bytes);
        self.last_sent_time = Some(now);
    }

    /// The earliest time the next packet may leave, or `None` if it may
    /// leave immediately.
    pub fn time_until_send(&self, rate: Bandwidth) -> Option<Instant> {
        if self.budget >= self.max_datagram_size || rate.is_infinite() {
            return None;
        }
        let last_sent_time = self.last_sent_time?;

        let rate = Self::adjusted_rate(rate);
        if rate == 0 {
            return None;
        }

        let missing = self.max_datagram_size - self.budget;
        let wait =
            ((missing as u128 * 1_000_000_000 + rate as u128 - 1) / rate as u128) as u64;
        Some(last_sent_time + Duration::from_nanos(wait))
    }

    /// Update the max datagram size. The size never shrinks.
    pub fn set_max_datagram_size(&mut self, v: u64) {
        self.max_datagram_size = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DATAGRAM_SIZE: u64 = 1200;

    /// 1200 bytes/ms before the 5/4 adjustment, i.e. 1500 bytes/ms paced.
    fn rate() -> Bandwidth {
        Bandwidth::from_window_and_rtt(120 * MAX_DATAGRAM_SIZE, Duration::from_millis(120))
    }

    #[test]
    fn pacer_initial_burst() {
        let p = Pacer::new(MAX_DATAGRAM_SIZE);
        let now = Instant::now();

        // A full burst is available before anything was sent.
        assert_eq!(p.budget(now, rate()), MAX_BURST_PACKETS * MAX_DATAGRAM_SIZE);
        assert_eq!(p.time_until_send(rate()), None);
    }

    #[test]
    fn pacer_budget_consumption_and_refill() {
        let mut p = Pacer::new(MAX_DATAGRAM_SIZE);
        let now = Instant::now();

        for i in 0..MAX_BURST_PACKETS {
            assert!(p.budget(now, rate()) >= MAX_DATAGRAM_SIZE);
            p.on_packet_sent(now, MAX_DATAGRAM_SIZE, rate());
            assert_eq!(
                p.budget,
                (MAX_BURST_PACKETS - i - 1) * MAX_DATAGRAM_SIZE
            );
        }
        assert_eq!(p.budget(now, rate()), 0);

        // The adjusted rate is 1,500,000 bytes/s, so one datagram of
        // budget returns after 0.8ms.
        let later = now + Duration::from_micros(800);
        assert_eq!(p.budget(later, rate()), MAX_DATAGRAM_SIZE);

        // And the bucket never exceeds one burst.
        let much_later = now + Duration::from_secs(10);
        assert_eq!(
            p.budget(much_later, rate()),
            MAX_BURST_PACKETS * MAX_DATAGRAM_SIZE
        );
    }

    #[test]
    fn pacer_time_until_send() {
        let mut p = Pacer::new(MAX_DATAGRAM_SIZE);
        let now = Instant::now();

        for _ in 0..MAX_BURST_PACKETS {
            assert_eq!(p.time_until_send(rate()), None);
            p.on_packet_sent(now, MAX_DATAGRAM_SIZE, rate());
        }

        // Budget exhausted: the next slot is one datagram away at the
        // adjusted rate.
        let next = p.time_until_send(rate()).unwrap();
        assert_eq!(next - now, Duration::from_micros(800));
    }

    #[test]
    fn pacer_partial_budget_wait() {
        let mut p = Pacer::new(MAX_DATAGRAM_SIZE);
        let now = Instant::now();

        for _ in 0..MAX_BURST_PACKETS {
            p.on_packet_sent(now, MAX_DATAGRAM_SIZE, rate());
        }

        // Refill half a datagram, then only the other half is waited for.
        let later = now + Duration::from_micros(400);
        p.on_packet_sent(later, 0, rate());
        assert_eq!(p.budget, MAX_DATAGRAM_SIZE / 2);

        let next = p.time_until_send(rate()).unwrap();
        assert_eq!(next - later, Duration::from_micros(400));
    }

    #[test]
    fn pacer_infinite_bandwidth_sends_immediately() {
        let mut p = Pacer::new(MAX_DATAGRAM_SIZE);
        let now = Instant::now();

        for _ in 0..10 * MAX_BURST_PACKETS {
            assert_eq!(p.time_until_send(Bandwidth::INFINITE), None);
            assert_eq!(
                p.budget(now, Bandwidth::INFINITE),
                MAX_BURST_PACKETS * MAX_DATAGRAM_SIZE
            );
            p.on_packet_sent(now, MAX_DATAGRAM_SIZE, Bandwidth::INFINITE);
        }
    }

    #[test]
    fn pacer_set_max_datagram_size() {
        let mut p = Pacer::new(MAX_DATAGRAM_SIZE);
        p.set_max_datagram_size(MAX_DATAGRAM_SIZE * 2);
        assert_eq!(p.max_burst_size(), MAX_BURST_PACKETS * MAX_DATAGRAM_SIZE * 2);
    }
}
