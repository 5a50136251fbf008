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

use core::str::FromStr;

use std::time::Duration;

use strum_macros::Display;
use strum_macros::EnumIter;

use crate::Error;
use crate::Result;
pub use bandwidth::Bandwidth;
pub use sender::Sender;

use hystart::Hystart;
use hystart_plus_plus::HystartPlusPlus;

/// Available slow start algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter)]
pub enum StartAlgorithm {
    /// Classic slow start grows the congestion window exponentially and
    /// only yields to congestion avoidance on loss.
    SlowStart,

    /// HyStart uses increase in round-trip delay as a heuristic to find
    /// an exit point from slow start before possible overshoot.
    #[default]
    Hystart,

    /// HyStart++ adds a Limited Slow Start phase between exponential and
    /// linear growth, and byte-counted window increase.
    /// See <https://www.rfc-editor.org/rfc/rfc9406.html>.
    HystartPlusPlus,
}

impl FromStr for StartAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<StartAlgorithm> {
        if algor.eq_ignore_ascii_case("slowstart") || algor.eq_ignore_ascii_case("ss") {
            Ok(StartAlgorithm::SlowStart)
        } else if algor.eq_ignore_ascii_case("hystart") || algor.eq_ignore_ascii_case("h") {
            Ok(StartAlgorithm::Hystart)
        } else if algor.eq_ignore_ascii_case("hystartpp")
            || algor.eq_ignore_ascii_case("hystart++")
            || algor.eq_ignore_ascii_case("hpp")
            || algor.eq_ignore_ascii_case("h++")
        {
            Ok(StartAlgorithm::HystartPlusPlus)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Available congestion avoidance algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter)]
pub enum CongestionAlgorithm {
    /// NewReno grows the congestion window by one datagram per window of
    /// acknowledged data and halves it multiplicatively on loss.
    /// See <https://www.rfc-editor.org/rfc/rfc6582.html>.
    #[default]
    NewReno,

    /// CUBIC uses a cubic function instead of a linear window increase
    /// function to improve scalability and stability under fast and
    /// long-distance networks.
    /// See <https://www.rfc-editor.org/rfc/rfc9438.html>.
    Cubic,
}

impl FromStr for CongestionAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionAlgorithm> {
        if algor.eq_ignore_ascii_case("newreno")
            || algor.eq_ignore_ascii_case("reno")
            || algor.eq_ignore_ascii_case("nr")
        {
            Ok(CongestionAlgorithm::NewReno)
        } else if algor.eq_ignore_ascii_case("cubic") || algor.eq_ignore_ascii_case("c") {
            Ok(CongestionAlgorithm::Cubic)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion state of a sender, as reported to the tracer.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Display)]
pub enum CongestionState {
    /// Exponential window growth.
    SlowStart,

    /// Limited Slow Start, only reachable under HyStart++.
    LowSlowStart,

    /// Linear (NewReno) or cubic window growth.
    CongestionAvoidance,

    /// A loss cutback happened and acks up to the cutback point are
    /// ignored for window growth.
    Recovery,

    /// The sender does not use enough of the window for it to grow.
    ApplicationLimited,
}

/// Observer for congestion state transitions.
///
/// The sender invokes the callback only when the state differs from the
/// last reported one. Callbacks are issued from the connection's event
/// loop and must not block.
pub trait CongestionTracer {
    /// Called when the congestion state changed.
    fn updated_congestion_state(&mut self, state: CongestionState);
}

impl std::fmt::Debug for dyn CongestionTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "congestion tracer.")
    }
}

/// Per-connection state of the configured slow start variant.
///
/// Each variant carries its own detector state; the sender dispatches the
/// shared capability set (sent/acked/should-exit/restart) through this
/// enum.
#[derive(Debug)]
pub(crate) enum SlowStartVariant {
    SlowStart,
    Hystart(Hystart),
    HystartPlusPlus(HystartPlusPlus),
}

impl SlowStartVariant {
    pub(crate) fn new(algorithm: StartAlgorithm) -> Self {
        match algorithm {
            StartAlgorithm::SlowStart => SlowStartVariant::SlowStart,
            StartAlgorithm::Hystart => SlowStartVariant::Hystart(Hystart::new()),
            StartAlgorithm::HystartPlusPlus => {
                SlowStartVariant::HystartPlusPlus(HystartPlusPlus::new())
            }
        }
    }

    /// The algorithm this state belongs to.
    pub(crate) fn algorithm(&self) -> StartAlgorithm {
        match self {
            SlowStartVariant::SlowStart => StartAlgorithm::SlowStart,
            SlowStartVariant::Hystart(_) => StartAlgorithm::Hystart,
            SlowStartVariant::HystartPlusPlus(_) => StartAlgorithm::HystartPlusPlus,
        }
    }

    /// Callback after a retransmittable packet was sent.
    pub(crate) fn on_packet_sent(&mut self, packet_number: u64) {
        match self {
            SlowStartVariant::SlowStart => (),
            SlowStartVariant::Hystart(h) => h.on_packet_sent(packet_number),
            SlowStartVariant::HystartPlusPlus(h) => h.on_packet_sent(packet_number),
        }
    }

    /// Callback after a packet was acked while in slow start.
    pub(crate) fn on_packet_acked(&mut self, packet_number: u64) {
        match self {
            SlowStartVariant::SlowStart => (),
            SlowStartVariant::Hystart(h) => h.on_packet_acked(packet_number),
            SlowStartVariant::HystartPlusPlus(h) => h.on_packet_acked(packet_number),
        }
    }

    /// Feed one RTT sample and check for the slow start exit signal.
    ///
    /// Classic slow start never signals an exit.
    pub(crate) fn should_exit_slow_start(
        &mut self,
        latest_rtt: Duration,
        congestion_window: u64,
        max_datagram_size: u64,
    ) -> bool {
        match self {
            SlowStartVariant::SlowStart => false,
            SlowStartVariant::Hystart(h) => {
                h.should_exit_slow_start(latest_rtt, congestion_window, max_datagram_size)
            }
            SlowStartVariant::HystartPlusPlus(h) => {
                h.should_exit_slow_start(latest_rtt, congestion_window, max_datagram_size)
            }
        }
    }

    /// Restart the detector from a clean state.
    pub(crate) fn restart(&mut self) {
        match self {
            SlowStartVariant::SlowStart => (),
            SlowStartVariant::Hystart(h) => h.restart(),
            SlowStartVariant::HystartPlusPlus(h) => h.restart(),
        }
    }

    /// Whether HyStart++ is in its Limited Slow Start phase.
    pub(crate) fn in_lss(&self) -> bool {
        match self {
            SlowStartVariant::HystartPlusPlus(h) => h.in_lss(),
            _ => false,
        }
    }
}


mod bandwidth;
mod cubic;
mod hystart;
mod hystart_plus_plus;
mod pacing;
mod sender;
