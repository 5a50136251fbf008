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

//! Congestion control and pacing for QUIC endpoints.
//!
//! This crate implements the sender-side congestion core of a QUIC
//! connection: a send algorithm combining a configurable slow start
//! variant (classic slow start, HyStart, or HyStart++) with a
//! configurable congestion avoidance variant (NewReno or CUBIC), driven
//! by packet sent/acked/lost and retransmission-timeout events.
//!
//! * **Send algorithm**: the [`Sender`] owns the congestion window and
//!   slow start threshold, and answers `can_send`-style queries for the
//!   packet scheduler.
//! * **Slow start exit**: HyStart and HyStart++ use per-round RTT delay
//!   increase as a heuristic to leave slow start before overshoot;
//!   HyStart++ passes through a Limited Slow Start phase first.
//! * **Pacing**: a token-bucket pacer spaces outgoing datagrams
//!   according to the current bandwidth estimate.
//! * **Observability**: congestion state transitions are reported to a
//!   caller-provided [`CongestionTracer`] and logged via the `log` facade.
//!
//! The surrounding QUIC stack is expected to perform loss detection, ack
//! scheduling and RTT sampling; this crate only consumes the resulting
//! events and the RTT view.

pub use crate::congestion::Bandwidth;
pub use crate::congestion::CongestionAlgorithm;
pub use crate::congestion::CongestionState;
pub use crate::congestion::CongestionTracer;
pub use crate::congestion::Sender;
pub use crate::congestion::StartAlgorithm;
pub use crate::rtt::RttEstimator;

/// Default outgoing UDP datagram payload size in bytes.
const DEFAULT_MAX_DATAGRAM_SIZE: u64 = 1200;

/// The default initial congestion window in packets.
const INITIAL_CONGESTION_WINDOW_PACKETS: u64 = 32;

/// The minimal congestion window in packets.
/// See RFC 9002 Section 7.2
const MIN_CONGESTION_WINDOW_PACKETS: u64 = 2;

/// Upper bound for the congestion window in packets. Growing the window
/// past this point stops regardless of the congestion avoidance variant.
const MAX_CONGESTION_WINDOW_PACKETS: u64 = 10000;

/// A specialized `Result` type for congestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error reported by the congestion stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configuration is invalid.
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Configuration for a [`Sender`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The maximum size of outgoing UDP payloads in bytes.
    pub(crate) max_datagram_size: u64,

    /// The initial congestion window in packets.
    pub(crate) initial_congestion_window: u64,

    /// The minimal congestion window in packets.
    pub(crate) min_congestion_window: u64,

    /// The maximal congestion window in packets.
    pub(crate) max_congestion_window: u64,

    /// The slow start algorithm used for a connection.
    pub(crate) start_algorithm: StartAlgorithm,

    /// The congestion avoidance algorithm used for a connection.
    pub(crate) congestion_algorithm: CongestionAlgorithm,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Set the initial maximum size of outgoing UDP payloads in bytes.
    ///
    /// The size can later grow through [`Sender::set_max_datagram_size`],
    /// but never shrink.
    pub fn set_max_datagram_size(&mut self, v: u64) {
        self.max_datagram_size = v;
    }

    /// Set the initial congestion window in packets.
    pub fn set_initial_congestion_window(&mut self, packets: u64) {
        self.initial_congestion_window = packets;
    }

    /// Set the minimal congestion window in packets.
    pub fn set_min_congestion_window(&mut self, packets: u64) {
        self.min_congestion_window = packets;
    }

    /// Set the maximal congestion window in packets.
    pub fn set_max_congestion_window(&mut self, packets: u64) {
        self.max_congestion_window = packets;
    }

    /// Set the slow start algorithm.
    pub fn set_start_algorithm(&mut self, algorithm: StartAlgorithm) {
        self.start_algorithm = algorithm;
    }

    /// Set the slow start algorithm by option name.
    ///
    /// Unrecognised names select the default algorithm (HyStart).
    pub fn set_start_algorithm_by_name(&mut self, name: &str) {
        self.start_algorithm = name.parse().unwrap_or_default();
    }

    /// Set the congestion avoidance algorithm.
    pub fn set_congestion_algorithm(&mut self, algorithm: CongestionAlgorithm) {
        self.congestion_algorithm = algorithm;
    }

    /// Set the congestion avoidance algorithm by option name.
    ///
    /// Unrecognised names select the default algorithm (NewReno).
    pub fn set_congestion_algorithm_by_name(&mut self, name: &str) {
        self.congestion_algorithm = name.parse().unwrap_or_default();
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            initial_congestion_window: INITIAL_CONGESTION_WINDOW_PACKETS,
            min_congestion_window: MIN_CONGESTION_WINDOW_PACKETS,
            max_congestion_window: MAX_CONGESTION_WINDOW_PACKETS,
            start_algorithm: StartAlgorithm::default(),
            congestion_algorithm: CongestionAlgorithm::default(),
        }
    }
}


#[path = "congestion/congestion.rs"]
pub mod congestion;

mod rtt;
