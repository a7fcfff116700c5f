// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use thiserror::Error;

/// Contract violations surfaced to a caller as `Result`.
///
/// These are the contract-violation error kinds: malformed construction
/// arguments, reentrancy, a retransmit timer started
/// while one was already pending, and sending before a peer is wired up.
/// Genuine protocol bugs (illegal FSM transitions, a channel timer firing on
/// an empty queue) are not represented here — they panic, because
/// recovering from them would misrepresent an implementation bug as
/// ordinary control flow.
#[derive(Debug, Error)]
pub enum Error {
    #[error("loss rate must be within [0.0, 1.0], got {0}")]
    InvalidLossRate(f64),

    #[error("delay must be non-negative, got {0}")]
    NegativeDelay(f64),

    #[error("exponential mean must be positive, got {0}")]
    NonPositiveMean(f64),

    #[error("uniform range must satisfy 0 <= lo <= hi, got lo={lo} hi={hi}")]
    InvalidUniformRange { lo: f64, hi: f64 },

    #[error("cannot call run()/run_until()/run_count() while the scheduler is already running")]
    ReentrantRun,

    #[error("retransmit timer already pending")]
    TimerAlreadyPending,

    #[error("peer must be set via Peer::set_peer before sending")]
    NilPeer,
}

pub type Result<T> = std::result::Result<T, Error>;
