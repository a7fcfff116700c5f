// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

//! Discrete-event simulator for a symmetric peer-to-peer reset/ack
//! synchronization protocol running over an unreliable channel.
//!
//! Two [`peer::Peer`]s exchange `Reset`/`ResetAck` messages over a lossy,
//! FIFO, delay-distributed [`channel::Channel`] until each believes the
//! other has acknowledged the same generation number, at which point both
//! sides are in the `OK_OK` state and application data is admitted.
//! Everything runs on a single virtual clock owned by a [`scheduler::Scheduler`].

mod channel;
mod constants;
mod delay;
mod error;
mod event;
mod message;
mod peer;
mod scheduler;
mod trial;

pub use channel::{Channel, ChannelHandle};
pub use constants::{DEFAULT_BOOT_WINDOW, N_LOCAL_MAX, N_LOCAL_MIN, TIMEOUT_JITTER, TIMEOUT_MAX, TIMEOUT_MIN};
pub use delay::DelaySource;
pub use error::{Error, Result};
pub use event::EventHandle;
pub use message::{Message, PeerId};
pub use peer::{Peer, PeerHandle, Stats, State};
pub use scheduler::{RunReport, Scheduler};
pub use trial::{RebootPlan, TrialConfig, TrialOutcome, run_trial};
