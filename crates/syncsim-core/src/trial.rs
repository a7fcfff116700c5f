// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::channel::Channel;
use crate::delay::DelaySource;
use crate::error::Result;
use crate::peer::{Peer, Stats};
use crate::scheduler::{RunReport, Scheduler};

/// A reboot arming: seconds after construction to trigger, how long the
/// simulated downtime lasts, and whether it repeats.
#[derive(Debug, Clone, Copy)]
pub struct RebootPlan {
    pub after: f64,
    pub delay: f64,
    pub recurring: bool,
}

/// Everything needed to reproduce one two-peer trial, mirroring
/// `sim_reboot.py`'s `run_trial`.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    pub seed: u64,
    pub loss_rate: f64,
    pub min_delay: f64,
    pub mean_delay: f64,
    pub run_count: u64,
    pub alice_reboot: Option<RebootPlan>,
    pub bob_reboot: Option<RebootPlan>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            loss_rate: 0.60,
            min_delay: 1e-6,
            mean_delay: 20e-6,
            run_count: 2000,
            alice_reboot: None,
            bob_reboot: None,
        }
    }
}

/// Result of running one trial to completion.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub seed: u64,
    pub alice_ready: bool,
    pub bob_ready: bool,
    pub alice_stats: Stats,
    pub bob_stats: Stats,
    pub run_report: RunReport,
}

impl TrialOutcome {
    /// A trial converges when both peers end synchronized. Anything else is
    /// the "convergence failure" the driver binary treats as a test failure.
    pub fn converged(&self) -> bool {
        self.alice_ready && self.bob_ready
    }
}

/// Build and run a single two-peer trial under `config`.
pub fn run_trial(config: &TrialConfig) -> Result<TrialOutcome> {
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(config.seed)));
    let mut sched = Scheduler::new();

    let delay_source = DelaySource::exponential_with_floor(config.min_delay, config.mean_delay)?;
    let alice_channel = Channel::new(config.loss_rate, delay_source.clone(), Rc::clone(&rng))?;
    let bob_channel = Channel::new(config.loss_rate, delay_source, Rc::clone(&rng))?;

    let alice = Peer::new(&mut sched, "ALICE", alice_channel, Rc::clone(&rng));
    let bob = Peer::new(&mut sched, "BOB", bob_channel, rng);
    Peer::set_peer(&alice, &bob);
    Peer::set_peer(&bob, &alice);

    if let Some(plan) = config.alice_reboot {
        Peer::reboot_after(&alice, &mut sched, plan.after, plan.delay, plan.recurring);
    }
    if let Some(plan) = config.bob_reboot {
        Peer::reboot_after(&bob, &mut sched, plan.after, plan.delay, plan.recurring);
    }

    let run_report = sched.run_count(config.run_count)?;

    alice.borrow().print_stats();
    bob.borrow().print_stats();

    Ok(TrialOutcome {
        seed: config.seed,
        alice_ready: alice.borrow().is_data_ready(),
        bob_ready: bob.borrow().is_data_ready(),
        alice_stats: alice.borrow().stats(),
        bob_stats: bob.borrow().stats(),
        run_report,
    })
}
