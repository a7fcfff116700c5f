// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use clap::{Parser, ValueEnum};

/// Which peers to arm reboots on, mirroring the three sweeps
/// `original_source/sim_reboot.py` ran: Alice-only, Bob-only, and both
/// rebooting near-simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RebootPattern {
	None,
	Alice,
	Bob,
	Both,
}

#[derive(Debug, Parser)]
#[command(name = "syncsim-trial", about = "Run the reset/ack synchronization protocol through the discrete-event simulator")]
pub struct Config {
	/// Probability a message is dropped in transit, per channel.
	#[arg(long, env, default_value_t = 0.60)]
	pub loss_rate: f64,

	/// Floor added to every sampled delay, in microseconds.
	#[arg(long, env, default_value_t = 1.0)]
	pub min_delay_micros: f64,

	/// Mean of the exponential delay distribution, in microseconds.
	#[arg(long, env, default_value_t = 20.0)]
	pub mean_delay_micros: f64,

	/// Seconds after OK_OK that Alice reboots. Ignored unless `--pattern`
	/// includes Alice.
	#[arg(long, env, default_value_t = 10.0)]
	pub alice_reboot_at: f64,

	/// Seconds after OK_OK that Bob reboots. Ignored unless `--pattern`
	/// includes Bob.
	#[arg(long, env, default_value_t = 10.1)]
	pub bob_reboot_at: f64,

	/// Simulated downtime of a reboot.
	#[arg(long, env, default_value_t = 2.0)]
	pub reboot_delay: f64,

	/// Which peers reboot during the trial.
	#[arg(long, env, value_enum, default_value_t = RebootPattern::None)]
	pub pattern: RebootPattern,

	/// Number of scheduler events to run each trial for.
	#[arg(long, env, default_value_t = 2000)]
	pub run_count: u64,

	/// Number of trials to run. Stops at the first convergence failure.
	#[arg(long, env, default_value_t = 1)]
	pub trials: u64,

	/// PRNG seed. Drawn from OS entropy if unset.
	#[arg(long, env)]
	pub seed: Option<u64>,

	/// Suppress the per-trial human-readable summary line.
	#[arg(short, long, env)]
	pub quiet: bool,
}

impl Config {
	pub fn min_delay_seconds(&self) -> f64 {
		self.min_delay_micros / 1e6
	}

	pub fn mean_delay_seconds(&self) -> f64 {
		self.mean_delay_micros / 1e6
	}

	pub fn resolved_seed(&self) -> u64 {
		self.seed.unwrap_or_else(rand::random)
	}
}
