// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

mod config;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Config, RebootPattern};
use syncsim_core::{RebootPlan, TrialConfig, run_trial};

fn main() -> ExitCode {
	let config = Config::parse();

	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let seed = config.resolved_seed();
	let (alice_reboot, bob_reboot) = reboot_plans(&config);

	let mut trials_passed = 0u64;
	for offset in 0..config.trials {
		let trial_seed = seed.wrapping_add(offset);
		let trial_config = TrialConfig {
			seed: trial_seed,
			loss_rate: config.loss_rate,
			min_delay: config.min_delay_seconds(),
			mean_delay: config.mean_delay_seconds(),
			run_count: config.run_count,
			alice_reboot,
			bob_reboot,
		};

		let outcome = match run_trial(&trial_config) {
			Ok(outcome) => outcome,
			Err(err) => {
				eprintln!("trial seed={trial_seed} failed to construct: {err}");
				return ExitCode::FAILURE;
			}
		};

		if !config.quiet {
			println!(
				"trial {} seed={trial_seed} alice_ready={} bob_ready={} events={}",
				offset, outcome.alice_ready, outcome.bob_ready, outcome.run_report.events_executed
			);
		}

		if !outcome.converged() {
			eprintln!(
				"trial seed={trial_seed} terminated in failure mode: alice={:?} bob={:?}",
				outcome.alice_stats, outcome.bob_stats
			);
			eprintln!("{trials_passed} of {} trials passed before this failure", offset + 1);
			return ExitCode::FAILURE;
		}

		trials_passed += 1;
	}

	if !config.quiet {
		println!("all {trials_passed} trials converged");
	}
	ExitCode::SUCCESS
}

fn reboot_plans(config: &Config) -> (Option<RebootPlan>, Option<RebootPlan>) {
	let alice = matches!(config.pattern, RebootPattern::Alice | RebootPattern::Both).then(|| RebootPlan {
		after: config.alice_reboot_at,
		delay: config.reboot_delay,
		recurring: false,
	});
	let bob = matches!(config.pattern, RebootPattern::Bob | RebootPattern::Both).then(|| RebootPlan {
		after: config.bob_reboot_at,
		delay: config.reboot_delay,
		recurring: false,
	});
	(alice, bob)
}
