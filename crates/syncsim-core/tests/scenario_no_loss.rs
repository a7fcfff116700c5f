// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use syncsim_core::{TrialConfig, run_trial};

/// A lossless channel with no reboots converges to OK_OK for both peers
/// well inside the default run_count budget, across many seeds.
#[test]
fn lossless_channel_converges_across_seeds() {
    for seed in 0..16u64 {
        let config = TrialConfig { seed, loss_rate: 0.0, run_count: 500, ..TrialConfig::default() };
        let outcome = run_trial(&config).unwrap();
        assert!(outcome.converged(), "seed {seed}: alice={:?} bob={:?}", outcome.alice_stats, outcome.bob_stats);
        assert!(outcome.alice_stats.reset_sent >= 1);
        assert!(outcome.bob_stats.reset_sent >= 1);
    }
}
