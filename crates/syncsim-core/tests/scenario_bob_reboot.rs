// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use syncsim_core::{RebootPlan, TrialConfig, run_trial};

/// Symmetric to the Alice-reboot scenario: the protocol is peer-symmetric,
/// so Bob rebooting alone must converge the same way.
#[test]
fn bob_reboot_alone_still_converges() {
    for seed in 400..408u64 {
        let config = TrialConfig {
            seed,
            bob_reboot: Some(RebootPlan { after: 10.0, delay: 2.0, recurring: false }),
            ..TrialConfig::default()
        };
        let outcome = run_trial(&config).unwrap();
        assert!(outcome.converged(), "seed {seed}: alice={:?} bob={:?}", outcome.alice_stats, outcome.bob_stats);
        assert!(outcome.bob_stats.reboots >= 1);
    }
}
