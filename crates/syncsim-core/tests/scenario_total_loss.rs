// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use syncsim_core::{TrialConfig, run_trial};

/// A channel that drops everything can never deliver a Reset or ResetAck,
/// so neither peer can ever leave its initial handshake attempt. This is
/// the boundary case the driver binary treats as a convergence failure.
#[test]
fn total_loss_never_converges() {
    let config = TrialConfig { loss_rate: 1.0, run_count: 1000, ..TrialConfig::default() };
    let outcome = run_trial(&config).unwrap();
    assert!(!outcome.converged());
    assert_eq!(outcome.alice_stats.resetack_recv, 0);
    assert_eq!(outcome.bob_stats.resetack_recv, 0);
}
