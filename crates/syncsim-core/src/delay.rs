// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::error::{Error, Result};

/// A one-way delay distribution a [`Channel`](crate::channel::Channel)
/// samples from for every message it forwards.
#[derive(Clone, Debug)]
pub enum DelaySource {
    /// `Exp(1/mean) + min_delay`. Matches `simulator/delay.py`'s
    /// `ExponentialDelay`.
    ExponentialWithFloor { min_delay: f64, mean: f64 },
    /// Uniform on `[lo, hi]`. Matches `simulator/delay.py`'s `UniformDelay`.
    Uniform { lo: f64, hi: f64 },
}

impl DelaySource {
    pub fn exponential_with_floor(min_delay: f64, mean: f64) -> Result<Self> {
        if min_delay < 0.0 {
            return Err(Error::NegativeDelay(min_delay));
        }
        if mean <= 0.0 {
            return Err(Error::NonPositiveMean(mean));
        }
        Ok(Self::ExponentialWithFloor { min_delay, mean })
    }

    pub fn uniform(lo: f64, hi: f64) -> Result<Self> {
        if lo < 0.0 || hi < lo {
            return Err(Error::InvalidUniformRange { lo, hi });
        }
        Ok(Self::Uniform { lo, hi })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Self::ExponentialWithFloor { min_delay, mean } => {
                let exp = Exp::new(1.0 / mean).expect("mean validated positive at construction");
                exp.sample(rng) + min_delay
            }
            Self::Uniform { lo, hi } => {
                if lo == hi {
                    lo
                } else {
                    rng.random_range(lo..hi)
                }
            }
        }
    }
}
