/*
 * Created on Wed Sep 23 2026
 *
 * This file is a part of crdb-harness
 * crdb-harness is an experiment harness that benchmarks a baseline and a
 * modified ("thesis") build of CockroachDB under YCSB and TPC-C workloads
 * and compares the two builds statistically.
 *
 * Copyright (c) 2026, the crdb-harness authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # libstats
//!
//! The statistics used to compare two experiment variants: normality checks,
//! one-sided two-sample tests, effect sizes and five-number summaries. All
//! routines are deterministic and work on plain `f64` slices.

#![deny(unused_crate_dependencies)]
#![deny(unused_imports)]

mod describe;
mod dist;
mod mannwhitney;
mod shapiro;
mod special;
mod welch;

use core::fmt;

pub use self::{
    describe::{cohens_d, five_number_summary, mean, quantile, variance, FiveNumber},
    dist::{normal_cdf, normal_quantile, normal_sf, student_t_sf},
    mannwhitney::{mann_whitney_u, MannWhitney},
    shapiro::{shapiro_wilk, ShapiroWilk},
    welch::{welch_t_test, WelchT},
};

pub type StatsResult<T> = Result<T, StatsError>;

/// The alternative hypothesis of a two-sample test. The first sample passed to a test
/// is the one the direction refers to: `Greater` means "the first sample tends to be
/// larger than the second"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alternative {
    Greater,
    Less,
    TwoSided,
}

impl Alternative {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => "greater",
            Self::Less => "less",
            Self::TwoSided => "two-sided",
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// The sample is smaller than what the routine needs
    TooFewObservations { need: usize, got: usize },
    /// The sample contains a NaN or an infinity
    NonFinite,
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewObservations { need, got } => write!(
                f,
                "need at least {need} observations but the sample has {got}"
            ),
            Self::NonFinite => write!(f, "sample contains non-finite values"),
        }
    }
}

impl std::error::Error for StatsError {}

pub(crate) fn ensure_len(sample: &[f64], need: usize) -> StatsResult<()> {
    if sample.len() < need {
        return Err(StatsError::TooFewObservations {
            need,
            got: sample.len(),
        });
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite);
    }
    Ok(())
}

/// Returns a sorted copy of the sample
pub(crate) fn sorted(sample: &[f64]) -> Vec<f64> {
    let mut v = sample.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}
