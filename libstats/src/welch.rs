/*
 * Created on Wed Sep 02 2026
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

//! Welch's unequal-variance two-sample t-test

use crate::{
    describe::{mean, variance},
    dist::student_t_sf,
    ensure_len, Alternative, StatsResult,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchT {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Tests whether the mean of `x` differs from the mean of `y` in the direction given
/// by `alternative`. Both samples need at least two observations
pub fn welch_t_test(x: &[f64], y: &[f64], alternative: Alternative) -> StatsResult<WelchT> {
    ensure_len(x, 2)?;
    ensure_len(y, 2)?;
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    let (vx, vy) = (variance(x) / nx, variance(y) / ny);
    let se = (vx + vy).sqrt();
    let diff = mean(x) - mean(y);
    let t = if se == 0.0 {
        if diff == 0.0 {
            f64::NAN
        } else {
            diff.signum() * f64::INFINITY
        }
    } else {
        diff / se
    };
    let df = if vx + vy == 0.0 {
        nx + ny - 2.0
    } else {
        (vx + vy).powi(2) / (vx * vx / (nx - 1.0) + vy * vy / (ny - 1.0))
    };
    let p_value = match alternative {
        Alternative::Greater => student_t_sf(t, df),
        Alternative::Less => student_t_sf(-t, df),
        Alternative::TwoSided => (2.0 * student_t_sf(t.abs(), df)).min(1.0),
    };
    Ok(WelchT { t, df, p_value })
}
