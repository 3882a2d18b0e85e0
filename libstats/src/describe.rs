/*
 * Created on Fri Oct 16 2026
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

//! Descriptive statistics

use crate::sorted;

/// Arithmetic mean (`NaN` for an empty sample)
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return f64::NAN;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Sample variance with one delta degree of freedom (`NaN` below two observations)
pub fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return f64::NAN;
    }
    let m = mean(sample);
    sample.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (sample.len() - 1) as f64
}

/// The `q`-th quantile using linear interpolation between the closest ranks
pub fn quantile(sample: &[f64], q: f64) -> f64 {
    if sample.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    let sorted = sorted(sample);
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Cohen's d for two independent samples: the difference of means (`x - y`) over the
/// pooled standard deviation
pub fn cohens_d(x: &[f64], y: &[f64]) -> f64 {
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    if nx + ny <= 2.0 || x.is_empty() || y.is_empty() {
        return f64::NAN;
    }
    let vx = if x.len() > 1 { variance(x) } else { 0.0 };
    let vy = if y.len() > 1 { variance(y) } else { 0.0 };
    let pooled = (((nx - 1.0) * vx + (ny - 1.0) * vy) / (nx + ny - 2.0)).sqrt();
    (mean(x) - mean(y)) / pooled
}

/// A five-number summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiveNumber {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Returns the five-number summary of the sample or `None` if it is empty
pub fn five_number_summary(sample: &[f64]) -> Option<FiveNumber> {
    if sample.is_empty() {
        return None;
    }
    let sorted = sorted(sample);
    Some(FiveNumber {
        min: sorted[0],
        q1: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q3: quantile_sorted(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}
