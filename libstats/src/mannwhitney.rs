/*
 * Created on Fri Sep 18 2026
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

//! The Mann-Whitney U rank test

use crate::{dist::normal_sf, ensure_len, Alternative, StatsResult};

/// Samples up to this size (for the smaller of the two) use the exact null distribution
/// when there are no ties
const EXACT_MAX_SMALLER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MannWhitney {
    /// The U statistic of the first sample
    pub u: f64,
    pub p_value: f64,
    pub exact: bool,
}

/// Average ranks (1-based) of the pooled sample, plus the tie correction term
/// `sum(t^3 - t)` over all tie groups
fn rank_pooled(pooled: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..pooled.len()).collect();
    order.sort_by(|&a, &b| pooled[a].total_cmp(&pooled[b]));
    let mut ranks = vec![0.0; pooled.len()];
    let mut ties = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && pooled[order[j + 1]] == pooled[order[i]] {
            j += 1;
        }
        // positions i..=j share the average rank
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        let t = (j - i + 1) as f64;
        ties += t * t * t - t;
        i = j + 1;
    }
    (ranks, ties)
}

/// Frequencies of each value `0..=m*n` of U under the null hypothesis; these are the
/// coefficients of the Gaussian binomial `[m+n choose m]_q`
fn u_frequencies(m: usize, n: usize) -> Vec<f64> {
    let max = m * n;
    let mut c = vec![0.0; max + 1];
    c[0] = 1.0;
    for i in 1..=m {
        // multiply by (1 - q^(n+i))
        let shift = n + i;
        for k in (shift..=max).rev() {
            c[k] -= c[k - shift];
        }
        // divide by (1 - q^i)
        for k in i..=max {
            c[k] += c[k - i];
        }
    }
    c
}

/// `P(U >= u)` under the exact null distribution
fn exact_upper_tail(u: f64, m: usize, n: usize) -> f64 {
    let freq = u_frequencies(m, n);
    let total: f64 = freq.iter().sum();
    let from = u.ceil().max(0.0) as usize;
    let upper: f64 = freq.iter().skip(from).sum();
    (upper / total).min(1.0)
}

/// Tests whether values of `x` tend to be larger (`Greater`) or smaller (`Less`) than
/// values of `y`
pub fn mann_whitney_u(x: &[f64], y: &[f64], alternative: Alternative) -> StatsResult<MannWhitney> {
    ensure_len(x, 1)?;
    ensure_len(y, 1)?;
    let (n1, n2) = (x.len(), y.len());
    let pooled: Vec<f64> = x.iter().chain(y.iter()).copied().collect();
    let (ranks, ties) = rank_pooled(&pooled);
    let r1: f64 = ranks[..n1].iter().sum();
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let tested = match alternative {
        Alternative::Greater => u1,
        Alternative::Less => u2,
        Alternative::TwoSided => u1.max(u2),
    };
    let exact = ties == 0.0 && n1.min(n2) <= EXACT_MAX_SMALLER;
    let mut p_value = if exact {
        exact_upper_tail(tested, n1, n2)
    } else {
        let n = n1f + n2f;
        let mu = n1f * n2f / 2.0;
        let sigma = (n1f * n2f / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();
        if sigma == 0.0 {
            f64::NAN
        } else {
            normal_sf((tested - mu - 0.5) / sigma)
        }
    };
    if alternative == Alternative::TwoSided {
        p_value = (2.0 * p_value).min(1.0);
    }
    Ok(MannWhitney {
        u: u1,
        p_value,
        exact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_frequencies() {
        assert_eq!(u_frequencies(2, 2), vec![1.0, 1.0, 2.0, 1.0, 1.0]);
        assert_eq!(u_frequencies(1, 3), vec![1.0, 1.0, 1.0, 1.0]);
        // C(6, 3) arrangements in total
        let total: f64 = u_frequencies(3, 3).iter().sum();
        assert_eq!(total, 20.0);
    }

    #[test]
    fn exact_small_samples() {
        let r = mann_whitney_u(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0], Alternative::Greater).unwrap();
        assert!(r.exact);
        assert_eq!(r.u, 9.0);
        assert!((r.p_value - 0.05).abs() < 1e-12);
        let r = mann_whitney_u(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0], Alternative::Less).unwrap();
        assert!((r.p_value - 1.0).abs() < 1e-12);
        let r = mann_whitney_u(&[3.0, 1.0], &[2.0], Alternative::Greater).unwrap();
        assert_eq!(r.u, 1.0);
        assert!((r.p_value - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn asymptotic_for_larger_samples() {
        let x: Vec<f64> = (10..20).map(f64::from).collect();
        let y: Vec<f64> = (0..10).map(f64::from).collect();
        let r = mann_whitney_u(&x, &y, Alternative::Greater).unwrap();
        assert!(!r.exact);
        assert_eq!(r.u, 100.0);
        // z = (100 - 50 - 0.5) / sqrt(100 * 21 / 12)
        let z = 49.5 / (100.0f64 * 21.0 / 12.0).sqrt();
        assert!((r.p_value - normal_sf(z)).abs() < 1e-12);
        assert!(r.p_value < 1e-3);
    }

    #[test]
    fn ties_force_the_normal_approximation() {
        let r = mann_whitney_u(&[1.0, 2.0, 2.0], &[2.0, 3.0], Alternative::Less).unwrap();
        assert!(!r.exact);
        assert!(r.p_value > 0.0 && r.p_value < 1.0);
        let r = mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0], Alternative::Greater).unwrap();
        assert!(r.p_value.is_nan());
    }
}
