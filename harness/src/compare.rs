/*
 * Created on Tue Sep 01 2026
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

//! Baseline vs. thesis hypothesis tests. Each metric has a fixed direction: the thesis
//! is expected to have more throughput and less latency

use {
    crate::{config::Variant, telemetry::{TelemetryRecord, TelemetryRow}, HarnessResult},
    libstats::{cohens_d, mann_whitney_u, mean, shapiro_wilk, welch_t_test, Alternative},
    std::{collections::BTreeSet, fmt},
};

/// Significance level for both the normality gate and the final verdict
pub const ALPHA: f64 = 0.05;
/// Groups smaller than this are not compared
pub const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Avgl,
    P50l,
    P95l,
    P99l,
    Maxl,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Avgl,
        Metric::P50l,
        Metric::P95l,
        Metric::P99l,
        Metric::Maxl,
    ];
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Avgl => "avgl",
            Self::P50l => "p50l",
            Self::P95l => "p95l",
            Self::P99l => "p99l",
            Self::Maxl => "maxl",
        }
    }
    /// `avgl` is a throughput, everything else a latency
    pub const fn alternative(&self) -> Alternative {
        match self {
            Self::Avgl => Alternative::Greater,
            Self::P50l | Self::P95l | Self::P99l | Self::Maxl => Alternative::Less,
        }
    }
    pub fn value(&self, r: &TelemetryRecord) -> f64 {
        match self {
            Self::Avgl => r.avgl,
            Self::P50l => r.p50l,
            Self::P95l => r.p95l,
            Self::P99l => r.p99l,
            Self::Maxl => r.maxl,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    WelchT,
    MannWhitneyU,
}

impl TestKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WelchT => "welch-t",
            Self::MannWhitneyU => "mann-whitney-u",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub test: TestKind,
    pub alternative: Alternative,
    pub statistic: f64,
    pub p_value: f64,
    /// Cohen's d, thesis minus baseline
    pub effect_size: f64,
    pub mean_baseline: f64,
    pub mean_thesis: f64,
    pub n_baseline: usize,
    pub n_thesis: usize,
}

impl Comparison {
    pub fn significant(&self) -> bool {
        self.p_value < ALPHA
    }
}

/// The Shapiro-Wilk p-value, or `None` when the sample is too small to tell
fn normality(sample: &[f64]) -> Option<f64> {
    shapiro_wilk(sample).ok().map(|r| r.p_value)
}

fn is_normal(sample: &[f64]) -> bool {
    normality(sample).map_or(false, |p| p >= ALPHA)
}

/// Test whether `thesis` beats `baseline` in the direction of `alternative`. Returns
/// `None` when either group is too small
pub fn compare_samples(
    baseline: &[f64],
    thesis: &[f64],
    alternative: Alternative,
) -> HarnessResult<Option<Comparison>> {
    if baseline.len() < MIN_OBSERVATIONS || thesis.len() < MIN_OBSERVATIONS {
        return Ok(None);
    }
    let (test, statistic, p_value) = if is_normal(baseline) && is_normal(thesis) {
        let r = welch_t_test(thesis, baseline, alternative)?;
        (TestKind::WelchT, r.t, r.p_value)
    } else {
        let r = mann_whitney_u(thesis, baseline, alternative)?;
        (TestKind::MannWhitneyU, r.u, r.p_value)
    };
    Ok(Some(Comparison {
        test,
        alternative,
        statistic,
        p_value,
        effect_size: cohens_d(thesis, baseline),
        mean_baseline: mean(baseline),
        mean_thesis: mean(thesis),
        n_baseline: baseline.len(),
        n_thesis: thesis.len(),
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub op_type: String,
    pub metric: &'static str,
    pub comparison: Comparison,
}

fn values(rows: &[TelemetryRow], variant: Variant, op: &str, metric: Metric) -> Vec<f64> {
    rows.iter()
        .filter(|r| r.variant == variant && r.record.op_type == op)
        .map(|r| metric.value(&r.record))
        .collect()
}

/// Compare every (metric, operation type) of the aggregated table. Pairs where a group
/// is too small are left out
pub fn compare_table(rows: &[TelemetryRow]) -> HarnessResult<Vec<ComparisonRow>> {
    let ops: BTreeSet<&str> = rows.iter().map(|r| r.record.op_type.as_str()).collect();
    let mut ret = Vec::new();
    for metric in Metric::ALL {
        for op in &ops {
            let baseline = values(rows, Variant::Baseline, op, metric);
            let thesis = values(rows, Variant::Thesis, op, metric);
            match compare_samples(&baseline, &thesis, metric.alternative())? {
                Some(comparison) => ret.push(ComparisonRow {
                    op_type: (*op).to_owned(),
                    metric: metric.column(),
                    comparison,
                }),
                None => debug!(
                    "Skipping {metric} of `{op}`: {} baseline and {} thesis observation(s)",
                    baseline.len(),
                    thesis.len()
                ),
            }
        }
    }
    Ok(ret)
}
