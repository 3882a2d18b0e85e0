/*
 * Created on Mon Aug 24 2026
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

//! Per-replica recovery times after a node restart, compared between the variants

use {
    crate::{
        compare::{self, ComparisonRow},
        report, HarnessError, HarnessResult,
    },
    libstats::{five_number_summary, mean, variance, Alternative},
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

pub const DEFAULT_INPUT: &str = "./runs/restart-remote/results/recovery_times.csv";

#[derive(Debug, Deserialize)]
struct RecoveryRow {
    recovery_per_replica_baseline: Option<f64>,
    recovery_per_replica_thesis: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOptions {
    pub input: PathBuf,
    /// Stand-in for thesis runs that never recovered; without it they are dropped
    pub fill_missing: Option<f64>,
}

/// The (baseline, thesis) recovery times. Empty and non-finite cells are missing
pub fn load_recovery_times(
    path: &Path,
    fill_missing: Option<f64>,
) -> HarnessResult<(Vec<f64>, Vec<f64>)> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        HarnessError::Other(format!("Failed to open `{}`: {e}", path.display()))
    })?;
    let (mut baseline, mut thesis) = (Vec::new(), Vec::new());
    for row in reader.deserialize::<RecoveryRow>() {
        let row = row?;
        if let Some(v) = row.recovery_per_replica_baseline.filter(|v| v.is_finite()) {
            baseline.push(v);
        }
        match (row.recovery_per_replica_thesis.filter(|v| v.is_finite()), fill_missing) {
            (Some(v), _) | (None, Some(v)) => thesis.push(v),
            (None, None) => {}
        }
    }
    Ok((baseline, thesis))
}

fn describe(label: &str, sample: &[f64]) {
    match five_number_summary(sample) {
        Some(s) => info!(
            "{label}: count={} mean={:.3} std={:.3} min={:.3} 25%={:.3} 50%={:.3} 75%={:.3} max={:.3}",
            sample.len(),
            mean(sample),
            variance(sample).sqrt(),
            s.min,
            s.q1,
            s.median,
            s.q3,
            s.max
        ),
        None => info!("{label}: no observations"),
    }
}

/// Test whether the thesis takes longer to recover and write the verdict to
/// `test-recovery.csv` next to the input
pub fn compare_recovery(opts: &RecoveryOptions) -> HarnessResult<Option<ComparisonRow>> {
    let (baseline, thesis) = load_recovery_times(&opts.input, opts.fill_missing)?;
    describe("baseline", &baseline);
    describe("thesis", &thesis);
    let row = compare::compare_samples(&baseline, &thesis, Alternative::Greater)?.map(
        |comparison| ComparisonRow {
            op_type: "recovery".to_owned(),
            metric: "recovery_per_replica",
            comparison,
        },
    );
    let out = opts
        .input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("test-recovery.csv");
    report::write_comparisons(&out, row.iter())?;
    match &row {
        Some(row) => report::log_comparison(row),
        None => warn!("Not enough recovery times to compare the variants"),
    }
    Ok(row)
}
