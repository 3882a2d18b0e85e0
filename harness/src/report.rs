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

//! Summary tables written under `<runs>/<name>/results` for the plotting tools

use {
    crate::{
        compare::{self, ComparisonRow, Metric},
        config::{HarnessConfig, Variant},
        telemetry::{self, TelemetryRow},
        util, HarnessResult,
    },
    libstats::five_number_summary,
    serde::Serialize,
    std::{
        collections::{BTreeMap, BTreeSet},
        path::{Path, PathBuf},
    },
};

const TELEMETRY_HEADER: [&str; 11] = [
    "experiment_type",
    "sample",
    "time",
    "errs",
    "avgt",
    "avgl",
    "p50l",
    "p95l",
    "p99l",
    "maxl",
    "type",
];

#[derive(Serialize)]
struct TelemetryCsvRow<'a> {
    experiment_type: Variant,
    sample: usize,
    time: &'a str,
    errs: u64,
    avgt: f64,
    avgl: f64,
    p50l: f64,
    p95l: f64,
    p99l: f64,
    maxl: f64,
    op_type: &'a str,
}

const SUMMARY_HEADER: [&str; 7] = ["experiment_type", "type", "min", "q1", "median", "q3", "max"];

#[derive(Serialize)]
struct SummaryRow<'a> {
    experiment_type: Variant,
    op_type: &'a str,
    min: f64,
    q1: f64,
    median: f64,
    q3: f64,
    max: f64,
}

const TEST_HEADER: [&str; 12] = [
    "type",
    "metric",
    "test",
    "alternative",
    "statistic",
    "p_value",
    "effect_size",
    "mean_baseline",
    "mean_thesis",
    "n_baseline",
    "n_thesis",
    "significant",
];

#[derive(Serialize)]
struct TestRow<'a> {
    op_type: &'a str,
    metric: &'a str,
    test: &'static str,
    alternative: &'static str,
    statistic: f64,
    p_value: f64,
    effect_size: f64,
    mean_baseline: f64,
    mean_thesis: f64,
    n_baseline: usize,
    n_thesis: usize,
    significant: bool,
}

/// Writes `header` followed by `rows`, so that empty tables still carry their header
fn write_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> HarnessResult<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    w.write_record(header)?;
    for row in rows {
        w.serialize(row)?;
    }
    w.flush()?;
    debug!("Wrote `{}`", path.display());
    Ok(())
}

pub fn write_telemetry(path: &Path, rows: &[TelemetryRow]) -> HarnessResult<()> {
    write_csv(
        path,
        &TELEMETRY_HEADER,
        rows.iter().map(|r| TelemetryCsvRow {
            experiment_type: r.variant,
            sample: r.sample,
            time: &r.record.time,
            errs: r.record.errs,
            avgt: r.record.avgt,
            avgl: r.record.avgl,
            p50l: r.record.p50l,
            p95l: r.record.p95l,
            p99l: r.record.p99l,
            maxl: r.record.maxl,
            op_type: &r.record.op_type,
        }),
    )
}

/// The five-number summary of `metric` per (variant, operation type)
pub fn write_metric_summary(path: &Path, rows: &[TelemetryRow], metric: Metric) -> HarnessResult<()> {
    let mut groups: BTreeMap<(Variant, &str), Vec<f64>> = BTreeMap::new();
    for r in rows {
        groups
            .entry((r.variant, r.record.op_type.as_str()))
            .or_default()
            .push(metric.value(&r.record));
    }
    let summaries = groups.iter().filter_map(|((variant, op), values)| {
        five_number_summary(values).map(|s| SummaryRow {
            experiment_type: *variant,
            op_type: op,
            min: s.min,
            q1: s.q1,
            median: s.median,
            q3: s.q3,
            max: s.max,
        })
    });
    write_csv(path, &SUMMARY_HEADER, summaries)
}

pub fn write_comparisons<'a>(
    path: &Path,
    rows: impl IntoIterator<Item = &'a ComparisonRow>,
) -> HarnessResult<()> {
    write_csv(
        path,
        &TEST_HEADER,
        rows.into_iter().map(|r| {
            let c = &r.comparison;
            TestRow {
                op_type: &r.op_type,
                metric: r.metric,
                test: c.test.as_str(),
                alternative: c.alternative.as_str(),
                statistic: c.statistic,
                p_value: c.p_value,
                effect_size: c.effect_size,
                mean_baseline: c.mean_baseline,
                mean_thesis: c.mean_thesis,
                n_baseline: c.n_baseline,
                n_thesis: c.n_thesis,
                significant: c.significant(),
            }
        }),
    )
}

pub fn log_comparison(row: &ComparisonRow) {
    let c = &row.comparison;
    info!(
        "{} `{}`: {} (thesis {}) p={:.4} d={:.3} mean {:.3} -> {:.3} [{}]",
        row.metric,
        row.op_type,
        c.test.as_str(),
        c.alternative,
        c.p_value,
        c.effect_size,
        c.mean_baseline,
        c.mean_thesis,
        if c.significant() { "significant" } else { "not significant" }
    );
}

#[derive(Debug)]
pub struct AnalysisSummary {
    pub rows: usize,
    pub comparisons: Vec<ComparisonRow>,
    pub results_dir: PathBuf,
}

/// Aggregate the telemetry of every run that isn't in `excluded`, compare the two
/// variants and write all result tables
pub fn analyze(
    cfg: &HarnessConfig,
    name: &str,
    sample_size: usize,
    excluded: &BTreeSet<(usize, Variant)>,
) -> HarnessResult<AnalysisSummary> {
    let rows = telemetry::aggregate(cfg, name, sample_size, excluded);
    let results_dir = cfg.results_dir(name);
    util::create_dir_all(&results_dir)?;
    write_telemetry(&results_dir.join("telemetry.csv"), &rows)?;
    for metric in Metric::ALL {
        write_metric_summary(&results_dir.join(format!("{metric}.csv")), &rows, metric)?;
    }
    let comparisons = compare::compare_table(&rows)?;
    for metric in Metric::ALL {
        write_comparisons(
            &results_dir.join(format!("test-{metric}.csv")),
            comparisons.iter().filter(|c| c.metric == metric.column()),
        )?;
    }
    if comparisons.is_empty() {
        warn!("Not enough samples in any group to compare the variants");
    }
    comparisons.iter().for_each(log_comparison);
    info!("Results written to `{}`", results_dir.display());
    Ok(AnalysisSummary {
        rows: rows.len(),
        comparisons,
        results_dir,
    })
}
