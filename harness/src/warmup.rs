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

//! Throughput over time for a run without a ramp and one with, to see how long the
//! cluster takes to warm up

use {
    crate::{
        config::{HarnessConfig, Variant},
        telemetry::{self, TelemetryRecord},
        util, HarnessError, HarnessResult,
    },
    chrono::{DateTime, FixedOffset},
    clap::ValueEnum,
    serde::Serialize,
    std::path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WarmupWorkload {
    Ycsb,
    Tpcc,
}

impl WarmupWorkload {
    pub const fn default_without_ramp(&self) -> &'static str {
        match self {
            Self::Ycsb => "ycsb-local-warmup-without-ramp",
            Self::Tpcc => "tpcc-local-warmup-without-ramp",
        }
    }
    pub const fn default_with_ramp(&self) -> &'static str {
        match self {
            Self::Ycsb => "ycsb-local-warmup-with-ramp",
            Self::Tpcc => "tpcc-local-warmup-with-ramp",
        }
    }
    /// Seconds of the series that are kept
    pub const fn default_limit(&self) -> f64 {
        match self {
            Self::Ycsb => 800.0,
            Self::Tpcc => 400.0,
        }
    }
    /// Operation types plotted; `None` keeps all of them
    pub const fn operations(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Ycsb => None,
            Self::Tpcc => Some(&["newOrder", "orderStatus"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarmupOptions {
    pub workload: WarmupWorkload,
    pub without_ramp: String,
    pub with_ramp: String,
    pub limit: f64,
}

impl WarmupOptions {
    pub fn new(
        workload: WarmupWorkload,
        without_ramp: Option<String>,
        with_ramp: Option<String>,
        limit: Option<f64>,
    ) -> Self {
        Self {
            workload,
            without_ramp: without_ramp.unwrap_or_else(|| workload.default_without_ramp().to_owned()),
            with_ramp: with_ramp.unwrap_or_else(|| workload.default_with_ramp().to_owned()),
            limit: limit.unwrap_or_else(|| workload.default_limit()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmupPoint {
    pub series: &'static str,
    /// Seconds since the first record of the series
    pub time: f64,
    #[serde(rename = "type")]
    pub op_type: String,
    pub avgt: f64,
    pub avgl: f64,
}

fn parse_time(path: &Path, r: &TelemetryRecord) -> HarnessResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(&r.time).map_err(|e| {
        HarnessError::Telemetry(path.to_owned(), format!("bad timestamp `{}`: {e}", r.time))
    })
}

/// Every record of the run at `path` with its time relative to the first record,
/// keeping those before `limit` seconds and of the given operation types
pub fn load_series(
    path: &Path,
    series: &'static str,
    limit: f64,
    operations: Option<&[&str]>,
) -> HarnessResult<Vec<WarmupPoint>> {
    let records = telemetry::read_records(path)?;
    let times = records
        .iter()
        .map(|r| parse_time(path, r))
        .collect::<HarnessResult<Vec<_>>>()?;
    let start = match times.iter().min() {
        Some(start) => *start,
        None => return Ok(Vec::new()),
    };
    Ok(records
        .into_iter()
        .zip(times)
        .map(|(r, t)| WarmupPoint {
            series,
            time: (t - start).num_milliseconds() as f64 / 1000.0,
            op_type: r.op_type,
            avgt: r.avgt,
            avgl: r.avgl,
        })
        .filter(|p| p.time < limit)
        .filter(|p| operations.map_or(true, |ops| ops.contains(&p.op_type.as_str())))
        .collect())
}

/// Writes both series into `<with-ramp experiment>/results/warmup.csv` and returns
/// that path
pub fn compare_warmup(cfg: &HarnessConfig, opts: &WarmupOptions) -> HarnessResult<PathBuf> {
    let ops = opts.workload.operations();
    let mut points = load_series(
        &cfg.run_paths(&opts.without_ramp, 1, Variant::Baseline).client_output(),
        "without-ramp",
        opts.limit,
        ops,
    )?;
    points.extend(load_series(
        &cfg.run_paths(&opts.with_ramp, 1, Variant::Baseline).client_output(),
        "with-ramp",
        opts.limit,
        ops,
    )?);
    let results = cfg.results_dir(&opts.with_ramp);
    util::create_dir_all(&results)?;
    let path = results.join("warmup.csv");
    let mut w = csv::Writer::from_path(&path)?;
    for p in &points {
        w.serialize(p)?;
    }
    w.flush()?;
    info!(
        "Wrote {} warm-up point(s) to `{}`",
        points.len(),
        path.display()
    );
    Ok(path)
}
