/*
 * Created on Mon Sep 28 2026
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

//! Client telemetry. The workload client prints one JSON object per line with
//! cumulative statistics for each operation type, so the last line per type holds the
//! totals of the run

use {
    crate::{
        config::{HarnessConfig, Variant},
        HarnessError, HarnessResult,
    },
    serde::{Deserialize, Serialize},
    std::{collections::BTreeSet, fs, path::Path},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// RFC 3339 timestamp
    pub time: String,
    #[serde(default)]
    pub errs: u64,
    pub avgt: f64,
    /// Cumulative ops/s
    pub avgl: f64,
    pub p50l: f64,
    pub p95l: f64,
    pub p99l: f64,
    pub maxl: f64,
    #[serde(rename = "type")]
    pub op_type: String,
}

/// One row of the aggregated table
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRow {
    pub variant: Variant,
    pub sample: usize,
    pub record: TelemetryRecord,
}

fn is_json_object(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('{') && line.ends_with('}')
}

/// Every telemetry record in the file, in order. Lines that aren't a JSON object are
/// skipped
pub fn read_records(path: &Path) -> HarnessResult<Vec<TelemetryRecord>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| HarnessError::Telemetry(path.to_owned(), e.to_string()))?;
    let objects: Vec<&str> = raw.lines().map(str::trim).filter(|l| is_json_object(l)).collect();
    let array = format!("[{}]", objects.join(","));
    serde_json::from_str(&array).map_err(|e| HarnessError::Telemetry(path.to_owned(), e.to_string()))
}

/// The last record of each operation type, ordered by where that record appeared
pub fn terminal_records(records: Vec<TelemetryRecord>) -> Vec<TelemetryRecord> {
    let mut seen = BTreeSet::new();
    let mut ret: Vec<TelemetryRecord> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.op_type.clone()))
        .collect();
    ret.reverse();
    ret
}

pub fn load_run_telemetry(path: &Path) -> HarnessResult<Vec<TelemetryRecord>> {
    read_records(path).map(terminal_records)
}

/// Terminal records of every run of the experiment, baseline runs first. Runs in
/// `excluded` and runs whose telemetry is missing, empty or undecodable are skipped
pub fn aggregate(
    cfg: &HarnessConfig,
    name: &str,
    sample_size: usize,
    excluded: &BTreeSet<(usize, Variant)>,
) -> Vec<TelemetryRow> {
    let mut rows = Vec::new();
    for variant in Variant::ALL {
        for sample in 1..=sample_size {
            if excluded.contains(&(sample, variant)) {
                info!("Excluding failed run {sample} ({variant}) from the analysis");
                continue;
            }
            let path = cfg.run_paths(name, sample, variant).client_output();
            match load_run_telemetry(&path) {
                Ok(records) if records.is_empty() => {
                    warn!("Run {sample} ({variant}) produced no telemetry. Skipping it")
                }
                Ok(records) => rows.extend(records.into_iter().map(|record| TelemetryRow {
                    variant,
                    sample,
                    record,
                })),
                Err(e) => warn!("Skipping run {sample} ({variant}): {e}"),
            }
        }
    }
    info!("Aggregated {} telemetry row(s)", rows.len());
    rows
}
