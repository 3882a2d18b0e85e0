/*
 * Created on Fri Aug 28 2026
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

#[macro_use]
extern crate log;
#[macro_use]
mod util;
mod build;
mod cli;
mod cluster;
mod compare;
mod config;
mod docker;
mod error;
mod experiment;
mod fault;
mod poll;
mod recovery;
mod remote;
mod report;
mod shell;
mod telemetry;
mod topology;
mod warmup;
mod workload;
#[cfg(test)]
mod tests;
use std::{env, process, sync::Arc};
use {
    crate::{
        cli::{Cli, HarnessWhat},
        config::HarnessConfig,
        docker::Docker,
        error::{HarnessError, HarnessResult},
        experiment::{Collaborators, Experiment},
        recovery::RecoveryOptions,
        remote::{Gcloud, Terraform},
        report::AnalysisSummary,
        warmup::WarmupOptions,
    },
    clap::Parser,
    env_logger::Builder,
};

fn main() {
    Builder::new()
        .parse_filters(&env::var("CRDB_HARNESS_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    if let Err(e) = runner() {
        error!("harness failed with: {}", e);
        process::exit(0x01);
    }
}

fn runner() -> HarnessResult<()> {
    let cli = Cli::parse();
    let harness = HarnessConfig::from_env();
    let description = cli.command.description();
    match cli.command {
        HarnessWhat::Build => build::build_binaries(&Docker::default(), &harness)?,
        HarnessWhat::Run { workload } => {
            let config = workload.to_config();
            let env = Collaborators {
                runtime: Arc::new(Docker::default()),
                provisioner: Arc::new(Terraform::new(&harness.remote.terraform_dir)),
                remote: Arc::new(Gcloud::new(
                    harness.remote.project_id.clone().unwrap_or_default(),
                    &harness.remote.zone,
                )),
            };
            let report = Experiment::new(&config, &harness, env).run(&mut rand::thread_rng())?;
            info!(
                "{} run(s) completed, {} failed, {} comparison(s) made",
                report.completed.len(),
                report.failed.len(),
                report.analysis.comparisons.len()
            );
            log_analysis(&report.analysis);
            for (run, reason) in &report.failed {
                warn!("{run} failed: {reason}");
            }
        }
        HarnessWhat::Analyze { name, sample_size } => {
            let analysis = experiment::analyze_existing(&harness, &name, sample_size)?;
            log_analysis(&analysis);
        }
        HarnessWhat::Warmup {
            workload,
            without_ramp,
            with_ramp,
            limit,
        } => {
            let opts = WarmupOptions::new(workload, without_ramp, with_ramp, limit);
            warmup::compare_warmup(&harness, &opts)?;
        }
        HarnessWhat::Recovery {
            input,
            fill_missing,
        } => {
            recovery::compare_recovery(&RecoveryOptions {
                input,
                fill_missing,
            })?;
        }
    }
    info!("Successfully finished running harness for {}", description);
    Ok(())
}

fn log_analysis(analysis: &AnalysisSummary) {
    info!(
        "Aggregated {} telemetry row(s) into {} comparison(s); results in {}",
        analysis.rows,
        analysis.comparisons.len(),
        analysis.results_dir.display()
    );
}
