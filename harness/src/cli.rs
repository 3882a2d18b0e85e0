/*
 * Created on Wed Sep 30 2026
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

use {
    crate::{
        config::{
            Deployment, ExperimentConfig, SeedPolicy, Workload, WorkloadConfig, YcsbWorkload,
        },
        fault::{FaultPlan, RestartTiming},
        recovery::DEFAULT_INPUT,
        warmup::WarmupWorkload,
    },
    clap::{Args, Parser, Subcommand},
    std::{path::PathBuf, time::Duration},
};

#[derive(Parser, Debug)]
#[command(
    name = "crdb-harness",
    author,
    version,
    about = "Benchmarks a baseline and a thesis build of CockroachDB and compares them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: HarnessWhat,
}

#[derive(Subcommand, Debug)]
pub enum HarnessWhat {
    /// Build the toolchain image and compile both database binaries
    Build,
    /// Run an experiment
    Run {
        #[command(subcommand)]
        workload: RunWorkload,
    },
    /// Aggregate and compare the artifacts of a finished experiment
    Analyze {
        #[arg(long, help = "Name of the experiment", value_name = "NAME")]
        name: String,
        #[arg(long, help = "Number of samples the experiment ran", value_name = "COUNT")]
        sample_size: usize,
    },
    /// Compare throughput over time with and without a ramp
    Warmup {
        #[arg(value_enum)]
        workload: WarmupWorkload,
        #[arg(long, help = "Experiment that ran without a ramp", value_name = "NAME")]
        without_ramp: Option<String>,
        #[arg(long, help = "Experiment that ran with a ramp", value_name = "NAME")]
        with_ramp: Option<String>,
        #[arg(long, help = "Seconds of each series to keep", value_name = "SECS")]
        limit: Option<f64>,
    },
    /// Compare per-replica recovery times after a node restart
    Recovery {
        #[arg(
            long,
            help = "CSV with recovery times per variant",
            default_value = DEFAULT_INPUT,
            value_name = "PATH"
        )]
        input: PathBuf,
        #[arg(
            long,
            help = "Use this value for thesis runs that never recovered instead of dropping them",
            value_name = "MS"
        )]
        fill_missing: Option<f64>,
    },
}

impl HarnessWhat {
    pub fn description(&self) -> String {
        match self {
            HarnessWhat::Build => "build".to_owned(),
            HarnessWhat::Run { workload } => {
                format!("{} experiment `{}`", workload.name(), workload.common().name)
            }
            HarnessWhat::Analyze { name, .. } => format!("analysis of `{name}`"),
            HarnessWhat::Warmup { .. } => "warm-up comparison".to_owned(),
            HarnessWhat::Recovery { .. } => "recovery comparison".to_owned(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum RunWorkload {
    /// Run the YCSB workload
    Ycsb {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(
            long,
            value_enum,
            ignore_case = true,
            default_value = "a",
            help = "The YCSB workload mix"
        )]
        workload: YcsbWorkload,
    },
    /// Run the TPC-C workload
    Tpcc {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(
            long,
            help = "Number of warehouses",
            default_value_t = 10,
            value_name = "COUNT"
        )]
        warehouses: u32,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, value_enum, default_value_t = Deployment::Local)]
    pub deployment: Deployment,
    #[arg(long, help = "Name of the experiment", value_name = "NAME")]
    pub name: String,
    #[arg(
        long,
        help = "Runs per variant",
        default_value_t = 1,
        value_name = "COUNT"
    )]
    pub sample_size: usize,
    #[arg(
        long,
        help = "Server nodes per cluster",
        default_value_t = 3,
        value_name = "NODES"
    )]
    pub cluster_size: usize,
    #[arg(
        long,
        help = "How long the workload runs (e.g. 300s, 5m)",
        value_parser = humantime::parse_duration,
        value_name = "DURATION"
    )]
    pub duration: Duration,
    #[arg(
        long,
        help = "Warm-up period before the measured run",
        value_parser = humantime::parse_duration,
        value_name = "DURATION"
    )]
    pub ramp: Option<Duration>,
    #[arg(long, help = "Restart a server node during the run")]
    pub restart: bool,
    #[arg(
        long,
        help = "Node to restart (defaults to the last one)",
        value_name = "NODE"
    )]
    pub restart_node: Option<usize>,
    #[arg(
        long,
        help = "When to restart, as a fraction of the duration",
        default_value_t = RestartTiming::default(),
        value_name = "P/Q"
    )]
    pub restart_at: RestartTiming,
    #[arg(long, help = "Give both variants of a sample the same seed")]
    pub paired_seeds: bool,
}

impl RunWorkload {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ycsb { .. } => "ycsb",
            Self::Tpcc { .. } => "tpcc",
        }
    }
    fn common(&self) -> &CommonArgs {
        match self {
            Self::Ycsb { common, .. } | Self::Tpcc { common, .. } => common,
        }
    }
    pub fn to_config(&self) -> ExperimentConfig {
        let workload = match self {
            Self::Ycsb { workload, .. } => Workload::Ycsb {
                workload: *workload,
            },
            Self::Tpcc { warehouses, .. } => Workload::Tpcc {
                warehouses: *warehouses,
            },
        };
        let common = self.common();
        ExperimentConfig {
            name: common.name.clone(),
            deployment: common.deployment,
            sample_size: common.sample_size,
            cluster_size: common.cluster_size,
            workload: WorkloadConfig {
                workload,
                duration: common.duration,
                ramp: common.ramp,
            },
            fault: common.restart.then(|| FaultPlan {
                node: common.restart_node.unwrap_or(common.cluster_size),
                timing: common.restart_at,
            }),
            seed_policy: if common.paired_seeds {
                SeedPolicy::Paired
            } else {
                SeedPolicy::Independent
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> HarnessWhat {
        Cli::try_parse_from(std::iter::once("crdb-harness").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ycsb_run() {
        let cmd = parse(&[
            "run", "ycsb", "--name", "smoke", "--duration", "10s", "--cluster-size", "1",
            "--workload", "A",
        ]);
        let HarnessWhat::Run { workload } = cmd else {
            panic!("expected a run")
        };
        let cfg = workload.to_config();
        assert_eq!(cfg.name, "smoke");
        assert_eq!(cfg.deployment, Deployment::Local);
        assert_eq!(cfg.sample_size, 1);
        assert_eq!(cfg.cluster_size, 1);
        assert_eq!(cfg.workload.duration, Duration::from_secs(10));
        assert_eq!(cfg.workload.workload.args(), vec!["--workload=A"]);
        assert_eq!(cfg.fault, None);
        assert_eq!(cfg.seed_policy, SeedPolicy::Independent);
    }

    #[test]
    fn tpcc_run_with_restart() {
        let cmd = parse(&[
            "run", "tpcc", "--deployment", "remote", "--name", "restart-remote",
            "--sample-size", "5", "--duration", "5m", "--ramp", "1m", "--warehouses", "50",
            "--restart", "--restart-at", "2/3", "--paired-seeds",
        ]);
        let HarnessWhat::Run { workload } = cmd else {
            panic!("expected a run")
        };
        let cfg = workload.to_config();
        assert_eq!(cfg.deployment, Deployment::Remote);
        assert_eq!(cfg.workload.ramp, Some(Duration::from_secs(60)));
        assert_eq!(cfg.workload.workload, Workload::Tpcc { warehouses: 50 });
        let fault = cfg.fault.unwrap();
        assert_eq!(fault.node, 3);
        assert_eq!(fault.delay(cfg.workload.duration), Duration::from_secs(200));
        assert_eq!(cfg.seed_policy, SeedPolicy::Paired);
    }

    #[test]
    fn bad_workload_letter() {
        assert!(Cli::try_parse_from([
            "crdb-harness", "run", "ycsb", "--name", "x", "--duration", "1s", "--workload", "G"
        ])
        .is_err());
    }

    #[test]
    fn analysis_commands() {
        assert!(matches!(
            parse(&["analyze", "--name", "smoke", "--sample-size", "3"]),
            HarnessWhat::Analyze { sample_size: 3, .. }
        ));
        assert!(matches!(
            parse(&["warmup", "tpcc", "--limit", "120"]),
            HarnessWhat::Warmup {
                workload: WarmupWorkload::Tpcc,
                limit: Some(_),
                ..
            }
        ));
        let HarnessWhat::Recovery { input, fill_missing } = parse(&["recovery"]) else {
            panic!("expected recovery")
        };
        assert_eq!(input, PathBuf::from(DEFAULT_INPUT));
        assert_eq!(fill_missing, None);
    }
}
