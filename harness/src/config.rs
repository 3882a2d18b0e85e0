/*
 * Created on Wed Sep 16 2026
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

//! Experiment configuration and the harness-wide settings threaded through every
//! component

use {
    crate::{fault::FaultPlan, poll::PollPolicy, util, HarnessError, HarnessResult},
    clap::ValueEnum,
    serde::Serialize,
    std::{
        fmt,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Environment variable holding the cloud project id
pub const VAR_PROJECT_ID: &str = "PROJECT_ID";
pub const VAR_RUNS_DIR: &str = "CRDB_HARNESS_RUNS_DIR";
pub const VAR_ZONE: &str = "CRDB_HARNESS_ZONE";
pub const VAR_TF_DIR: &str = "CRDB_HARNESS_TF_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Deployment {
    /// Containers on this machine, one cluster at a time
    Local,
    /// Cloud instances provisioned with terraform, all clusters at once
    Remote,
}

impl Deployment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Baseline,
    Thesis,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Baseline, Variant::Thesis];
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Thesis => "thesis",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum YcsbWorkload {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl YcsbWorkload {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }
}

/// The workload generator and its workload-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Ycsb { workload: YcsbWorkload },
    Tpcc { warehouses: u32 },
}

impl Workload {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ycsb { .. } => "ycsb",
            Self::Tpcc { .. } => "tpcc",
        }
    }
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Ycsb { workload } => vec![format!("--workload={}", workload.as_str())],
            Self::Tpcc { warehouses } => vec![format!("--warehouses={warehouses}")],
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.args().join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    /// A fresh seed for every (sample, variant)
    #[default]
    Independent,
    /// One seed per sample, shared by both variants
    Paired,
}

/// One cluster lifetime plus one client workload execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunIdentity {
    pub sample: usize,
    pub variant: Variant,
    pub seed: u64,
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sample {} ({}, seed {})",
            self.sample, self.variant, self.seed
        )
    }
}

/// What the workload client is asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub workload: Workload,
    pub duration: Duration,
    pub ramp: Option<Duration>,
}

impl WorkloadConfig {
    /// How long the client runs for, ramp included
    pub fn total_duration(&self) -> Duration {
        self.duration + self.ramp.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentConfig {
    pub name: String,
    pub deployment: Deployment,
    pub sample_size: usize,
    pub cluster_size: usize,
    pub workload: WorkloadConfig,
    pub fault: Option<FaultPlan>,
    pub seed_policy: SeedPolicy,
}

impl ExperimentConfig {
    pub fn validate(&self) -> HarnessResult<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || self.name.starts_with('.')
        {
            return Err(HarnessError::BadArguments(format!(
                "experiment name `{}` must be a non-empty path-safe identifier",
                self.name
            )));
        }
        if self.sample_size == 0 {
            return Err(HarnessError::BadArguments(
                "the sample size must be at least 1".to_owned(),
            ));
        }
        if self.cluster_size == 0 {
            return Err(HarnessError::BadArguments(
                "the cluster size must be at least 1".to_owned(),
            ));
        }
        if self.workload.duration.is_zero() {
            return Err(HarnessError::BadArguments(
                "the workload duration must be non-zero".to_owned(),
            ));
        }
        if let Some(fault) = &self.fault {
            if fault.node == 0 || fault.node > self.cluster_size {
                return Err(HarnessError::BadArguments(format!(
                    "cannot restart node {} in a cluster of {}",
                    fault.node, self.cluster_size
                )));
            }
        }
        Ok(())
    }
}

/// Fixed delays and poll budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Between cluster init, workload init and workload run
    pub settle: Duration,
    /// Between two local runs, so ports are vacated before reuse
    pub cooldown: Duration,
    pub start_poll: PollPolicy,
    /// Remote only: waits out client-side init until the timed run begins
    pub run_start_poll: PollPolicy,
    pub end_poll_interval: Duration,
    /// Extra end-poll attempts beyond the run's nominal length
    pub end_poll_slack: u32,
    pub transfer_poll: PollPolicy,
}

impl Timings {
    pub const STANDARD: Self = Self {
        settle: Duration::from_secs(5),
        cooldown: Duration::from_secs(15),
        start_poll: PollPolicy::new(Duration::from_secs(10), 30),
        run_start_poll: PollPolicy::new(Duration::from_secs(10), 90),
        end_poll_interval: Duration::from_secs(30),
        end_poll_slack: 20,
        transfer_poll: PollPolicy::new(Duration::from_secs(15), 20),
    };
    /// The end poll has to outlast the client run
    pub fn end_poll(&self, run_length: Duration) -> PollPolicy {
        let interval_ms = self.end_poll_interval.as_millis().max(1);
        let nominal = (run_length.as_millis() / interval_ms) as u32;
        PollPolicy::new(
            self.end_poll_interval,
            nominal.saturating_add(self.end_poll_slack),
        )
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub project_id: Option<String>,
    pub zone: String,
    /// Region of the artifact registry images are pushed to
    pub registry_region: String,
    pub registry: String,
    pub terraform_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub runs_dir: PathBuf,
    pub network: String,
    pub image_prefix: String,
    pub dockerfile: PathBuf,
    pub build_context: PathBuf,
    pub toolchain_dockerfile: PathBuf,
    pub toolchain_image: String,
    /// Host ports of node `i` are these plus `i - 1`
    pub sql_port: u16,
    pub http_port: u16,
    pub remote: RemoteConfig,
    pub timings: Timings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("./runs"),
            network: "crdb-net".to_owned(),
            image_prefix: "crdb-experiment".to_owned(),
            dockerfile: PathBuf::from("./../build/local/dockerfile"),
            build_context: PathBuf::from(".."),
            toolchain_dockerfile: PathBuf::from("./../build/crdb/dockerfile"),
            toolchain_image: "cockroach-builder".to_owned(),
            sql_port: 26257,
            http_port: 8080,
            remote: RemoteConfig {
                project_id: None,
                zone: "us-central1-a".to_owned(),
                registry_region: "us-central1".to_owned(),
                registry: "docker-registry".to_owned(),
                terraform_dir: PathBuf::from("infra"),
            },
            timings: Timings::STANDARD,
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.remote.project_id = util::get_var(VAR_PROJECT_ID).filter(|p| !p.is_empty());
        if let Some(dir) = util::get_var(VAR_RUNS_DIR) {
            cfg.runs_dir = PathBuf::from(dir);
        }
        if let Some(zone) = util::get_var(VAR_ZONE) {
            // us-central1-a -> us-central1
            if let Some((region, _)) = zone.rsplit_once('-') {
                cfg.remote.registry_region = region.to_owned();
            }
            cfg.remote.zone = zone;
        }
        if let Some(dir) = util::get_var(VAR_TF_DIR) {
            cfg.remote.terraform_dir = PathBuf::from(dir);
        }
        cfg
    }
    pub fn project_id(&self) -> HarnessResult<&str> {
        self.remote.project_id.as_deref().ok_or_else(|| {
            HarnessError::Config(format!(
                "remote deployments need the `{VAR_PROJECT_ID}` environment variable"
            ))
        })
    }
    pub fn image_tag(&self, variant: Variant) -> String {
        format!("{}-{variant}", self.image_prefix)
    }
    /// The registry reference a variant's image is pushed to
    pub fn remote_image(&self, variant: Variant) -> HarnessResult<String> {
        Ok(format!(
            "{}-docker.pkg.dev/{}/{}/{}:latest",
            self.remote.registry_region,
            self.project_id()?,
            self.remote.registry,
            self.image_tag(variant)
        ))
    }
    pub fn experiment_dir(&self, name: &str) -> PathBuf {
        self.runs_dir.join(name)
    }
    pub fn results_dir(&self, name: &str) -> PathBuf {
        self.experiment_dir(name).join("results")
    }
    pub fn run_paths(&self, name: &str, sample: usize, variant: Variant) -> RunPaths {
        RunPaths {
            root: self
                .experiment_dir(name)
                .join(format!("run-{sample}"))
                .join(format!("experiment-{variant}")),
        }
    }
}

#[cfg(test)]
impl HarnessConfig {
    pub fn for_testing(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_owned(),
            remote: RemoteConfig {
                project_id: Some("test-project".to_owned()),
                ..Self::default().remote
            },
            timings: Timings {
                settle: Duration::ZERO,
                cooldown: Duration::ZERO,
                start_poll: PollPolicy::new(Duration::ZERO, 3),
                run_start_poll: PollPolicy::new(Duration::ZERO, 3),
                end_poll_interval: Duration::ZERO,
                end_poll_slack: 3,
                transfer_poll: PollPolicy::new(Duration::ZERO, 3),
            },
            ..Self::default()
        }
    }
}

/// Where one run's artifacts live:
/// `<runs>/<name>/run-<i>/experiment-<variant>/{data,logs,store}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
    pub fn client_output(&self) -> PathBuf {
        self.data_dir().join("client.txt")
    }
    pub fn histograms(&self) -> PathBuf {
        self.data_dir().join("hdrhistograms.json")
    }
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
    pub fn server_logs(&self, node: usize) -> PathBuf {
        self.logs_dir().join(format!("server-{node}"))
    }
    pub fn server_store(&self, node: usize) -> PathBuf {
        self.root.join("store").join(format!("server-{node}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::RestartTiming;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            name: "smoke".to_owned(),
            deployment: Deployment::Local,
            sample_size: 1,
            cluster_size: 3,
            workload: WorkloadConfig {
                workload: Workload::Ycsb {
                    workload: YcsbWorkload::A,
                },
                duration: Duration::from_secs(10),
                ramp: None,
            },
            fault: None,
            seed_policy: SeedPolicy::Independent,
        }
    }

    #[test]
    fn artifact_layout() {
        let cfg = HarnessConfig::default();
        let paths = cfg.run_paths("smoke", 1, Variant::Thesis);
        assert_eq!(
            paths.client_output(),
            PathBuf::from("./runs/smoke/run-1/experiment-thesis/data/client.txt")
        );
        assert_eq!(
            paths.histograms(),
            PathBuf::from("./runs/smoke/run-1/experiment-thesis/data/hdrhistograms.json")
        );
        assert_eq!(
            paths.server_logs(2),
            PathBuf::from("./runs/smoke/run-1/experiment-thesis/logs/server-2")
        );
        assert_eq!(cfg.results_dir("smoke"), PathBuf::from("./runs/smoke/results"));
    }

    #[test]
    fn images() {
        let mut cfg = HarnessConfig::default();
        assert_eq!(cfg.image_tag(Variant::Baseline), "crdb-experiment-baseline");
        assert!(matches!(
            cfg.remote_image(Variant::Baseline),
            Err(HarnessError::Config(_))
        ));
        cfg.remote.project_id = Some("proj".to_owned());
        assert_eq!(
            cfg.remote_image(Variant::Thesis).unwrap(),
            "us-central1-docker.pkg.dev/proj/docker-registry/crdb-experiment-thesis:latest"
        );
    }

    #[test]
    fn workload_args() {
        let ycsb = Workload::Ycsb {
            workload: YcsbWorkload::C,
        };
        assert_eq!(ycsb.name(), "ycsb");
        assert_eq!(ycsb.args(), vec!["--workload=C"]);
        let tpcc = Workload::Tpcc { warehouses: 10 };
        assert_eq!(tpcc.to_string(), "tpcc --warehouses=10");
    }

    #[test]
    fn validation() {
        assert!(config().validate().is_ok());
        let mut c = config();
        c.sample_size = 0;
        assert!(c.validate().is_err());
        let mut c = config();
        c.cluster_size = 0;
        assert!(c.validate().is_err());
        let mut c = config();
        c.name = "../escape".to_owned();
        assert!(c.validate().is_err());
        let mut c = config();
        c.fault = Some(FaultPlan {
            node: 4,
            timing: RestartTiming::default(),
        });
        assert!(c.validate().is_err());
        c.fault = Some(FaultPlan {
            node: 3,
            timing: RestartTiming::default(),
        });
        assert!(c.validate().is_ok());
    }

    #[test]
    fn end_poll_outlasts_the_run() {
        let t = Timings::STANDARD;
        let p = t.end_poll(Duration::from_secs(300));
        assert_eq!(p.max_attempts, 10 + 20);
        assert!(p.budget() > Duration::from_secs(300));
    }
}
