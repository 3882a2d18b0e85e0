/*
 * Created on Mon Sep 07 2026
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

//! End-to-end runs of the scheduler against recording stand-ins for docker, terraform
//! and the remote shell

use {
    crate::{
        config::{
            Deployment, ExperimentConfig, HarnessConfig, SeedPolicy, Variant, Workload,
            WorkloadConfig, YcsbWorkload,
        },
        docker::{ContainerRuntime, ContainerSpec, ImageBuild},
        experiment::{Collaborators, Experiment, ExperimentReport},
        fault::{FaultPlan, RestartTiming},
        remote::{Provisioner, RemoteShell, TfVars, TransferError},
        telemetry::tests::line,
        workload::DATA_DIR,
        HarnessError, HarnessResult,
    },
    rand::{rngs::StdRng, SeedableRng},
    std::{
        collections::{BTreeMap, BTreeSet},
        fs,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    },
};

/// Client output of one run: two operation types, the thesis a bit faster
fn client_lines(thesis: bool, sample: usize) -> String {
    let bump = (if thesis { 50.0 } else { 0.0 }) + sample as f64;
    let tail = (if thesis { 8.0 } else { 11.0 }) + sample as f64 / 10.0;
    [
        "I240101 00:00:00 starting workload".to_owned(),
        line("read", 1, 10.0, 99.0),
        line("update", 1, 5.0, 99.0),
        line("read", 10, 100.0 + bump, tail),
        line("update", 10, 40.0 + bump, tail + 2.0),
    ]
    .join("\n")
}

#[derive(Default)]
struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    workload_runs: Mutex<usize>,
    /// 1-based ordinals of workload runs that exit non-zero
    fail_workload_runs: BTreeSet<usize>,
    fail_server: Option<String>,
    run_time: Duration,
}

impl FakeRuntime {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
    fn workload_run(&self, spec: &ContainerSpec) -> HarnessResult<()> {
        let ordinal = {
            let mut runs = self.workload_runs.lock().unwrap();
            *runs += 1;
            *runs
        };
        thread::sleep(self.run_time);
        if self.fail_workload_runs.contains(&ordinal) {
            return Err(HarnessError::ChildError("docker run".to_owned(), Some(1)));
        }
        let thesis = spec.image.ends_with("thesis");
        let sample = (ordinal + 1) / 2;
        if let Some(out) = &spec.stdout {
            fs::write(out, client_lines(thesis, sample)).unwrap();
        }
        let data = spec.volumes.iter().find(|v| v.target == DATA_DIR).unwrap();
        fs::write(Path::new(&data.source).join("hdrhistograms.json"), "{}").unwrap();
        Ok(())
    }
}

impl ContainerRuntime for FakeRuntime {
    fn build_image(&self, build: &ImageBuild) -> HarnessResult<()> {
        self.record(format!("build {}", build.tag));
        Ok(())
    }
    fn tag_image(&self, source: &str, target: &str) -> HarnessResult<()> {
        self.record(format!("tag {source} {target}"));
        Ok(())
    }
    fn push_image(&self, image: &str) -> HarnessResult<()> {
        self.record(format!("push {image}"));
        Ok(())
    }
    fn create_network(&self, name: &str, _: &str) -> HarnessResult<()> {
        self.record(format!("network {name}"));
        Ok(())
    }
    fn run(&self, spec: &ContainerSpec) -> HarnessResult<()> {
        let name = spec.name.clone().unwrap_or_else(|| "-".to_owned());
        self.record(format!("run {name} {}", spec.command.join(" ")));
        if self.fail_server.as_deref() == Some(name.as_str()) {
            return Err(HarnessError::ChildError(format!("start {name}"), Some(125)));
        }
        let is_workload_run = spec.command.iter().any(|a| a == "workload")
            && spec.command.iter().any(|a| a == "run");
        if is_workload_run {
            return self.workload_run(spec);
        }
        Ok(())
    }
    fn stop(&self, name: &str) -> HarnessResult<()> {
        self.record(format!("stop {name}"));
        Ok(())
    }
    fn remove(&self, name: &str) -> HarnessResult<()> {
        self.record(format!("rm {name}"));
        Ok(())
    }
    fn restart(&self, name: &str) -> HarnessResult<()> {
        self.record(format!("restart {name}"));
        Ok(())
    }
    fn is_running(&self, _: &str) -> HarnessResult<bool> {
        Ok(true)
    }
}

#[derive(Default)]
struct FakeProvisioner {
    calls: Mutex<Vec<&'static str>>,
    fail_apply: bool,
}

impl Provisioner for FakeProvisioner {
    fn apply(&self, vars: &TfVars) -> HarnessResult<()> {
        assert!(vars.get("client_cmds").is_some());
        self.calls.lock().unwrap().push("apply");
        if self.fail_apply {
            return Err(HarnessError::ChildError("terraform apply".to_owned(), Some(1)));
        }
        Ok(())
    }
    fn destroy(&self, _: &TfVars) -> HarnessResult<()> {
        self.calls.lock().unwrap().push("destroy");
        Ok(())
    }
}

/// Every client is seen running once, then exited. Each client output is missing on
/// the first attempt to fetch it
#[derive(Default)]
struct FakeShell {
    running_checks: Mutex<BTreeMap<String, u32>>,
    fetches: Mutex<BTreeMap<String, u32>>,
    /// What `docker inspect` reports once a client has exited
    exit_code: i32,
    /// How long a client stays up after it was first seen running
    run_time: Duration,
    /// The client never gets past workload init
    stuck_in_init: bool,
    /// `(target, command)` of every other command, in order
    execs: Mutex<Vec<(String, String)>>,
}

impl FakeShell {
    fn execs(&self) -> Vec<(String, String)> {
        self.execs.lock().unwrap().clone()
    }
    fn restarts(&self) -> Vec<(String, String)> {
        self.execs()
            .into_iter()
            .filter(|(_, command)| command.contains("restart"))
            .collect()
    }
}

impl RemoteShell for FakeShell {
    fn exec(&self, target: &str, command: &str) -> HarnessResult<String> {
        if command.contains("{{.State.ExitCode}}") {
            return Ok(format!("{}\n", self.exit_code));
        }
        if command.contains("{{.State.Running}}") {
            let seen = {
                let mut running_checks = self.running_checks.lock().unwrap();
                let seen = running_checks.entry(target.to_owned()).or_default();
                *seen += 1;
                *seen
            };
            if seen == 2 {
                thread::sleep(self.run_time);
            }
            return Ok(if seen == 1 { "true\n" } else { "false\n" }.to_owned());
        }
        self.execs
            .lock()
            .unwrap()
            .push((target.to_owned(), command.to_owned()));
        if command.starts_with("test -f") {
            let found = if self.stuck_in_init { "absent" } else { "present" };
            return Ok(format!("{found}\n"));
        }
        Ok(String::new())
    }
    fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<(), TransferError> {
        if remote.ends_with("client.txt") {
            let mut fetches = self.fetches.lock().unwrap();
            let tries = fetches.entry(target.to_owned()).or_default();
            *tries += 1;
            if *tries == 1 {
                return Err(TransferError::NotYetPresent("No such file or directory".to_owned()));
            }
            let sample: usize = target.rsplit('-').next().unwrap().parse().unwrap();
            fs::write(local, client_lines(target.contains("thesis"), sample)).unwrap();
        } else if remote.ends_with("hdrhistograms.json") {
            fs::write(local, "{}").unwrap();
        }
        Ok(())
    }
}

fn experiment(deployment: Deployment, sample_size: usize, cluster_size: usize) -> ExperimentConfig {
    ExperimentConfig {
        name: "smoke".to_owned(),
        deployment,
        sample_size,
        cluster_size,
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

struct Harness {
    _dir: tempfile::TempDir,
    cfg: HarnessConfig,
    runtime: Arc<FakeRuntime>,
    provisioner: Arc<FakeProvisioner>,
    shell: Arc<FakeShell>,
}

impl Harness {
    fn new(runtime: FakeRuntime, provisioner: FakeProvisioner) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HarnessConfig::for_testing(dir.path());
        Self {
            _dir: dir,
            cfg,
            runtime: Arc::new(runtime),
            provisioner: Arc::new(provisioner),
            shell: Arc::new(FakeShell::default()),
        }
    }
    fn with_shell(mut self, shell: FakeShell) -> Self {
        self.shell = Arc::new(shell);
        self
    }
    fn run(&self, config: &ExperimentConfig) -> HarnessResult<ExperimentReport> {
        let env = Collaborators {
            runtime: self.runtime.clone(),
            provisioner: self.provisioner.clone(),
            remote: self.shell.clone(),
        };
        Experiment::new(config, &self.cfg, env).run(&mut StdRng::seed_from_u64(42))
    }
    fn artifact(&self, sample: usize, variant: Variant) -> PathBuf {
        self.cfg.run_paths("smoke", sample, variant).client_output()
    }
}

#[test]
fn local_smoke_run() {
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default());
    let report = h.run(&experiment(Deployment::Local, 1, 1)).unwrap();
    assert_eq!(report.completed.len(), 2);
    assert!(report.failed.is_empty());
    for variant in Variant::ALL {
        let out = h.artifact(1, variant);
        assert!(out.is_file(), "missing {}", out.display());
        assert!(out.with_file_name("hdrhistograms.json").is_file());
    }
    let results = h.cfg.results_dir("smoke");
    for table in ["telemetry.csv", "avgl.csv", "p99l.csv", "test-avgl.csv"] {
        assert!(results.join(table).is_file(), "missing {table}");
    }
    // one terminal record per (variant, type)
    assert_eq!(report.analysis.rows, 4);
    assert!(report.analysis.comparisons.is_empty());
    let calls = h.runtime.calls();
    assert_eq!(calls[0], "build crdb-experiment-baseline");
    assert_eq!(calls[1], "build crdb-experiment-thesis");
    assert_eq!(calls[2], "network crdb-net");
    // every run is torn down before the next one starts
    let last = calls.iter().rposition(|c| c == "rm server-1").unwrap();
    assert_eq!(last, calls.len() - 1);
    assert_eq!(calls.iter().filter(|c| *c == "rm client-1").count(), 2);
}

#[test]
fn local_samples_are_compared() {
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default());
    let report = h.run(&experiment(Deployment::Local, 3, 3)).unwrap();
    assert_eq!(report.completed.len(), 6);
    let throughput = report
        .analysis
        .comparisons
        .iter()
        .find(|c| c.metric == "avgl" && c.op_type == "read")
        .unwrap();
    assert_eq!(throughput.comparison.n_baseline, 3);
    assert_eq!(throughput.comparison.n_thesis, 3);
    assert!(throughput.comparison.mean_thesis > throughput.comparison.mean_baseline);
    let tests = fs::read_to_string(h.cfg.results_dir("smoke").join("test-avgl.csv")).unwrap();
    assert_eq!(tests.lines().count(), 3);
}

#[test]
fn failed_workload_is_excluded() {
    let runtime = FakeRuntime {
        // sample 2, thesis
        fail_workload_runs: [4].into_iter().collect(),
        ..Default::default()
    };
    let h = Harness::new(runtime, FakeProvisioner::default());
    let report = h.run(&experiment(Deployment::Local, 3, 1)).unwrap();
    assert_eq!(report.completed.len(), 5);
    assert_eq!(report.failed.len(), 1);
    let (run, _) = &report.failed[0];
    assert_eq!((run.sample, run.variant), (2, Variant::Thesis));
    assert!(!h.artifact(2, Variant::Thesis).exists());
    assert!(h.artifact(3, Variant::Thesis).is_file());
    // 2 types x (3 baseline + 2 thesis)
    assert_eq!(report.analysis.rows, 10);
}

#[test]
fn server_start_failure_stops_the_experiment() {
    let runtime = FakeRuntime {
        fail_server: Some("server-2".to_owned()),
        ..Default::default()
    };
    let h = Harness::new(runtime, FakeProvisioner::default());
    let e = h.run(&experiment(Deployment::Local, 2, 3)).unwrap_err();
    assert!(!e.is_run_local());
    assert!(e.to_string().contains("server-2"));
    let calls = h.runtime.calls();
    assert!(calls.contains(&"rm server-1".to_owned()));
    assert!(!calls.iter().any(|c| c.starts_with("run server-3")));
    assert!(!calls.iter().any(|c| c.starts_with("run client-1")));
}

#[test]
fn local_fault_restarts_the_node() {
    let runtime = FakeRuntime {
        run_time: Duration::from_millis(200),
        ..Default::default()
    };
    let h = Harness::new(runtime, FakeProvisioner::default());
    let mut config = experiment(Deployment::Local, 1, 3);
    config.fault = Some(FaultPlan {
        node: 1,
        timing: RestartTiming {
            numerator: 0,
            denominator: 1,
        },
    });
    let report = h.run(&config).unwrap();
    assert_eq!(report.completed.len(), 2);
    let restarts = h
        .runtime
        .calls()
        .into_iter()
        .filter(|c| c == "restart server-1")
        .count();
    assert_eq!(restarts, 2);
}

#[test]
fn remote_smoke_run() {
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default());
    let report = h.run(&experiment(Deployment::Remote, 2, 1)).unwrap();
    assert_eq!(report.completed.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(*h.provisioner.calls.lock().unwrap(), ["apply", "destroy"]);
    assert!(h
        .runtime
        .calls()
        .contains(&"push us-central1-docker.pkg.dev/test-project/docker-registry/crdb-experiment-thesis:latest".to_owned()));
    for sample in 1..=2 {
        for variant in Variant::ALL {
            assert!(h.artifact(sample, variant).is_file());
        }
    }
    assert!(!report.analysis.comparisons.is_empty());
}

#[test]
fn remote_client_failure_is_excluded() {
    let shell = FakeShell {
        exit_code: 1,
        ..Default::default()
    };
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default()).with_shell(shell);
    let report = h.run(&experiment(Deployment::Remote, 1, 1)).unwrap();
    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 2);
    for (_, reason) in &report.failed {
        assert!(reason.contains("exited with code 1"), "{reason}");
    }
    assert_eq!(report.analysis.rows, 0);
    assert!(report.analysis.comparisons.is_empty());
    for variant in Variant::ALL {
        assert!(!h.artifact(1, variant).exists());
    }
    assert_eq!(*h.provisioner.calls.lock().unwrap(), ["apply", "destroy"]);
}

#[test]
fn remote_fault_restarts_each_cluster() {
    let shell = FakeShell {
        run_time: Duration::from_millis(200),
        ..Default::default()
    };
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default()).with_shell(shell);
    let mut config = experiment(Deployment::Remote, 1, 2);
    config.fault = Some(FaultPlan {
        node: 2,
        timing: RestartTiming {
            numerator: 0,
            denominator: 1,
        },
    });
    let report = h.run(&config).unwrap();
    assert_eq!(report.completed.len(), 2);
    let restarts = h.shell.restarts();
    let targets: BTreeSet<&str> = restarts.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(restarts.len(), 2);
    assert_eq!(
        targets,
        ["server-2-baseline-1", "server-2-thesis-1"].into_iter().collect()
    );
    assert!(restarts
        .iter()
        .all(|(_, command)| command == "sudo docker restart server"));
    // the timer only starts once the client has begun writing its output
    let execs = h.shell.execs();
    for variant in Variant::ALL {
        let output_seen = execs
            .iter()
            .position(|(t, c)| *t == format!("client-{variant}-1") && c.starts_with("test -f"))
            .unwrap();
        let restarted = execs
            .iter()
            .position(|(t, _)| *t == format!("server-2-{variant}-1"))
            .unwrap();
        assert!(output_seen < restarted);
    }
}

#[test]
fn remote_fault_waits_for_the_timed_run() {
    let shell = FakeShell {
        stuck_in_init: true,
        ..Default::default()
    };
    let h = Harness::new(FakeRuntime::default(), FakeProvisioner::default()).with_shell(shell);
    let mut config = experiment(Deployment::Remote, 1, 1);
    config.fault = Some(FaultPlan {
        node: 1,
        timing: RestartTiming {
            numerator: 0,
            denominator: 1,
        },
    });
    h.run(&config).unwrap();
    assert!(h.shell.restarts().is_empty());
    let checks = h
        .shell
        .execs()
        .iter()
        .filter(|(_, c)| c.starts_with("test -f"))
        .count();
    // both variants exhaust the run-start budget
    assert_eq!(checks, 2 * 3);
}

#[test]
fn failed_apply_still_destroys() {
    let provisioner = FakeProvisioner {
        fail_apply: true,
        ..Default::default()
    };
    let h = Harness::new(FakeRuntime::default(), provisioner);
    assert!(h.run(&experiment(Deployment::Remote, 1, 1)).is_err());
    assert_eq!(*h.provisioner.calls.lock().unwrap(), ["apply", "destroy"]);
}
