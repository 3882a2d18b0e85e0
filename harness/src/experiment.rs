/*
 * Created on Sat Oct 03 2026
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

//! The experiment scheduler. One invocation walks these phases:
//!
//! - build images
//! - local: every (sample, variant) run back to back on a single cluster, with a
//!   cooldown in between
//! - remote: provision every (sample, variant) cluster at once, wait for and download
//!   each of them in parallel, then destroy everything
//! - analyze

use {
    crate::{
        build,
        cluster::Cluster,
        config::{
            Deployment, ExperimentConfig, HarnessConfig, RunIdentity, RunPaths, SeedPolicy,
            Variant,
        },
        docker::ContainerRuntime,
        fault::ScheduledTask,
        poll::{self, ProcessState},
        remote::{
            self, Provisioner, RemoteCluster, RemoteShell, TfVars, CLIENT_CONTAINER,
            SERVER_CONTAINER,
        },
        report::{self, AnalysisSummary},
        shell,
        topology::{client_name, Addressing, Topology},
        util,
        workload::{self, WorkloadRunner},
        HarnessError, HarnessResult,
    },
    rand::Rng,
    std::{
        collections::BTreeSet,
        fmt,
        sync::Arc,
        thread,
    },
};

/// The largest seed handed to the workload generator
pub const MAX_SEED: u64 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BuildImages,
    RunSamples,
    Provision,
    WaitAndDownload,
    Destroy,
    Analyze,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BuildImages => "build images",
            Self::RunSamples => "run samples",
            Self::Provision => "provision",
            Self::WaitAndDownload => "wait and download",
            Self::Destroy => "destroy",
            Self::Analyze => "analyze",
        })
    }
}

/// Every run of the experiment in execution order: sample by sample, baseline first
pub fn plan_runs(sample_size: usize, policy: SeedPolicy, rng: &mut impl Rng) -> Vec<RunIdentity> {
    let mut runs = Vec::with_capacity(sample_size * Variant::ALL.len());
    for sample in 1..=sample_size {
        let shared = rng.gen_range(1..=MAX_SEED);
        for variant in Variant::ALL {
            let seed = match policy {
                SeedPolicy::Paired => shared,
                SeedPolicy::Independent => rng.gen_range(1..=MAX_SEED),
            };
            runs.push(RunIdentity {
                sample,
                variant,
                seed,
            });
        }
    }
    runs
}

/// The external systems the scheduler drives
#[derive(Clone)]
pub struct Collaborators {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub provisioner: Arc<dyn Provisioner>,
    pub remote: Arc<dyn RemoteShell>,
}

#[derive(Debug)]
pub struct ExperimentReport {
    pub completed: Vec<RunIdentity>,
    pub failed: Vec<(RunIdentity, String)>,
    pub analysis: AnalysisSummary,
}

pub struct Experiment<'a> {
    config: &'a ExperimentConfig,
    harness: &'a HarnessConfig,
    env: Collaborators,
}

/// Destroys the remote infrastructure when dropped, unless already destroyed
struct Provisioned<'a> {
    provisioner: &'a dyn Provisioner,
    vars: &'a TfVars,
    live: bool,
}

impl<'a> Provisioned<'a> {
    fn destroy(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if let Err(e) = self.provisioner.destroy(self.vars) {
            error!("Failed to destroy remote infrastructure: {e}. Manual cleanup is required");
        }
    }
}

impl<'a> Drop for Provisioned<'a> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<'a> Experiment<'a> {
    pub fn new(config: &'a ExperimentConfig, harness: &'a HarnessConfig, env: Collaborators) -> Self {
        Self {
            config,
            harness,
            env,
        }
    }
    fn enter(&self, phase: Phase) {
        info!("[{}] entering phase: {phase}", self.config.name);
    }
    pub fn run(&self, rng: &mut impl Rng) -> HarnessResult<ExperimentReport> {
        self.config.validate()?;
        let cfg = self.config;
        info!(
            "Starting experiment `{}`: {} deployment, {} sample(s), {} node(s), workload `{}` for {:?}",
            cfg.name,
            cfg.deployment,
            cfg.sample_size,
            cfg.cluster_size,
            cfg.workload.workload,
            cfg.workload.duration
        );
        let runs = plan_runs(cfg.sample_size, cfg.seed_policy, rng);
        for run in &runs {
            debug!("Planned {run}");
        }
        let outcomes = match cfg.deployment {
            Deployment::Local => self.run_local(&runs)?,
            Deployment::Remote => self.run_remote(&runs)?,
        };
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (run, outcome) in outcomes {
            match outcome {
                Ok(()) => completed.push(run),
                Err(e) => failed.push((run, e.to_string())),
            }
        }
        if !failed.is_empty() {
            warn!("{} of {} run(s) failed", failed.len(), runs.len());
        }
        self.enter(Phase::Analyze);
        let excluded: BTreeSet<(usize, Variant)> =
            failed.iter().map(|(run, _)| (run.sample, run.variant)).collect();
        let analysis = report::analyze(self.harness, &cfg.name, cfg.sample_size, &excluded)?;
        Ok(ExperimentReport {
            completed,
            failed,
            analysis,
        })
    }

    // local

    fn run_local(&self, runs: &[RunIdentity]) -> HarnessResult<Vec<(RunIdentity, HarnessResult<()>)>> {
        self.enter(Phase::BuildImages);
        let images = build::build_images(&*self.env.runtime, self.harness, Deployment::Local)?;
        if let Err(e) = self.env.runtime.create_network(&self.harness.network, "bridge") {
            warn!("Could not create network `{}` (it may already exist): {e}", self.harness.network);
        }
        self.enter(Phase::RunSamples);
        let mut outcomes = Vec::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            info!("Starting run {}/{}: {run}", i + 1, runs.len());
            let image = images.get(&run.variant).ok_or_else(|| {
                HarnessError::Other(format!("no image was built for {}", run.variant))
            })?;
            match self.run_single_local(run, image) {
                Ok(()) => {
                    info!("Finished {run}");
                    outcomes.push((*run, Ok(())));
                }
                Err(e) if e.is_run_local() => {
                    error!("{e}. Excluding it from the analysis");
                    outcomes.push((*run, Err(e)));
                }
                Err(e) => return Err(e),
            }
            if i + 1 < runs.len() {
                info!("Cooling down for {:?} ...", self.harness.timings.cooldown);
                util::sleep(self.harness.timings.cooldown);
            }
        }
        Ok(outcomes)
    }

    fn run_single_local(&self, run: &RunIdentity, image: &str) -> HarnessResult<()> {
        let paths = self.harness.run_paths(&self.config.name, run.sample, run.variant);
        let topology = Topology::new(&Addressing::Local, self.config.cluster_size, None);
        let mut cluster = Cluster::new(self.env.runtime.clone());
        let ret = self.provision_and_run(&mut cluster, run, image, &topology, &paths);
        cluster.stop_all();
        ret
    }

    fn provision_and_run(
        &self,
        cluster: &mut Cluster,
        run: &RunIdentity,
        image: &str,
        topology: &Topology,
        paths: &RunPaths,
    ) -> HarnessResult<()> {
        cluster
            .start_servers(topology, image, paths, self.harness)
            .map_err(|e| e.in_run(*run, "start the servers"))?;
        let target = topology
            .first()
            .ok_or_else(|| HarnessError::BadArguments("the cluster has no nodes".to_owned()))?;
        let runner = WorkloadRunner::new(
            &*self.env.runtime,
            image,
            &self.harness.network,
            self.harness.timings.settle,
        );
        runner
            .run_workload(
                cluster,
                &client_name(&Addressing::Local, None),
                target,
                &self.config.workload,
                run.seed,
                paths,
                || self.schedule_local_fault(topology),
            )
            .map_err(|e| e.in_run(*run, "run the workload"))
    }

    fn schedule_local_fault(&self, topology: &Topology) -> Option<ScheduledTask> {
        let plan = self.config.fault?;
        let node = topology.node(plan.node)?.name.clone();
        let delay = plan.delay(self.config.workload.duration);
        let runtime = self.env.runtime.clone();
        info!("Scheduling a restart of {node} in {delay:?}");
        let task = ScheduledTask::spawn(format!("restart-{node}"), delay, move || {
            info!("Restarting {node} ...");
            match runtime.restart(&node) {
                Ok(()) => info!("Restarted {node}"),
                Err(e) => error!("Failed to restart {node}: {e}"),
            }
        });
        task.map_err(|e| warn!("Fault injection disabled for this run: {e}")).ok()
    }

    // remote

    fn run_remote(&self, runs: &[RunIdentity]) -> HarnessResult<Vec<(RunIdentity, HarnessResult<()>)>> {
        let addressing = Addressing::for_deployment(Deployment::Remote, self.harness)?;
        self.enter(Phase::BuildImages);
        let images = build::build_images(&*self.env.runtime, self.harness, Deployment::Remote)?;
        let clusters: Vec<RemoteCluster> = runs
            .iter()
            .map(|run| RemoteCluster::new(*run, &addressing, self.config.cluster_size))
            .collect();
        let vars = remote::build_vars(
            &clusters,
            &images,
            &self.config.workload,
            self.harness.project_id()?,
            self.config.cluster_size,
            self.harness.timings.settle,
        )?;
        self.enter(Phase::Provision);
        let mut infra = Provisioned {
            provisioner: &*self.env.provisioner,
            vars: &vars,
            live: true,
        };
        self.env.provisioner.apply(&vars)?;
        self.enter(Phase::WaitAndDownload);
        let outcomes: Vec<(RunIdentity, HarnessResult<()>)> = thread::scope(|s| {
            let handles: Vec<_> = clusters
                .iter()
                .map(|c| (c.run, s.spawn(move || self.await_and_download(c))))
                .collect();
            handles
                .into_iter()
                .map(|(run, handle)| {
                    let ret = handle.join().unwrap_or_else(|_| {
                        Err(HarnessError::Other(format!("the task for {run} panicked")))
                    });
                    (run, ret)
                })
                .collect()
        });
        self.enter(Phase::Destroy);
        infra.destroy();
        let mut ret = Vec::with_capacity(outcomes.len());
        for (run, outcome) in outcomes {
            match outcome {
                Err(e) if !e.is_run_local() => return Err(e),
                Err(e) => {
                    error!("{e}. Excluding it from the analysis");
                    ret.push((run, Err(e)));
                }
                Ok(()) => ret.push((run, Ok(()))),
            }
        }
        Ok(ret)
    }

    fn await_and_download(&self, c: &RemoteCluster) -> HarnessResult<()> {
        let paths = self.harness.run_paths(&self.config.name, c.run.sample, c.run.variant);
        util::create_dir_all(paths.data_dir())
            .map_err(|e| e.in_run(c.run, "create the artifact directories"))?;
        let shell = &*self.env.remote;
        let probe = || remote::container_running(shell, &c.client, CLIENT_CONTAINER);
        let timings = &self.harness.timings;
        let started = poll::await_state(&c.client, ProcessState::Started, timings.start_poll, probe);
        let fault = if started.reached() && self.config.fault.is_some() {
            // the client redirect creates client.txt as the timed run begins
            let output = workload::client_output_in_container();
            let running = poll::await_state(
                &format!("workload run on {}", c.client),
                ProcessState::Started,
                timings.run_start_poll,
                || remote::file_exists(shell, &c.client, &output),
            );
            if running.reached() {
                self.schedule_remote_fault(c)
            } else {
                None
            }
        } else {
            None
        };
        poll::await_state(
            &c.client,
            ProcessState::Ended,
            timings.end_poll(self.config.workload.total_duration()),
            probe,
        );
        drop(fault);
        match remote::container_exit_code(shell, &c.client, CLIENT_CONTAINER) {
            Ok(Some(0)) => {}
            Ok(Some(code)) => {
                error!("Client of {} exited with code {code}", c.run);
                remote::download_server_logs(shell, c, |node| paths.server_logs(node));
                return Err(HarnessError::Workload(Some(code)).in_run(c.run, "run the workload"));
            }
            Ok(None) => warn!("No exit code reported for the client of {}", c.run),
            Err(e) => warn!("Failed to read the client exit code of {}: {e}", c.run),
        }
        let transfers = [
            (workload::client_output_in_container(), paths.client_output()),
            (workload::histograms_in_container(), paths.histograms()),
        ];
        for (from, to) in transfers {
            remote::download_with_retry(shell, &c.client, &from, &to, timings.transfer_poll)
                .map_err(|e| e.in_run(c.run, "download artifacts"))?;
        }
        remote::download_server_logs(shell, c, |node| paths.server_logs(node));
        Ok(())
    }

    fn schedule_remote_fault(&self, c: &RemoteCluster) -> Option<ScheduledTask> {
        let plan = self.config.fault?;
        let instance = c.topology.node(plan.node)?.name.clone();
        let delay = plan.delay(self.config.workload.duration);
        let remote = self.env.remote.clone();
        let command = shell::render(&["sudo", "docker", "restart", SERVER_CONTAINER]);
        info!("Scheduling a restart of {instance} in {delay:?}");
        let task = ScheduledTask::spawn(format!("restart-{instance}"), delay, move || {
            info!("Restarting {instance} ...");
            match remote.exec(&instance, &command) {
                Ok(_) => info!("Restarted {instance}"),
                Err(e) => error!("Failed to restart {instance}: {e}"),
            }
        });
        task.map_err(|e| warn!("Fault injection disabled for {}: {e}", c.run)).ok()
    }
}

/// Re-run the analysis over artifacts already on disk
pub fn analyze_existing(
    harness: &HarnessConfig,
    name: &str,
    sample_size: usize,
) -> HarnessResult<AnalysisSummary> {
    info!("Analyzing existing experiment `{name}`");
    report::analyze(harness, name, sample_size, &BTreeSet::new())
}
