/*
 * Created on Sun Sep 27 2026
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

//! The client side of one run: cluster init, workload init and the timed workload
//! run, against an already running cluster

use {
    crate::{
        cluster::{Cluster, LOGS_DIR},
        config::{RunPaths, WorkloadConfig},
        docker::{ContainerRuntime, ContainerSpec},
        shell::ShellScript,
        topology::Node,
        util, HarnessError, HarnessResult,
    },
    std::time::Duration,
};

/// Where the client writes its artifacts inside its container or instance
pub const DATA_DIR: &str = "/var/experiment/data";

pub fn client_output_in_container() -> String {
    format!("{DATA_DIR}/client.txt")
}

pub fn histograms_in_container() -> String {
    format!("{DATA_DIR}/hdrhistograms.json")
}

/// The three client invocations of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadPlan {
    pub init_cluster: Vec<String>,
    pub init_workload: Vec<String>,
    pub run: Vec<String>,
}

impl WorkloadPlan {
    pub fn new(target: &Node, config: &WorkloadConfig, seed: u64) -> Self {
        let url = format!(
            "postgresql://root@{}?sslmode=disable",
            target.address()
        );
        let name = config.workload.name().to_owned();
        let args = config.workload.args();
        let init_cluster = vec![
            "./cockroach".to_owned(),
            "init".to_owned(),
            "--insecure".to_owned(),
            format!("--host={}", target.address()),
        ];
        let mut init_workload = vec![
            "./cockroach".to_owned(),
            "workload".to_owned(),
            "init".to_owned(),
            name.clone(),
        ];
        init_workload.extend(args.iter().cloned());
        init_workload.push(url.clone());
        let mut run = vec![
            "./cockroach".to_owned(),
            "workload".to_owned(),
            "run".to_owned(),
            name,
        ];
        run.extend(args);
        run.push(format!("--duration={}", util::go_duration(config.duration)));
        if let Some(ramp) = config.ramp {
            run.push(format!("--ramp={}", util::go_duration(ramp)));
        }
        run.push(format!("--seed={seed}"));
        run.push(format!("--histograms={}", histograms_in_container()));
        run.push("--display-format=incremental-json".to_owned());
        run.push(url);
        Self {
            init_cluster,
            init_workload,
            run,
        }
    }
    /// The whole plan as a single command line for hosts that only take a string
    pub fn render_script(&self, settle: Duration) -> String {
        ShellScript::new()
            .step(&self.init_cluster)
            .sleep(settle)
            .step(&self.init_workload)
            .sleep(settle)
            .step(&["mkdir", "-p", DATA_DIR])
            .step(&self.run)
            .stdout_to(client_output_in_container())
            .render()
    }
}

/// A non-zero client exit becomes a workload error
fn client_failed(e: HarnessError) -> HarnessError {
    match e {
        HarnessError::ChildError(_, code) => HarnessError::Workload(code),
        other => other,
    }
}

/// Runs client containers on the local docker network
pub struct WorkloadRunner<'a> {
    runtime: &'a dyn ContainerRuntime,
    image: &'a str,
    network: &'a str,
    settle: Duration,
}

impl<'a> WorkloadRunner<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        image: &'a str,
        network: &'a str,
        settle: Duration,
    ) -> Self {
        Self {
            runtime,
            image,
            network,
            settle,
        }
    }
    fn one_shot(&self, argv: &[String]) -> ContainerSpec {
        ContainerSpec::new(self.image)
            .network(self.network)
            .remove_on_exit()
            .command(argv.iter().cloned())
    }
    /// Drive the plan to completion. `on_run_start` is called right before the timed
    /// run and whatever it returns is held until the run is over. The client container
    /// is registered with `cluster` so it goes down with the servers
    #[allow(clippy::too_many_arguments)]
    pub fn run_workload<G>(
        &self,
        cluster: &mut Cluster,
        client: &str,
        target: &Node,
        config: &WorkloadConfig,
        seed: u64,
        paths: &RunPaths,
        on_run_start: impl FnOnce() -> G,
    ) -> HarnessResult<()> {
        let plan = WorkloadPlan::new(target, config, seed);
        let data = util::absolute(paths.data_dir())?;
        let logs = util::absolute(paths.logs_dir().join(client))?;
        util::create_dir_all(&data)?;
        util::create_dir_all(&logs)?;
        info!("Initializing the cluster through {}", target.name);
        self.runtime
            .run(&self.one_shot(&plan.init_cluster))
            .map_err(client_failed)?;
        util::sleep(self.settle);
        info!("Initializing workload `{}`", config.workload);
        self.runtime
            .run(&self.one_shot(&plan.init_workload))
            .map_err(client_failed)?;
        util::sleep(self.settle);
        let spec = ContainerSpec::new(self.image)
            .name(client)
            .network(self.network)
            .bind(&data, DATA_DIR)
            .bind(&logs, LOGS_DIR)
            .command(plan.run)
            .stdout_to(paths.client_output());
        cluster.register(client);
        info!(
            "Running workload `{}` for {:?} with seed {seed}",
            config.workload,
            config.total_duration()
        );
        let guard = on_run_start();
        let ret = self.runtime.run(&spec).map_err(client_failed);
        drop(guard);
        ret?;
        info!("Workload finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Workload, YcsbWorkload},
        topology::{Addressing, Topology},
    };

    fn config(ramp: Option<Duration>) -> WorkloadConfig {
        WorkloadConfig {
            workload: Workload::Ycsb {
                workload: YcsbWorkload::A,
            },
            duration: Duration::from_secs(300),
            ramp,
        }
    }

    #[test]
    fn plan_targets_node_one() {
        let topology = Topology::new(&Addressing::Local, 3, None);
        let plan = WorkloadPlan::new(topology.first().unwrap(), &config(None), 42);
        assert_eq!(
            plan.init_cluster,
            ["./cockroach", "init", "--insecure", "--host=server-1:26257"]
        );
        assert_eq!(
            plan.init_workload,
            [
                "./cockroach",
                "workload",
                "init",
                "ycsb",
                "--workload=A",
                "postgresql://root@server-1:26257?sslmode=disable"
            ]
        );
        assert_eq!(
            plan.run,
            [
                "./cockroach",
                "workload",
                "run",
                "ycsb",
                "--workload=A",
                "--duration=300s",
                "--seed=42",
                "--histograms=/var/experiment/data/hdrhistograms.json",
                "--display-format=incremental-json",
                "postgresql://root@server-1:26257?sslmode=disable"
            ]
        );
    }

    #[test]
    fn ramp_is_passed_through() {
        let topology = Topology::new(&Addressing::Local, 1, None);
        let plan = WorkloadPlan::new(
            topology.first().unwrap(),
            &config(Some(Duration::from_secs(60))),
            7,
        );
        assert!(plan.run.iter().any(|a| a == "--ramp=60s"));
    }

    #[test]
    fn rendered_script() {
        let topology = Topology::new(&Addressing::Local, 1, None);
        let plan = WorkloadPlan::new(topology.first().unwrap(), &config(None), 1);
        let script = plan.render_script(Duration::from_secs(5));
        assert!(script.starts_with(
            "./cockroach init --insecure --host=server-1:26257 && sleep 5 && ./cockroach workload init ycsb"
        ));
        assert!(script.contains("'postgresql://root@server-1:26257?sslmode=disable'"));
        assert!(script.ends_with("> /var/experiment/data/client.txt"));
    }

    #[test]
    fn client_exit_codes_become_workload_errors() {
        let e = client_failed(HarnessError::ChildError("run".to_owned(), Some(3)));
        assert!(matches!(e, HarnessError::Workload(Some(3))));
        assert!(e.is_run_local());
        let e = client_failed(HarnessError::Other("spawn".to_owned()));
        assert!(!e.is_run_local());
    }
}
