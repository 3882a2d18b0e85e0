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

//! Server lifecycle for one run. A [`Cluster`] tracks every container it started and
//! tears all of them down when the run ends, however it ends

use {
    crate::{
        config::{HarnessConfig, RunPaths},
        docker::{ContainerRuntime, ContainerSpec},
        poll::{self, ProcessState},
        topology::{Node, Topology, HTTP_PORT, SERVICE_PORT},
        util, HarnessError, HarnessResult,
    },
    std::sync::Arc,
};

/// Where the server image keeps its store
pub const STORE_DIR: &str = "/app/store";
/// Where servers and clients write logs
pub const LOGS_DIR: &str = "/var/experiment/logs";

/// The `cockroach start` invocation for `node`
pub fn server_args(node: &Node, topology: &Topology) -> Vec<String> {
    vec![
        "./cockroach".to_owned(),
        "start".to_owned(),
        "--insecure".to_owned(),
        format!("--join={}", topology.join_string()),
        format!("--store={STORE_DIR}"),
        format!("--log-dir={LOGS_DIR}"),
        format!("--listen-addr=0.0.0.0:{SERVICE_PORT}"),
        format!("--advertise-addr={}", node.address()),
        format!("--http-addr=0.0.0.0:{HTTP_PORT}"),
    ]
}

/// Host ports (SQL, HTTP) published for the 1-based node `index`
pub fn host_ports(cfg: &HarnessConfig, index: usize) -> HarnessResult<(u16, u16)> {
    let out_of_range = || {
        HarnessError::BadArguments(format!(
            "node {index} has no free host ports above {} and {}",
            cfg.sql_port, cfg.http_port
        ))
    };
    let offset = index
        .checked_sub(1)
        .and_then(|o| u16::try_from(o).ok())
        .ok_or_else(out_of_range)?;
    let sql = cfg.sql_port.checked_add(offset).ok_or_else(out_of_range)?;
    let http = cfg.http_port.checked_add(offset).ok_or_else(out_of_range)?;
    Ok((sql, http))
}

pub struct Cluster {
    runtime: Arc<dyn ContainerRuntime>,
    live: Vec<String>,
}

impl Cluster {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            live: Vec::new(),
        }
    }
    /// Names that will be torn down, in start order
    #[cfg(test)]
    pub fn live(&self) -> &[String] {
        &self.live
    }
    pub fn register(&mut self, name: impl Into<String>) {
        self.live.push(name.into());
    }
    /// Start every node of `topology`. Host ports are offset by the node index so that
    /// several nodes can share one host. A node that fails to start aborts the call;
    /// it and the nodes started before it stay registered
    pub fn start_servers(
        &mut self,
        topology: &Topology,
        image: &str,
        paths: &RunPaths,
        cfg: &HarnessConfig,
    ) -> HarnessResult<()> {
        info!("Starting {} server(s) from `{image}` ...", topology.len());
        let ports = topology
            .nodes()
            .iter()
            .map(|node| host_ports(cfg, node.index))
            .collect::<HarnessResult<Vec<_>>>()?;
        for (node, (sql_port, http_port)) in topology.nodes().iter().zip(ports) {
            let logs = util::absolute(paths.server_logs(node.index))?;
            let store = util::absolute(paths.server_store(node.index))?;
            util::create_dir_all(&logs)?;
            util::create_dir_all(&store)?;
            let spec = ContainerSpec::new(image)
                .name(&node.name)
                .network(&cfg.network)
                .publish(sql_port, SERVICE_PORT)
                .publish(http_port, HTTP_PORT)
                .bind(&store, STORE_DIR)
                .bind(&logs, LOGS_DIR)
                .detached()
                .command(server_args(node, topology));
            info!("Starting {} ...", node.name);
            // docker may create the container and then fail to start it
            self.register(&node.name);
            self.runtime.run(&spec)?;
            let runtime = &self.runtime;
            let outcome = poll::await_state(
                &node.name,
                ProcessState::Started,
                cfg.timings.start_poll,
                || runtime.is_running(&node.name),
            );
            if !outcome.reached() {
                return Err(HarnessError::Other(format!(
                    "{} was launched but never reported as running",
                    node.name
                )));
            }
        }
        info!("All servers started");
        Ok(())
    }
    /// Stop and remove everything registered, newest first. Failures are logged and
    /// skipped; calling this again is a no-op
    pub fn stop_all(&mut self) {
        if self.live.is_empty() {
            return;
        }
        info!("Tearing down {} container(s) ...", self.live.len());
        while let Some(name) = self.live.pop() {
            if let Err(e) = self.runtime.stop(&name) {
                warn!("Failed to stop {name}: {e}");
            }
            if let Err(e) = self.runtime.remove(&name) {
                warn!("Failed to remove {name}: {e}");
            }
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.stop_all();
    }
}
