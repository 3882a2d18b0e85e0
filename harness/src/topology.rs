/*
 * Created on Sat Sep 05 2026
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

//! Node naming and cluster join strings

use {
    crate::{
        config::{Deployment, HarnessConfig, Variant},
        HarnessResult,
    },
    std::fmt,
};

/// The SQL port every node listens on inside its container or instance
pub const SERVICE_PORT: u16 = 26257;
/// The admin UI port inside a container or instance
pub const HTTP_PORT: u16 = 8080;

/// How node names resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// Container names on a shared docker network
    Local,
    /// Instance names under the project's internal DNS zone
    Remote { project_id: String, zone: String },
}

impl Addressing {
    pub fn for_deployment(deployment: Deployment, cfg: &HarnessConfig) -> HarnessResult<Self> {
        Ok(match deployment {
            Deployment::Local => Self::Local,
            Deployment::Remote => Self::Remote {
                project_id: cfg.project_id()?.to_owned(),
                zone: cfg.remote.zone.clone(),
            },
        })
    }
}

/// Scopes remote names to one (sample, variant) so that concurrently provisioned
/// clusters never share a hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunContext {
    pub sample: usize,
    pub variant: Variant,
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.variant, self.sample)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// 1-based
    pub index: usize,
    /// Container or instance name
    pub name: String,
    /// What peers use to reach the node
    pub host: String,
}

impl Node {
    pub fn address(&self) -> String {
        format!("{}:{SERVICE_PORT}", self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<Node>,
    join: String,
}

impl Topology {
    pub fn new(addressing: &Addressing, cluster_size: usize, ctx: Option<RunContext>) -> Self {
        let nodes = (1..=cluster_size)
            .map(|index| {
                let name = node_name(addressing, index, ctx);
                let host = node_host(addressing, &name);
                Node { index, name, host }
            })
            .collect();
        Self {
            nodes,
            join: build_join_string(addressing, cluster_size, ctx),
        }
    }
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn node(&self, index: usize) -> Option<&Node> {
        index.checked_sub(1).and_then(|i| self.nodes.get(i))
    }
    /// The node clients connect to and the cluster is initialized through
    pub fn first(&self) -> Option<&Node> {
        self.nodes.first()
    }
    /// Every node's address, self included
    pub fn join_string(&self) -> &str {
        &self.join
    }
}

pub fn node_name(addressing: &Addressing, index: usize, ctx: Option<RunContext>) -> String {
    match (addressing, ctx) {
        (Addressing::Remote { .. }, Some(ctx)) => format!("server-{index}-{ctx}"),
        _ => format!("server-{index}"),
    }
}

fn node_host(addressing: &Addressing, name: &str) -> String {
    match addressing {
        Addressing::Local => name.to_owned(),
        Addressing::Remote { project_id, zone } => format!("{name}.{zone}.c.{project_id}.internal"),
    }
}

pub fn client_name(addressing: &Addressing, ctx: Option<RunContext>) -> String {
    match (addressing, ctx) {
        (Addressing::Remote { .. }, Some(ctx)) => format!("client-{ctx}"),
        _ => "client-1".to_owned(),
    }
}

/// `host:port` of every node of a cluster, comma separated. Every node gets the same
/// list, itself included
pub fn build_join_string(
    addressing: &Addressing,
    cluster_size: usize,
    ctx: Option<RunContext>,
) -> String {
    (1..=cluster_size)
        .map(|index| {
            let host = node_host(addressing, &node_name(addressing, index, ctx));
            format!("{host}:{SERVICE_PORT}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Addressing {
        Addressing::Remote {
            project_id: "proj".to_owned(),
            zone: "us-central1-a".to_owned(),
        }
    }

    #[test]
    fn local_join_string() {
        assert_eq!(
            build_join_string(&Addressing::Local, 3, None),
            "server-1:26257,server-2:26257,server-3:26257"
        );
    }

    #[test]
    fn single_node_joins_itself() {
        assert_eq!(build_join_string(&Addressing::Local, 1, None), "server-1:26257");
    }

    #[test]
    fn remote_names_are_run_scoped() {
        let ctx = RunContext {
            sample: 2,
            variant: Variant::Thesis,
        };
        assert_eq!(
            build_join_string(&remote(), 2, Some(ctx)),
            "server-1-thesis-2.us-central1-a.c.proj.internal:26257,\
             server-2-thesis-2.us-central1-a.c.proj.internal:26257"
        );
        assert_eq!(client_name(&remote(), Some(ctx)), "client-thesis-2");
        assert_eq!(
            build_join_string(&remote(), 1, None),
            "server-1.us-central1-a.c.proj.internal:26257"
        );
        // local names ignore the context since one cluster exists at a time
        assert_eq!(node_name(&Addressing::Local, 1, Some(ctx)), "server-1");
    }

    #[test]
    fn every_size_yields_one_entry_per_node() {
        for addressing in [Addressing::Local, remote()] {
            for size in 1..=9 {
                let join = build_join_string(&addressing, size, None);
                let entries: Vec<&str> = join.split(',').collect();
                assert_eq!(entries.len(), size);
                for (i, entry) in entries.iter().enumerate() {
                    let (host, port) = entry.rsplit_once(':').unwrap();
                    assert!(host.starts_with(&format!("server-{}", i + 1)));
                    assert_eq!(port, "26257");
                }
            }
        }
    }

    #[test]
    fn pure() {
        let a = Topology::new(&remote(), 4, None);
        let b = Topology::new(&remote(), 4, None);
        assert_eq!(a, b);
        assert_eq!(a.node(0), None);
        assert_eq!(a.node(4).map(|n| n.index), Some(4));
        assert_eq!(a.node(5), None);
    }
}
