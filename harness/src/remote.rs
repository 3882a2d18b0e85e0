/*
 * Created on Fri Oct 16 2026
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

//! Remote deployments: terraform describes every (sample, variant) cluster at once and
//! `gcloud` reaches into the instances

use {
    crate::{
        cluster::{server_args, LOGS_DIR},
        config::{RunIdentity, Variant, WorkloadConfig},
        poll::{self, PollPolicy},
        shell,
        topology::{client_name, Addressing, RunContext, Topology},
        util,
        workload::WorkloadPlan,
        HarnessError, HarnessResult,
    },
    std::{
        collections::BTreeMap,
        fmt,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Container names on remote instances. Each instance runs exactly one container
pub const SERVER_CONTAINER: &str = "server";
pub const CLIENT_CONTAINER: &str = "client";

/// `-var` arguments passed to every terraform invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TfVars(BTreeMap<String, String>);

impl TfVars {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("-var={k}={v}")).collect()
    }
}

pub trait Provisioner: Send + Sync {
    fn apply(&self, vars: &TfVars) -> HarnessResult<()>;
    fn destroy(&self, vars: &TfVars) -> HarnessResult<()>;
}

#[derive(Debug, Clone)]
pub struct Terraform {
    dir: PathBuf,
}

impl Terraform {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
    fn invoke(&self, action: &str, vars: &TfVars) -> HarnessResult<()> {
        let mut cmd = cmd!("terraform", action, "-auto-approve");
        cmd.args(vars.to_args());
        cmd.current_dir(&self.dir);
        util::handle_child(&format!("terraform {action}"), cmd)
    }
}

impl Provisioner for Terraform {
    fn apply(&self, vars: &TfVars) -> HarnessResult<()> {
        info!("Provisioning infrastructure in `{}` ...", self.dir.display());
        self.invoke("apply", vars)
    }
    fn destroy(&self, vars: &TfVars) -> HarnessResult<()> {
        info!("Destroying infrastructure in `{}` ...", self.dir.display());
        self.invoke("destroy", vars)
    }
}

#[derive(Debug)]
pub enum TransferError {
    /// The remote file does not exist (yet)
    NotYetPresent(String),
    Fatal(HarnessError),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYetPresent(msg) => write!(f, "not present yet: {msg}"),
            Self::Fatal(e) => write!(f, "{e}"),
        }
    }
}

pub trait RemoteShell: Send + Sync {
    /// Run `command` on `target` and return its stdout
    fn exec(&self, target: &str, command: &str) -> HarnessResult<String>;
    /// Copy a remote file or directory to `local`
    fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<(), TransferError>;
}

#[derive(Debug, Clone)]
pub struct Gcloud {
    project: String,
    zone: String,
}

impl Gcloud {
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
        }
    }
}

impl RemoteShell for Gcloud {
    fn exec(&self, target: &str, command: &str) -> HarnessResult<String> {
        util::handle_child_output(
            &format!("ssh {target}"),
            cmd!(
                "gcloud", "compute", "ssh", target, "--zone", &self.zone, "--project",
                &self.project, "--command", command
            ),
        )
    }
    fn copy_from(&self, target: &str, remote: &str, local: &Path) -> Result<(), TransferError> {
        let desc = format!("scp {target}:{remote}");
        let output = util::capture_child(
            &desc,
            cmd!(
                "gcloud",
                "compute",
                "scp",
                "--recurse",
                "--zone",
                &self.zone,
                "--project",
                &self.project,
                format!("{target}:{remote}"),
                local
            ),
        )
        .map_err(TransferError::Fatal)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such file or directory") {
            Err(TransferError::NotYetPresent(stderr.trim().to_owned()))
        } else {
            error!("{desc} failed with stderr: `{}`", stderr.trim());
            Err(TransferError::Fatal(HarnessError::ChildError(
                desc,
                output.status.code(),
            )))
        }
    }
}

/// One (sample, variant) cluster and its client instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCluster {
    pub run: RunIdentity,
    pub topology: Topology,
    pub client: String,
}

impl RemoteCluster {
    pub fn new(run: RunIdentity, addressing: &Addressing, cluster_size: usize) -> Self {
        let ctx = Some(Self::context(&run));
        Self {
            run,
            topology: Topology::new(addressing, cluster_size, ctx),
            client: client_name(addressing, ctx),
        }
    }
    fn context(run: &RunIdentity) -> RunContext {
        RunContext {
            sample: run.sample,
            variant: run.variant,
        }
    }
    /// The key this cluster goes by in the terraform variables
    pub fn id(&self) -> String {
        Self::context(&self.run).to_string()
    }
}

/// Describe every cluster in one set of terraform variables: per cluster, the server
/// start commands (one per node), the client script and the image to run
pub fn build_vars(
    clusters: &[RemoteCluster],
    images: &BTreeMap<Variant, String>,
    workload: &WorkloadConfig,
    project_id: &str,
    cluster_size: usize,
    settle: Duration,
) -> HarnessResult<TfVars> {
    let mut server_cmds = BTreeMap::new();
    let mut client_cmds = BTreeMap::new();
    let mut cluster_images = BTreeMap::new();
    for c in clusters {
        let id = c.id();
        let target = c.topology.first().ok_or_else(|| {
            HarnessError::BadArguments(format!("cluster {id} has no nodes"))
        })?;
        let image = images.get(&c.run.variant).ok_or_else(|| {
            HarnessError::Other(format!("no image was built for {}", c.run.variant))
        })?;
        let cmds: Vec<String> = c
            .topology
            .nodes()
            .iter()
            .map(|node| shell::render(&server_args(node, &c.topology)))
            .collect();
        server_cmds.insert(id.clone(), cmds);
        client_cmds.insert(
            id.clone(),
            WorkloadPlan::new(target, workload, c.run.seed).render_script(settle),
        );
        cluster_images.insert(id, image.clone());
    }
    let mut vars = TfVars::default();
    vars.set("project_id", project_id);
    vars.set("cluster_size", cluster_size.to_string());
    vars.set("server_cmds", serde_json::to_string(&server_cmds)?);
    vars.set("client_cmds", serde_json::to_string(&client_cmds)?);
    vars.set("images", serde_json::to_string(&cluster_images)?);
    Ok(vars)
}

/// Whether `container` is running on `instance`
pub fn container_running(
    remote: &dyn RemoteShell,
    instance: &str,
    container: &str,
) -> HarnessResult<bool> {
    let probe = shell::render(&[
        "sudo",
        "docker",
        "inspect",
        "-f",
        "{{.State.Running}}",
        container,
    ]);
    remote
        .exec(instance, &probe)
        .map(|out| out.trim() == "true")
}

/// Exit code of a stopped `container` on `instance`. `None` if docker printed
/// something that is not a number
pub fn container_exit_code(
    remote: &dyn RemoteShell,
    instance: &str,
    container: &str,
) -> HarnessResult<Option<i32>> {
    let query = shell::render(&[
        "sudo",
        "docker",
        "inspect",
        "-f",
        "{{.State.ExitCode}}",
        container,
    ]);
    remote
        .exec(instance, &query)
        .map(|out| out.trim().parse().ok())
}

/// Whether a regular file exists at `path` on `instance`
pub fn file_exists(remote: &dyn RemoteShell, instance: &str, path: &str) -> HarnessResult<bool> {
    let test = format!(
        "{} && echo present || echo absent",
        shell::render(&["test", "-f", path])
    );
    remote
        .exec(instance, &test)
        .map(|out| out.trim() == "present")
}

/// Copy `remote` from `target` to `local`, retrying while the file is not there yet.
/// Running out of attempts is an [`HarnessError::ArtifactMissing`]
pub fn download_with_retry(
    remote: &dyn RemoteShell,
    target: &str,
    remote_path: &str,
    local: &Path,
    policy: PollPolicy,
) -> HarnessResult<()> {
    let mut fatal = None;
    let outcome = poll::poll_until(policy, |attempt| {
        match remote.copy_from(target, remote_path, local) {
            Ok(()) => true,
            Err(TransferError::NotYetPresent(msg)) => {
                info!(
                    "{target}:{remote_path} not available yet ({attempt}/{}): {msg}",
                    policy.max_attempts
                );
                false
            }
            Err(TransferError::Fatal(e)) => {
                fatal = Some(e);
                true
            }
        }
    });
    if let Some(e) = fatal {
        return Err(e);
    }
    if outcome.reached() {
        info!("Downloaded {target}:{remote_path} to `{}`", local.display());
        Ok(())
    } else {
        Err(HarnessError::ArtifactMissing(format!("{target}:{remote_path}")))
    }
}

/// Fetch every server's log directory. Missing logs only produce a warning
pub fn download_server_logs(
    remote: &dyn RemoteShell,
    cluster: &RemoteCluster,
    logs_dir: impl Fn(usize) -> PathBuf,
) {
    for node in cluster.topology.nodes() {
        let local = logs_dir(node.index);
        if let Err(e) = util::create_dir_all(&local) {
            warn!("Skipping logs of {}: {e}", node.name);
            continue;
        }
        if let Err(e) = remote.copy_from(&node.name, LOGS_DIR, &local) {
            warn!("Failed to download logs of {}: {e}", node.name);
        }
    }
}
